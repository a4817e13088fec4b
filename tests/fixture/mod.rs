//! Scripted in-memory page for integration tests.
//!
//! A small mutable node tree stands in for the live document, and
//! [`FixturePage`] implements the adapter seam over it. Scenario builders
//! assemble the dashboard markup the locators expect: results banner,
//! virtualized table, per-order drawers wired to row clicks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, TimeZone, Utc};

use offer_harvest::{
    Dialog, InputEvent, PageAdapter, PageElement, PageNode, Route, StatusSink,
};

pub type Handler = Arc<dyn Fn() + Send + Sync>;

/// One node of the scripted document tree.
pub struct NodeData {
    tag: String,
    attrs: Mutex<BTreeMap<String, String>>,
    own_text: Mutex<String>,
    children: Mutex<Vec<Arc<NodeData>>>,
    parent: Mutex<Weak<NodeData>>,
    visible: AtomicBool,
    connected: AtomicBool,
    scroll_top: Mutex<f64>,
    on_activate: Mutex<Option<Handler>>,
    on_wheel: Mutex<Option<Handler>>,
}

impl NodeData {
    pub fn new(tag: &str) -> Arc<Self> {
        Arc::new(Self {
            tag: tag.to_string(),
            attrs: Mutex::new(BTreeMap::new()),
            own_text: Mutex::new(String::new()),
            children: Mutex::new(Vec::new()),
            parent: Mutex::new(Weak::new()),
            visible: AtomicBool::new(true),
            connected: AtomicBool::new(true),
            scroll_top: Mutex::new(0.0),
            on_activate: Mutex::new(None),
            on_wheel: Mutex::new(None),
        })
    }

    pub fn with_attr(self: Arc<Self>, name: &str, value: &str) -> Arc<Self> {
        self.attrs
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(self: Arc<Self>, text: &str) -> Arc<Self> {
        *self.own_text.lock().unwrap() = text.to_string();
        self
    }

    pub fn with_child(self: Arc<Self>, child: Arc<NodeData>) -> Arc<Self> {
        append(&self, &child);
        self
    }

    pub fn set_on_activate(&self, handler: Handler) {
        *self.on_activate.lock().unwrap() = Some(handler);
    }

    pub fn set_on_wheel(&self, handler: Handler) {
        *self.on_wheel.lock().unwrap() = Some(handler);
    }

    fn full_text(&self) -> String {
        let mut parts = Vec::new();
        collect_text(self, &mut parts);
        parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn collect_text(node: &NodeData, out: &mut Vec<String>) {
    let own = node.own_text.lock().unwrap().clone();
    if !own.is_empty() {
        out.push(own);
    }
    for child in node.children.lock().unwrap().iter() {
        collect_text(child, out);
    }
}

/// Attach `child` under `parent`.
pub fn append(parent: &Arc<NodeData>, child: &Arc<NodeData>) {
    *child.parent.lock().unwrap() = Arc::downgrade(parent);
    set_connected(child, parent.connected.load(Ordering::SeqCst));
    parent.children.lock().unwrap().push(child.clone());
}

/// Remove `node` from its parent and mark its subtree disconnected.
pub fn detach(node: &Arc<NodeData>) {
    if let Some(parent) = node.parent.lock().unwrap().upgrade() {
        parent
            .children
            .lock()
            .unwrap()
            .retain(|c| !Arc::ptr_eq(c, node));
    }
    *node.parent.lock().unwrap() = Weak::new();
    set_connected(node, false);
}

fn set_connected(node: &Arc<NodeData>, connected: bool) {
    node.connected.store(connected, Ordering::SeqCst);
    for child in node.children.lock().unwrap().iter() {
        set_connected(child, connected);
    }
}

/// Handle over a [`NodeData`] satisfying the element seam.
#[derive(Clone)]
pub struct FixtureNode(pub Arc<NodeData>);

impl fmt::Debug for FixtureNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureNode").field("tag", &self.0.tag).finish()
    }
}

/// Wrap a fixture node as a pipeline element.
pub fn elem(node: &Arc<NodeData>) -> PageElement {
    PageElement::new(Box::new(FixtureNode(node.clone())))
}

impl PageNode for FixtureNode {
    fn tag(&self) -> String {
        self.0.tag.clone()
    }

    fn text(&self) -> String {
        self.0.full_text()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.attrs.lock().unwrap().get(name).cloned()
    }

    fn children(&self) -> Vec<PageElement> {
        self.0
            .children
            .lock()
            .unwrap()
            .iter()
            .map(elem)
            .collect()
    }

    fn parent(&self) -> Option<PageElement> {
        self.0.parent.lock().unwrap().upgrade().map(|p| elem(&p))
    }

    fn next_sibling(&self) -> Option<PageElement> {
        let parent = self.0.parent.lock().unwrap().upgrade()?;
        let siblings = parent.children.lock().unwrap();
        let index = siblings.iter().position(|c| Arc::ptr_eq(c, &self.0))?;
        siblings.get(index + 1).map(elem)
    }

    fn is_visible(&self) -> bool {
        self.0.visible.load(Ordering::SeqCst) && self.0.connected.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.0.connected.load(Ordering::SeqCst)
    }

    fn dispatch(&self, event: InputEvent) -> bool {
        match event {
            InputEvent::Click => {
                if let Some(handler) = self.0.on_activate.lock().unwrap().clone() {
                    handler();
                }
            }
            InputEvent::Wheel { .. } => {
                if let Some(handler) = self.0.on_wheel.lock().unwrap().clone() {
                    handler();
                }
            }
            _ => {}
        }
        true
    }

    fn activate(&self) -> bool {
        let handler = self.0.on_activate.lock().unwrap().clone();
        match handler {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }

    fn scroll_top(&self) -> f64 {
        *self.0.scroll_top.lock().unwrap()
    }

    fn set_scroll_top(&self, offset: f64) {
        *self.0.scroll_top.lock().unwrap() = offset;
    }

    fn scroll_height(&self) -> f64 {
        1000.0
    }

    fn clone_box(&self) -> Box<dyn PageNode> {
        Box::new(self.clone())
    }
}

/// Scripted adapter over a fixture tree.
pub struct FixturePage {
    pub body: Arc<NodeData>,
    route: Mutex<Route>,
    storage: Mutex<BTreeMap<String, String>>,
    pub reloads: Mutex<Vec<String>>,
    pub replaced_routes: Mutex<Vec<String>>,
    now: Mutex<DateTime<Utc>>,
    pub wake_locks: AtomicUsize,
    pub wake_releases: AtomicUsize,
}

impl FixturePage {
    pub fn new(body: Arc<NodeData>) -> Self {
        let route = Route::new("https://merchant.example.com", "/manager/orders")
            .with_param("restaurantUUID", "be1a2c3d-4e5f-6071-8293-a4b5c6d7e8f9")
            .with_param("dateRange", "custom")
            .with_param("start", "1763000000000")
            .with_param("end", "1763086400000");
        Self {
            body,
            route: Mutex::new(route),
            storage: Mutex::new(BTreeMap::new()),
            reloads: Mutex::new(Vec::new()),
            replaced_routes: Mutex::new(Vec::new()),
            now: Mutex::new(Utc.timestamp_millis_opt(1_763_000_000_000).unwrap()),
            wake_locks: AtomicUsize::new(0),
            wake_releases: AtomicUsize::new(0),
        }
    }

    pub fn storage_snapshot(&self) -> BTreeMap<String, String> {
        self.storage.lock().unwrap().clone()
    }
}

fn parse_url(url: &str) -> Route {
    let (origin, rest) = match url.find("://") {
        Some(scheme_end) => match url[scheme_end + 3..].find('/') {
            Some(slash) => url.split_at(scheme_end + 3 + slash),
            None => (url, "/"),
        },
        None => ("", url),
    };
    let (path, query) = match rest.find('?') {
        Some(q) => (&rest[..q], &rest[q + 1..]),
        None => (rest, ""),
    };
    let mut route = Route::new(origin, path);
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((k, v)) => route.query.insert(k.to_string(), v.to_string()),
            None => route.query.insert(pair.to_string(), String::new()),
        };
    }
    route
}

impl PageAdapter for FixturePage {
    fn root(&self) -> PageElement {
        elem(&self.body)
    }

    fn current_route(&self) -> Route {
        self.route.lock().unwrap().clone()
    }

    fn replace_route(&self, url: &str) {
        self.replaced_routes.lock().unwrap().push(url.to_string());
        *self.route.lock().unwrap() = parse_url(url);
    }

    fn reload_to(&self, url: &str) {
        self.reloads.lock().unwrap().push(url.to_string());
        *self.route.lock().unwrap() = parse_url(url);
    }

    fn storage_get(&self, key: &str) -> Option<String> {
        self.storage.lock().unwrap().get(key).cloned()
    }

    fn storage_set(&self, key: &str, value: &str) {
        self.storage
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn storage_remove(&self, key: &str) {
        self.storage.lock().unwrap().remove(key);
    }

    fn acquire_wake_lock(&self) -> bool {
        self.wake_locks.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn release_wake_lock(&self) {
        self.wake_releases.fetch_add(1, Ordering::SeqCst);
    }

    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Dialogs and progress reports captured during a run.
#[derive(Default)]
pub struct RecordingSink {
    pub progress: Mutex<Vec<(usize, usize, String)>>,
    pub dialogs: Mutex<Vec<Dialog>>,
}

#[async_trait::async_trait]
impl StatusSink for RecordingSink {
    fn progress(&self, current: usize, total: usize, label: &str) {
        self.progress
            .lock()
            .unwrap()
            .push((current, total, label.to_string()));
    }

    async fn show_dialog(&self, dialog: Dialog) {
        self.dialogs.lock().unwrap().push(dialog);
    }
}

/// How one scripted order behaves when its row is clicked.
#[derive(Clone)]
pub struct OrderSpec {
    pub id: String,
    pub date: String,
    /// Displayed offer magnitude, `None` for no promotional line.
    pub offer: Option<f64>,
    pub subtotal: f64,
    /// (name, quantity, displayed line price)
    pub items: Vec<(String, u32, f64)>,
    pub cancelled: bool,
    /// Clicking the row never produces a drawer.
    pub drawer_never_opens: bool,
    /// The drawer opens but shows a different order.
    pub drawer_wrong_order: bool,
}

impl OrderSpec {
    pub fn new(id: &str, date: &str, subtotal: f64) -> Self {
        Self {
            id: id.to_string(),
            date: date.to_string(),
            offer: None,
            subtotal,
            items: Vec::new(),
            cancelled: false,
            drawer_never_opens: false,
            drawer_wrong_order: false,
        }
    }

    pub fn offer(mut self, value: f64) -> Self {
        self.offer = Some(value);
        self
    }

    pub fn item(mut self, name: &str, quantity: u32, line_price: f64) -> Self {
        self.items.push((name.to_string(), quantity, line_price));
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    pub fn never_opens(mut self) -> Self {
        self.drawer_never_opens = true;
        self
    }

    pub fn wrong_order(mut self) -> Self {
        self.drawer_wrong_order = true;
        self
    }
}

/// A fully wired dashboard scenario.
pub struct Dashboard {
    pub page: Arc<FixturePage>,
    pub sink: Arc<RecordingSink>,
    /// Times each order's drawer was opened, by order index.
    pub open_counts: Vec<Arc<AtomicUsize>>,
}

/// Honors `RUST_LOG` so a failing scenario can be replayed with the
/// pipeline's tracing output visible.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build the dashboard markup: banner, scroll container with the order
/// table, and click-wired drawers. `initial_rows` rows render up front;
/// each scroll batch appends `batch_size` more until `orders` runs out.
pub fn dashboard(
    banner_total: usize,
    orders: &[OrderSpec],
    initial_rows: usize,
    batch_size: usize,
) -> Dashboard {
    init_tracing();
    let body = NodeData::new("body");
    let banner = NodeData::new("div").with_text(&format!("Showing {banner_total} results"));
    append(&body, &banner);

    let container = NodeData::new("div").with_attr("class", "infinite-scroll-component xs3");
    let table = NodeData::new("table");
    let tbody = NodeData::new("tbody");
    append(&table, &tbody);
    append(&container, &table);
    append(&body, &container);

    let mut open_counts = Vec::new();
    let mut rows = Vec::new();
    for spec in orders {
        let count = Arc::new(AtomicUsize::new(0));
        rows.push(build_row(&body, spec, &count));
        open_counts.push(count);
    }

    let initial = initial_rows.min(rows.len());
    for row in &rows[..initial] {
        append(&tbody, row);
    }

    // Scroll batches materialize the rest.
    let pending: Mutex<Vec<Arc<NodeData>>> = Mutex::new(rows[initial..].to_vec());
    let tbody_ref = tbody.clone();
    container.set_on_wheel(Arc::new(move || {
        let mut pending = pending.lock().unwrap();
        let take = batch_size.min(pending.len());
        for row in pending.drain(..take) {
            append(&tbody_ref, &row);
        }
    }));

    Dashboard {
        page: Arc::new(FixturePage::new(body)),
        sink: Arc::new(RecordingSink::default()),
        open_counts,
    }
}

fn build_row(body: &Arc<NodeData>, spec: &OrderSpec, open_count: &Arc<AtomicUsize>) -> Arc<NodeData> {
    let id_button = NodeData::new("div")
        .with_attr("role", "button")
        .with_text(&spec.id);
    let row = NodeData::new("tr")
        .with_attr("data-testid", "order-row")
        .with_child(
            NodeData::new("td").with_child(NodeData::new("div").with_child(id_button.clone())),
        )
        .with_child(NodeData::new("td").with_text(&spec.date))
        .with_child(NodeData::new("td").with_text(&format!("£{:.2}", spec.subtotal)));

    let body = body.clone();
    let spec = spec.clone();
    let open_count = open_count.clone();
    id_button.set_on_activate(Arc::new(move || {
        if spec.drawer_never_opens {
            return;
        }
        // Idempotent: re-clicks while the drawer is open do nothing.
        if body
            .children
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.attrs.lock().unwrap().get("data-baseweb").map(String::as_str) == Some("drawer"))
        {
            return;
        }
        open_count.fetch_add(1, Ordering::SeqCst);
        let drawer = build_drawer(&spec);
        append(&body, &drawer);
    }));

    row
}

fn build_drawer(spec: &OrderSpec) -> Arc<NodeData> {
    let close_button = NodeData::new("button").with_attr("aria-label", "Close");
    let drawer = NodeData::new("div")
        .with_attr("data-baseweb", "drawer")
        .with_child(
            NodeData::new("div").with_child(NodeData::new("div").with_child(close_button.clone())),
        );

    let shown_id = if spec.drawer_wrong_order {
        "#ZZZZZ".to_string()
    } else {
        spec.id.clone()
    };
    let header = NodeData::new("div")
        .with_attr("data-baseweb", "block")
        .with_child(
            NodeData::new("p")
                .with_attr("data-testid", "order-id")
                .with_text(&shown_id),
        )
        .with_child(NodeData::new("p").with_text(&spec.date));
    append(&drawer, &header);

    if spec.cancelled {
        append(
            &drawer,
            &NodeData::new("div")
                .with_child(NodeData::new("p").with_text("Order was cancelled")),
        );
    }

    // Payout section keeps the content-ready check satisfied for orders
    // without an offer line.
    let payout = NodeData::new("div")
        .with_attr("data-baseweb", "block")
        .with_child(NodeData::new("p").with_text("Net payout"))
        .with_child(NodeData::new("p").with_text(&format!("£{:.2}", spec.subtotal)));
    append(&drawer, &payout);

    if let Some(offer) = spec.offer {
        let section = NodeData::new("div")
            .with_child(
                NodeData::new("div")
                    .with_attr("data-baseweb", "block")
                    .with_child(NodeData::new("p").with_text("Offers on items")),
            )
            .with_child(
                NodeData::new("div")
                    .with_attr("data-baseweb", "block")
                    .with_child(NodeData::new("p").with_text(&format!("-£{offer:.2}"))),
            );
        append(&drawer, &section);
    }

    let items = NodeData::new("div");
    for (name, quantity, line_price) in &spec.items {
        let header = NodeData::new("div")
            .with_attr("role", "button")
            .with_child(
                NodeData::new("span")
                    .with_attr("data-baseweb", "typo-labelsmall")
                    .with_text(&format!("{quantity} ×")),
            )
            .with_child(
                NodeData::new("span")
                    .with_attr("data-baseweb", "typo-labelmedium")
                    .with_text(name),
            )
            .with_child(
                NodeData::new("p")
                    .with_attr("data-baseweb", "typo-monoparagraphmedium")
                    .with_text(&format!("£{line_price:.2}")),
            );
        append(&items, &header);
    }
    append(&drawer, &items);

    let drawer_ref = drawer.clone();
    close_button.set_on_activate(Arc::new(move || {
        detach(&drawer_ref);
    }));

    drawer
}
