use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::element::PageElement;
use crate::selector::Selector;

/// The client-side route currently shown by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub origin: String,
    pub path: String,
    /// Query parameters, keyed and re-serialized in sorted key order. The
    /// canonical list URL spells its parameter order out explicitly, so
    /// nothing downstream depends on insertion order.
    pub query: BTreeMap<String, String>,
}

impl Route {
    pub fn new(origin: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Full URL string (origin + path + query).
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            format!("{}{}", self.origin, self.path)
        } else {
            let qs = self
                .query
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            format!("{}{}?{}", self.origin, self.path, qs)
        }
    }
}

/// The seam between the pipeline and the host page.
///
/// One implementation drives a live browser tab; the test suite ships a
/// scripted in-memory page. Query operations never fail: an adapter with
/// nothing to report returns empty results.
pub trait PageAdapter: Send + Sync {
    /// Live document root.
    fn root(&self) -> PageElement;

    /// All elements matching `selector` under `root` (document root when
    /// `None`), in document order. Empty when nothing matches.
    fn find_elements(&self, selector: &Selector, root: Option<&PageElement>) -> Vec<PageElement> {
        let base = match root {
            Some(el) => el.clone(),
            None => self.root(),
        };
        base.query_all(selector)
    }

    /// First match for `selector`, if any.
    fn find_element(&self, selector: &Selector, root: Option<&PageElement>) -> Option<PageElement> {
        self.find_elements(selector, root).into_iter().next()
    }

    fn current_route(&self) -> Route;

    /// Overwrite history state in place. No reload, no route-change event
    /// for the pipeline itself.
    fn replace_route(&self, url: &str);

    /// Full page navigation. Terminal for the current run; the startup hook
    /// on the next load picks up any persisted resume state.
    fn reload_to(&self, url: &str);

    /// Session-scoped string storage.
    fn storage_get(&self, key: &str) -> Option<String>;
    fn storage_set(&self, key: &str, value: &str);
    fn storage_remove(&self, key: &str);

    /// Whether the runtime is a touch-primary device.
    fn is_touch_primary(&self) -> bool {
        false
    }

    /// Best-effort screen wake lock. Returns whether a lock was acquired.
    fn acquire_wake_lock(&self) -> bool {
        false
    }

    fn release_wake_lock(&self) {}

    /// Injectable clock. Snapshot freshness and the "today" date fallback
    /// go through here so fixtures can control time.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Severity of a terminal user-visible dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Success,
    Warning,
    Error,
}

/// A structured modal handed to the host's alert collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialog {
    pub title: String,
    pub body: String,
    pub kind: DialogKind,
}

impl Dialog {
    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            kind: DialogKind::Error,
        }
    }

    pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            kind: DialogKind::Warning,
        }
    }

    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            kind: DialogKind::Success,
        }
    }
}

/// Progress and dialog surface. Rendering (overlay, button label, modal
/// library) is the host's business; the pipeline only reports.
#[async_trait::async_trait]
pub trait StatusSink: Send + Sync {
    /// Called after every order and before every scroll batch.
    fn progress(&self, current: usize, total: usize, label: &str);

    /// Fire-and-forget modal. Every terminal condition of a run produces
    /// exactly one dialog.
    async fn show_dialog(&self, dialog: Dialog);
}

/// A sink that drops everything, for embedders without a status surface.
#[derive(Debug, Default)]
pub struct NullStatusSink;

#[async_trait::async_trait]
impl StatusSink for NullStatusSink {
    fn progress(&self, _current: usize, _total: usize, _label: &str) {}

    async fn show_dialog(&self, _dialog: Dialog) {}
}
