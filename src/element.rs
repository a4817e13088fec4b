use std::fmt;
use std::fmt::Debug;

use crate::selector::Selector;

/// Synthetic input events the interaction simulator can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerDown,
    PointerUp,
    MouseDown,
    MouseUp,
    Click,
    TouchStart,
    TouchEnd,
    Wheel { delta_y: i32 },
}

/// A rendered element in the live page.
///
/// Thin handle over an adapter-owned node. Read operations are infallible:
/// a detached or empty node yields empty strings and `None`, never an error.
pub struct PageElement {
    inner: Box<dyn PageNode>,
}

impl PageElement {
    pub fn new(inner: Box<dyn PageNode>) -> Self {
        Self { inner }
    }

    /// Lower-cased tag name ("tr", "div", "button", ...).
    pub fn tag(&self) -> String {
        self.inner.tag()
    }

    /// Full visible text content of the subtree, whitespace-collapsed.
    pub fn text(&self) -> String {
        self.inner.text()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attribute(name)
    }

    pub fn children(&self) -> Vec<PageElement> {
        self.inner.children()
    }

    pub fn parent(&self) -> Option<PageElement> {
        self.inner.parent()
    }

    pub fn next_sibling(&self) -> Option<PageElement> {
        self.inner.next_sibling()
    }

    /// Whether the element currently participates in layout.
    pub fn is_visible(&self) -> bool {
        self.inner.is_visible()
    }

    /// Whether the element is still attached to the document.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Best-effort dispatch of a synthetic event. Returns false if the
    /// runtime refused the event or the element is gone.
    pub fn dispatch(&self, event: InputEvent) -> bool {
        self.inner.dispatch(event)
    }

    /// The native activation call (`element.click()` in the host page).
    /// Returns false when the element does not expose one.
    pub fn activate(&self) -> bool {
        self.inner.activate()
    }

    pub fn focus(&self) {
        self.inner.focus()
    }

    pub fn scroll_into_view(&self) {
        self.inner.scroll_into_view()
    }

    pub fn scroll_top(&self) -> f64 {
        self.inner.scroll_top()
    }

    pub fn set_scroll_top(&self, offset: f64) {
        self.inner.set_scroll_top(offset)
    }

    pub fn scroll_height(&self) -> f64 {
        self.inner.scroll_height()
    }

    /// First descendant matching `selector`, depth-first document order.
    pub fn query(&self, selector: &Selector) -> Option<PageElement> {
        self.query_all(selector).into_iter().next()
    }

    /// All descendants matching `selector`, depth-first document order.
    /// The element itself is not considered.
    pub fn query_all(&self, selector: &Selector) -> Vec<PageElement> {
        let mut matches = Vec::new();
        collect_matches(self, selector, &mut matches);
        matches
    }

    /// Nearest ancestor (excluding self) matching `selector`.
    pub fn closest(&self, selector: &Selector) -> Option<PageElement> {
        let mut current = self.parent();
        while let Some(el) = current {
            if selector.matches(&el) {
                return Some(el);
            }
            current = el.parent();
        }
        None
    }
}

fn collect_matches(root: &PageElement, selector: &Selector, out: &mut Vec<PageElement>) {
    for child in root.children() {
        if selector.matches(&child) {
            out.push(child.clone());
        }
        collect_matches(&child, selector, out);
    }
}

impl Clone for PageElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl fmt::Debug for PageElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageElement")
            .field("tag", &self.tag())
            .field("visible", &self.is_visible())
            .finish()
    }
}

/// Interface for adapter-specific element implementations.
pub trait PageNode: Send + Sync + Debug {
    fn tag(&self) -> String;
    fn text(&self) -> String;
    fn attribute(&self, name: &str) -> Option<String>;
    fn children(&self) -> Vec<PageElement>;
    fn parent(&self) -> Option<PageElement>;
    fn next_sibling(&self) -> Option<PageElement>;
    fn is_visible(&self) -> bool;
    fn is_connected(&self) -> bool;
    fn dispatch(&self, event: InputEvent) -> bool;
    fn activate(&self) -> bool;
    fn focus(&self) {}
    fn scroll_into_view(&self) {}
    fn scroll_top(&self) -> f64 {
        0.0
    }
    fn set_scroll_top(&self, _offset: f64) {}
    fn scroll_height(&self) -> f64 {
        0.0
    }
    fn clone_box(&self) -> Box<dyn PageNode>;
}
