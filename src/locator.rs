//! Structural location of order rows and the detail drawer.
//!
//! Everything here is tolerant by contract: a missing row set, drawer or
//! count yields `None`/empty, never an error. The markup churns within a
//! fixed vocabulary, so all lookups go through [`Selector`] constants.

use regex::Regex;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::element::PageElement;
use crate::page::PageAdapter;
use crate::selector::Selector;

/// `data-testid` marker carried by every rendered order row.
pub const ORDER_ROW_TESTID: &str = "order-row";
/// `aria-label` of the drawer's close affordance.
pub const CLOSE_LABEL: &str = "Close";
/// `data-baseweb` marker of the detail drawer container.
pub const DRAWER_MARKER: &str = "drawer";
/// Class of the virtualized list container.
pub const SCROLL_CONTAINER_CLASS: &str = "infinite-scroll-component";

static TOTAL_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Showing (\d+) results").unwrap());

/// All currently rendered order rows, in table order.
pub fn order_rows(page: &dyn PageAdapter) -> Vec<PageElement> {
    page.find_elements(&Selector::TestId(ORDER_ROW_TESTID.to_string()), None)
}

/// The order identifier displayed in a row's leading cell, if present.
pub fn row_id(row: &PageElement) -> Option<String> {
    let button = row
        .children()
        .into_iter()
        .find(|c| c.tag() == "td")
        .and_then(|cell| cell.query(&Selector::Role("button".to_string())))
        .or_else(|| row.query(&Selector::Role("button".to_string())))?;
    let id = button.text().trim().to_string();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// The row's trailing cell, which carries the displayed subtotal.
pub fn row_subtotal_cell(row: &PageElement) -> Option<PageElement> {
    row.children().into_iter().filter(|c| c.tag() == "td").next_back()
}

/// Visible close buttons anywhere in the document.
pub fn visible_close_buttons(page: &dyn PageAdapter) -> Vec<PageElement> {
    page.find_elements(&Selector::AriaLabel(CLOSE_LABEL.to_string()), None)
        .into_iter()
        .filter(|b| b.is_visible())
        .collect()
}

/// The detail drawer owning a close button: nearest ancestor carrying the
/// drawer structural marker, falling back to the button's second-level
/// parent container when the marker is absent.
pub fn drawer_for_close_button(close_button: &PageElement) -> Option<PageElement> {
    if let Some(drawer) = close_button.closest(&Selector::Marker(DRAWER_MARKER.to_string())) {
        return Some(drawer);
    }
    debug!("drawer marker absent, using ancestor container fallback");
    close_button.parent().and_then(|p| p.parent())
}

/// The currently open drawer, if any close affordance is visible.
pub fn open_drawer(page: &dyn PageAdapter) -> Option<PageElement> {
    visible_close_buttons(page)
        .into_iter()
        .find_map(|btn| drawer_for_close_button(&btn))
}

/// The close button scoped to `drawer`, else any visible one document-wide.
pub fn close_button_for(page: &dyn PageAdapter, drawer: Option<&PageElement>) -> Option<PageElement> {
    if let Some(drawer) = drawer {
        if let Some(btn) = drawer.query(&Selector::AriaLabel(CLOSE_LABEL.to_string())) {
            return Some(btn);
        }
        if let Some(btn) = drawer
            .query_all(&Selector::Tag("button".to_string()))
            .into_iter()
            .find(|b| b.text().to_lowercase().contains("close"))
        {
            return Some(btn);
        }
    }
    visible_close_buttons(page).into_iter().next()
}

/// First element of `tag` whose text contains every fragment.
pub fn find_by_text(page: &dyn PageAdapter, tag: &str, fragments: &[&str]) -> Option<PageElement> {
    let selector = Selector::TagWithText(
        tag.to_string(),
        fragments.iter().map(|f| f.to_string()).collect(),
    );
    page.find_element(&selector, None)
}

/// Page-reported total from the "Showing N results" banner.
pub fn total_order_count(page: &dyn PageAdapter) -> Option<usize> {
    let banner = find_by_text(page, "div", &["Showing", "results"])?;
    TOTAL_COUNT_RE
        .captures(&banner.text())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// The virtualized list container the scroll driver operates on.
pub fn scroll_container(page: &dyn PageAdapter) -> Option<PageElement> {
    page.find_element(&Selector::Class(SCROLL_CONTAINER_CLASS.to_string()), None)
}

/// Whether a loading spinner is showing inside `container`.
pub fn loading_indicator_present(container: &PageElement) -> bool {
    container
        .query(&Selector::Role("progressbar".to_string()))
        .is_some()
}
