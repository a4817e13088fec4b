//! Field extraction from an open, validated detail drawer.
//!
//! Every extractor is independent, read-only and tolerant of missing data:
//! the documented empty sentinels ("—", 0, empty list) flow downstream
//! instead of errors. Callers must confirm the drawer shows the expected
//! order id (see [`drawer_shows_order`]) before trusting any of these.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::element::PageElement;
use crate::page::Route;
use crate::selector::Selector;
use crate::session::{LineItem, Money};
use crate::wait::wait_until;

/// Marker of the small quantity label inside an item accordion header.
const QUANTITY_MARKER: &str = "typo-labelsmall";
/// Marker of the item name label.
const NAME_MARKER: &str = "typo-labelmedium";
/// Marker of monospaced price paragraphs.
const PRICE_MARKER: &str = "typo-monoparagraphmedium";
/// Marker of label/value layout blocks.
const BLOCK_MARKER: &str = "block";
/// Test id of the order-identifier element inside the drawer header.
const ORDER_ID_TESTID: &str = "order-id";

static OFFER_LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Offers on items").unwrap());
static SUBTOTAL_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(Sales \(incl\. VAT\)|Subtotal|Item total)").unwrap());
static VALUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[£$€]|[\d.]+").unwrap());
static CONTENT_READY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Net payout|Sales \(incl\. VAT\)|Offers on items").unwrap());
static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d{1,2}:\d{2}\s*(AM|PM)$").unwrap());
static MODIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(Spice\s+\d+|No(\s+|$)|Add\s+|Extra\s+|Choose\s+|Option\s+|Cutlery|Napkins)")
        .unwrap()
});
static ISSUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(items?|issue|missing|damaged|incorrect|charged)").unwrap());
static CANCELLED_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)customer\s+cancelled",
        r"(?i)order\s+(was\s+)?cancelled",
        r"(?i)cancelled\s+by\s+(the\s+)?customer",
        r"(?i)you\s+won'?t\s+be\s+paid",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});
static DATE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{1,2},\s+\d{4}\b",
        r"(?i)\b\d{1,2}\s+(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{4}\b",
        r"\b\d{1,2}/\d{1,2}/\d{4}\b",
        r"\b\d{4}-\d{2}-\d{2}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Collapse whitespace and pull an absolute numeric magnitude out of a
/// displayed monetary string. Everything but digits, sign and decimal point
/// is stripped before parsing.
pub fn sanitize_money(raw: &str) -> Money {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return Money::none();
    }
    let numeric: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let value = numeric.parse::<f64>().map(f64::abs).unwrap_or(0.0);
    Money {
        text: cleaned,
        value,
    }
}

fn looks_like_value(text: &str) -> bool {
    VALUE_RE.is_match(text)
}

/// The per-order promotional offer magnitude.
///
/// Finds the fixed label phrase, then reads the nearest numeric-bearing
/// neighbor: the label block's next sibling first, else a nearby mono
/// paragraph carrying a sign or currency mark.
pub fn offer(drawer: &PageElement) -> Money {
    for paragraph in drawer.query_all(&Selector::Tag("p".to_string())) {
        let label = paragraph.text().trim().to_string();
        if label.is_empty() || !OFFER_LABEL_RE.is_match(&label) {
            continue;
        }

        if let Some(block) = paragraph.closest(&Selector::Marker(BLOCK_MARKER.to_string())) {
            if let Some(value_block) = block.next_sibling() {
                return sanitize_money(&value_block.text());
            }
        }

        // Fallback: mono paragraphs near the label
        if let Some(container) = paragraph.parent().and_then(|p| p.parent()) {
            for mono in container.query_all(&Selector::Marker(PRICE_MARKER.to_string())) {
                let text = mono.text().trim().to_string();
                if text.contains('-') || text.contains('£') || text.contains('$') || text.contains('€')
                {
                    return sanitize_money(&text);
                }
            }
        }
    }
    debug!("no offer label found in drawer");
    Money::none()
}

/// The order subtotal as displayed in the drawer.
///
/// Three neighbor-search strategies run in order against each matching
/// label: direct next sibling, parent's next sibling, then the parent's
/// other children (value text bounded to keep out prose).
pub fn subtotal(drawer: &PageElement) -> Money {
    for el in all_descendants(drawer) {
        let tag = el.tag();
        if tag == "script" || tag == "style" {
            continue;
        }
        let text = el.text().trim().to_string();
        if text.is_empty() || !SUBTOTAL_LABEL_RE.is_match(&text) {
            continue;
        }

        if let Some(sibling) = el.next_sibling() {
            let val = sibling.text().trim().to_string();
            if looks_like_value(&val) {
                return sanitize_money(&val);
            }
        }

        if let Some(parent) = el.parent() {
            if let Some(parent_sibling) = parent.next_sibling() {
                let val = parent_sibling.text().trim().to_string();
                if looks_like_value(&val) {
                    return sanitize_money(&val);
                }
            }

            for child in parent.children() {
                if child.text() == el.text() {
                    continue;
                }
                let val = child.text().trim().to_string();
                if looks_like_value(&val) && val.len() < 20 {
                    return sanitize_money(&val);
                }
            }
        }
    }
    Money::none()
}

/// Line items from the accordion-style item headers.
///
/// A header only counts when both the quantity and name labels are present;
/// timestamps, modifier/option entries and non-positive prices are dropped.
pub fn line_items(drawer: &PageElement) -> Vec<LineItem> {
    let mut items = Vec::new();

    for header in drawer.query_all(&Selector::Role("button".to_string())) {
        let Some(quantity_label) = header.query(&Selector::Marker(QUANTITY_MARKER.to_string()))
        else {
            continue;
        };
        let Some(quantity) = leading_u32(quantity_label.text().trim()) else {
            continue;
        };

        let Some(name_el) = header.query(&Selector::Marker(NAME_MARKER.to_string())) else {
            continue;
        };
        let name = name_el.text().trim().to_string();

        let price_text = header
            .query(&Selector::Marker(PRICE_MARKER.to_string()))
            .map(|p| p.text().trim().to_string())
            .unwrap_or_default();
        let unit_price = sanitize_signed(&price_text);

        if TIMESTAMP_RE.is_match(&name) || MODIFIER_RE.is_match(&name) {
            continue;
        }
        if unit_price <= 0.0 {
            continue;
        }

        items.push(LineItem {
            name,
            quantity,
            unit_price,
            price_text,
        });
    }

    items
}

fn leading_u32(text: &str) -> Option<u32> {
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn sanitize_signed(raw: &str) -> f64 {
    let numeric: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    numeric.parse().unwrap_or(0.0)
}

/// First calendar-string match in `text` against the fixed pattern set.
pub fn find_date_in(text: &str) -> Option<String> {
    DATE_RES
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| m.as_str().to_string())
}

/// The order's calendar date.
///
/// Fallback chain: near the order-id element, broad scan of content blocks,
/// full-text scan of the drawer, the route's range-start parameter, finally
/// "today" behind a marker prefix.
pub fn order_date(
    drawer: &PageElement,
    route: &Route,
    now: DateTime<Utc>,
    order_id: &str,
) -> String {
    // Strategy 1: near the order identifier
    if let Some(id_el) = drawer.query(&Selector::TestId(ORDER_ID_TESTID.to_string())) {
        if let Some(block) = id_el.closest(&Selector::Marker(BLOCK_MARKER.to_string())) {
            for el in all_descendants(&block) {
                if let Some(date) = find_date_in(el.text().trim()) {
                    return date;
                }
            }
        }
    }

    // Strategy 2: broad search within content blocks
    for block in drawer.query_all(&Selector::Marker(BLOCK_MARKER.to_string())) {
        for el in all_descendants(&block) {
            let tag = el.tag();
            if tag != "p" && tag != "div" && tag != "span" {
                continue;
            }
            if let Some(date) = find_date_in(el.text().trim()) {
                return date;
            }
        }
    }

    // Strategy 3: full-text scan
    if let Some(date) = find_date_in(&drawer.text()) {
        return date;
    }

    warn!(order_id, "no date in drawer, using route fallback");
    date_from_route(route, now)
}

/// Date derived from the route's range-start parameter (epoch milliseconds),
/// else "today" with a marker prefix signalling the guess.
pub fn date_from_route(route: &Route, now: DateTime<Utc>) -> String {
    if let Some(start) = route.param("start") {
        if let Ok(ms) = start.parse::<i64>() {
            if let Some(date) = Utc.timestamp_millis_opt(ms).single() {
                return format_display_date(date);
            }
        }
    }
    warn!("no usable range-start in route, falling back to today");
    format!("Extracted: {}", format_display_date(now))
}

fn format_display_date(date: DateTime<Utc>) -> String {
    // "Nov 13, 2025" without a zero-padded day
    format!(
        "{} {}, {}",
        date.format("%b"),
        date.format("%-d"),
        date.format("%Y")
    )
}

/// Whether the drawer shows any of the fixed cancellation phrases.
pub fn is_cancelled(drawer: &PageElement) -> bool {
    let text = drawer.text();
    CANCELLED_RES.iter().any(|re| re.is_match(&text))
}

/// Free-text diagnostic for the order: an alert-styled node wins, else the
/// first text matching the issue-keyword pattern, else the empty sentinel.
pub fn issue(drawer: &PageElement) -> String {
    if let Some(alert) = drawer.query(&Selector::Role("alert".to_string())) {
        let text = alert.text().trim().to_string();
        if !text.is_empty() {
            return text;
        }
    }

    for el in drawer
        .query_all(&Selector::Tag("span".to_string()))
        .into_iter()
        .chain(drawer.query_all(&Selector::Tag("p".to_string())))
    {
        let text = el.text().trim().to_string();
        // The fixed label phrases themselves contain issue keywords.
        if text.is_empty() || CONTENT_READY_RE.is_match(&text) {
            continue;
        }
        if ISSUE_RE.is_match(&text) {
            return text;
        }
    }

    "—".to_string()
}

/// Shared validation precondition: the drawer must contain the expected
/// order identifier (exact case-insensitive substring) before any extractor
/// output is trusted.
pub async fn drawer_shows_order(
    drawer: &PageElement,
    order_id: &str,
    timeout: Duration,
) -> bool {
    let needle = order_id.to_lowercase();
    let found = wait_until(
        || drawer.text().to_lowercase().contains(&needle),
        timeout,
        Duration::from_millis(200),
    )
    .await;
    if !found {
        let snippet: String = drawer.text().chars().take(100).collect();
        warn!(order_id, snippet, "drawer validation failed");
    }
    found
}

/// Wait for the drawer's asynchronously-loaded content to settle: connected,
/// not hidden, and showing one of the payout/offer label phrases.
pub async fn wait_for_drawer_content(drawer: &PageElement, timeout: Duration) -> bool {
    wait_until(
        || {
            if !drawer.is_connected()
                || drawer.attribute("aria-hidden").as_deref() == Some("true")
            {
                return false;
            }
            CONTENT_READY_RE.is_match(&drawer.text())
        },
        timeout,
        Duration::from_millis(150),
    )
    .await
}

fn all_descendants(root: &PageElement) -> Vec<PageElement> {
    let mut out = Vec::new();
    fn walk(el: &PageElement, out: &mut Vec<PageElement>) {
        for child in el.children() {
            out.push(child.clone());
            walk(&child, out);
        }
    }
    walk(root, &mut out);
    out
}
