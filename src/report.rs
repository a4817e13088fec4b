//! Aggregation of processed orders and offer-to-item attribution.
//!
//! A non-zero offer on an order is assumed to be a buy-one-get-one style
//! combo discount. The classifier decides which line items the discount
//! applies to: either every paired candidate at once (multi-item) or the
//! single highest-priced combo item, with a fixed tolerance against the
//! expected half-price discount. The tolerance and the quantity-halving
//! rule are preserved policy, not derived.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::{LineItem, RunState};

/// Currency tolerance between the offer magnitude and the expected
/// half-price discount.
pub const ATTRIBUTION_TOLERANCE: f64 = 2.0;

/// Leading "(N)" marker carried by combo-eligible item names.
static COMBO_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(\d+\)").unwrap());

/// Aggregates for one calendar date.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DateSummary {
    pub total_orders: usize,
    pub orders_with_offers: usize,
    pub offer_sum: f64,
    pub subtotal_sum: f64,
    /// Item name → inferred discounted quantity.
    pub item_counts: BTreeMap<String, u32>,
    pub total_discounted_items: u32,
    /// Per-order attribution explanations, in processing order, for audit.
    pub attributions: Vec<Attribution>,
}

/// How one order's offer was attributed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribution {
    pub order_id: String,
    pub detail: String,
    pub offer_value: f64,
}

/// The final cross-date report.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub by_date: BTreeMap<String, DateSummary>,
    pub total_offer_sum: f64,
    pub total_subtotal_sum: f64,
    pub total_discounted_items: u32,
    pub processed_orders: usize,
}

/// Which attribution path fired for an order. Paths are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Every paired candidate discounted, halved quantity each.
    MultiItem(Vec<(String, u32)>),
    /// The highest-priced combo item discounted at halved quantity.
    SingleItem(String, u32),
    /// No candidate matched the offer magnitude.
    NoMatch,
}

/// Merge same-name line items, summing quantity and price.
///
/// The dashboard sometimes renders one combo pair as several quantity-1
/// lines; consolidation restores the real pairing before classification.
pub fn consolidate(items: &[LineItem]) -> Vec<LineItem> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: BTreeMap<String, LineItem> = BTreeMap::new();

    for item in items {
        match merged.get_mut(&item.name) {
            Some(existing) => {
                existing.quantity += item.quantity;
                existing.unit_price += item.unit_price;
            }
            None => {
                order.push(item.name.clone());
                merged.insert(item.name.clone(), item.clone());
            }
        }
    }

    order
        .into_iter()
        .filter_map(|name| merged.remove(&name))
        .collect()
}

/// Whether a line item participates in combo attribution at all.
pub fn is_combo_eligible(item: &LineItem) -> bool {
    COMBO_MARKER_RE.is_match(&item.name)
}

/// Decide which items an order's offer magnitude applies to.
pub fn classify(items: &[LineItem], offer_magnitude: f64) -> Classification {
    let consolidated = consolidate(items);
    let eligible: Vec<&LineItem> = consolidated.iter().filter(|i| is_combo_eligible(i)).collect();
    if eligible.is_empty() {
        return Classification::NoMatch;
    }

    let candidates: Vec<&LineItem> = eligible
        .iter()
        .copied()
        .filter(|i| i.quantity >= 2)
        .collect();

    // Multi-item test: the offer matches the summed half prices of every
    // paired candidate.
    let expected_sum: f64 = candidates.iter().map(|i| i.unit_price / 2.0).sum();
    if candidates.len() >= 2 && (offer_magnitude - expected_sum).abs() < ATTRIBUTION_TOLERANCE {
        let attributed = candidates
            .iter()
            .map(|i| (i.name.clone(), i.quantity / 2))
            .collect();
        return Classification::MultiItem(attributed);
    }

    // Single-item test: highest-priced eligible item. Descending sort,
    // ties keep input order.
    let mut sorted = eligible.clone();
    sorted.sort_by(|a, b| {
        b.unit_price
            .partial_cmp(&a.unit_price)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let top = sorted[0];
    let diff = (offer_magnitude - top.unit_price / 2.0).abs();
    if top.quantity >= 2 && diff < ATTRIBUTION_TOLERANCE {
        return Classification::SingleItem(top.name.clone(), top.quantity / 2);
    }

    Classification::NoMatch
}

/// Build the cross-date summary from all recorded orders.
///
/// Cancelled orders are excluded from every bucket. Subtotals come from the
/// scraped value, never recomputed from items (item prices do not reflect
/// the promotional adjustment).
pub fn aggregate(state: &RunState) -> SummaryReport {
    let mut report = SummaryReport::default();

    for (order_id, record) in state.records() {
        report.processed_orders += 1;
        if record.cancelled {
            debug!(order_id, "cancelled order excluded from aggregation");
            continue;
        }

        let summary = report.by_date.entry(record.date.clone()).or_default();
        summary.total_orders += 1;
        summary.subtotal_sum += record.subtotal.value;
        report.total_subtotal_sum += record.subtotal.value;

        if record.offer.value == 0.0 {
            continue;
        }
        summary.orders_with_offers += 1;
        summary.offer_sum += record.offer.value;
        report.total_offer_sum += record.offer.value;

        if record.items.is_empty() {
            debug!(order_id, "offer with no items, nothing to attribute");
            continue;
        }

        match classify(&record.items, record.offer.value) {
            Classification::MultiItem(attributed) => {
                let detail = attributed
                    .iter()
                    .map(|(name, qty)| format!("{name}×{qty}"))
                    .collect::<Vec<_>>()
                    .join(" + ");
                for (name, qty) in attributed {
                    *summary.item_counts.entry(name).or_insert(0) += qty;
                    summary.total_discounted_items += qty;
                }
                summary.attributions.push(Attribution {
                    order_id: order_id.clone(),
                    detail: format!("multi-item: {detail}"),
                    offer_value: record.offer.value,
                });
            }
            Classification::SingleItem(name, qty) => {
                *summary.item_counts.entry(name.clone()).or_insert(0) += qty;
                summary.total_discounted_items += qty;
                summary.attributions.push(Attribution {
                    order_id: order_id.clone(),
                    detail: format!("single-item: {name}×{qty}"),
                    offer_value: record.offer.value,
                });
            }
            Classification::NoMatch => {
                debug!(order_id, "no attribution match for offer");
                summary.attributions.push(Attribution {
                    order_id: order_id.clone(),
                    detail: "no match".to_string(),
                    offer_value: record.offer.value,
                });
            }
        }
    }

    report.total_discounted_items = report
        .by_date
        .values()
        .map(|s| s.total_discounted_items)
        .sum();
    report
}

impl SummaryReport {
    /// Plain-text body for the final dialog, dates sorted ascending.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Total offer sum: {:.2}\nTotal subtotal sum: {:.2}\n{} discounted items across {} processed orders\n",
            self.total_offer_sum,
            self.total_subtotal_sum,
            self.total_discounted_items,
            self.processed_orders
        ));

        for (date, summary) in &self.by_date {
            if summary.total_orders == 0 {
                continue;
            }
            out.push_str(&format!(
                "\n{date}: {}/{} offers, offer sum {:.2}, subtotal sum {:.2}\n",
                summary.total_discounted_items,
                summary.total_orders,
                summary.offer_sum,
                summary.subtotal_sum
            ));
            let mut counts: Vec<(&String, &u32)> = summary.item_counts.iter().collect();
            counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (name, qty) in counts {
                out.push_str(&format!("  {name} ({qty})\n"));
            }
        }
        out
    }
}
