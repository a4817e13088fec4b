//! Per-run state and crash-recovery persistence.
//!
//! All mutable run state lives in an explicit [`RunState`] owned by the
//! orchestrator; nothing is process-global. A [`RecoverySnapshot`] of that
//! state is written to session storage right before a forced reload and
//! consumed exactly once by the next run's startup hook.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::page::PageAdapter;

/// Session-storage key of the serialized snapshot.
pub const RECOVERY_KEY: &str = "offer-harvest.recovery";
/// Session-storage key of the "resume requested" flag.
pub const RESUME_KEY: &str = "offer-harvest.resume";
/// Legacy last-index marker. Cleared during recovery cleanup, never written.
pub const LEGACY_INDEX_KEY: &str = "offer-harvest.last-index";

/// Snapshots older than this are discarded instead of resumed.
pub const SNAPSHOT_MAX_AGE_MS: i64 = 5 * 60 * 1000;

/// Display text plus sanitized numeric magnitude of a monetary field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub text: String,
    pub value: f64,
}

impl Money {
    /// The documented "nothing found" sentinel.
    pub fn none() -> Self {
        Self {
            text: "—".to_string(),
            value: 0.0,
        }
    }

    pub fn is_none(&self) -> bool {
        self.value == 0.0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::none()
    }
}

/// One line item scraped from an order's detail drawer.
///
/// The name may carry a leading "(N)" combo marker; the classifier keys off
/// it. Read-only once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub price_text: String,
}

/// Everything recorded for one processed order.
///
/// Created when the order's row is first successfully processed; never
/// mutated afterwards except by a snapshot restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub offer: Money,
    pub subtotal: Money,
    pub items: Vec<LineItem>,
    pub date: String,
    pub cancelled: bool,
    pub issue: String,
}

/// Mutable state of one processing run.
///
/// Single writer (the orchestrator task); observers only read it for
/// diagnostics. The processed set is the sole de-duplication and
/// progress-completion signal and only ever grows.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RunState {
    processed: BTreeSet<String>,
    records: BTreeMap<String, OrderRecord>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processed(&self, order_id: &str) -> bool {
        self.processed.contains(order_id)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Record an order and mark it processed. A second insert for the same
    /// id is ignored: records never mutate after creation.
    pub fn record(&mut self, order_id: &str, record: OrderRecord) {
        if !self.processed.insert(order_id.to_string()) {
            warn!(order_id, "duplicate record ignored");
            return;
        }
        self.records.insert(order_id.to_string(), record);
    }

    pub fn get(&self, order_id: &str) -> Option<&OrderRecord> {
        self.records.get(order_id)
    }

    pub fn records(&self) -> impl Iterator<Item = (&String, &OrderRecord)> {
        self.records.iter()
    }
}

/// Serializable copy of the run state written before a forced reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySnapshot {
    pub processed: Vec<String>,
    pub records: BTreeMap<String, OrderRecord>,
    /// Epoch milliseconds at save time.
    pub timestamp_ms: i64,
}

impl RecoverySnapshot {
    pub fn capture(state: &RunState, now_ms: i64) -> Self {
        Self {
            processed: state.processed.iter().cloned().collect(),
            records: state.records.clone(),
            timestamp_ms: now_ms,
        }
    }

    pub fn restore(self) -> RunState {
        RunState {
            processed: self.processed.into_iter().collect(),
            records: self.records,
        }
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp_ms
    }
}

/// Persist a snapshot and raise the resume flag.
pub fn save_for_resume(page: &dyn PageAdapter, state: &RunState) {
    let snapshot = RecoverySnapshot::capture(state, page.now().timestamp_millis());
    match serde_json::to_string(&snapshot) {
        Ok(json) => {
            page.storage_set(RECOVERY_KEY, &json);
            page.storage_set(RESUME_KEY, "true");
            debug!(
                processed = snapshot.processed.len(),
                "recovery snapshot saved"
            );
        }
        Err(e) => warn!(error = %e, "failed to serialize recovery snapshot"),
    }
}

/// Whether the previous run requested an automatic resume.
pub fn resume_requested(page: &dyn PageAdapter) -> bool {
    page.storage_get(RESUME_KEY).as_deref() == Some("true")
}

/// Consume the persisted snapshot, if present and fresh.
///
/// Stale or unparseable snapshots are discarded; either way the storage
/// keys are cleared so recovery fires at most once.
pub fn take_snapshot(page: &dyn PageAdapter) -> Option<RunState> {
    let json = page.storage_get(RECOVERY_KEY);
    clear_recovery(page);
    let json = json?;

    let snapshot: RecoverySnapshot = match serde_json::from_str(&json) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "discarding unparseable recovery snapshot");
            return None;
        }
    };

    let age = snapshot.age_ms(page.now().timestamp_millis());
    if age > SNAPSHOT_MAX_AGE_MS {
        warn!(age_ms = age, "discarding stale recovery snapshot");
        return None;
    }

    debug!(
        processed = snapshot.processed.len(),
        "recovery snapshot restored"
    );
    Some(snapshot.restore())
}

/// Remove every recovery artifact from session storage.
pub fn clear_recovery(page: &dyn PageAdapter) {
    page.storage_remove(RECOVERY_KEY);
    page.storage_remove(RESUME_KEY);
    page.storage_remove(LEGACY_INDEX_KEY);
}
