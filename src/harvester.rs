//! The streaming orchestrator.
//!
//! One cooperative task drives locate → click → wait → validate → extract →
//! record → close → cleanup across all rows. Orders are strictly sequential:
//! only one drawer can be open at a time and every downstream step depends
//! on its state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::element::PageElement;
use crate::errors::HarvestError;
use crate::extract;
use crate::interaction::simulate_click;
use crate::locator;
use crate::navigation;
use crate::page::{Dialog, PageAdapter, StatusSink};
use crate::report::{aggregate, SummaryReport};
use crate::scroll;
use crate::session::{self, Money, OrderRecord, RunState};
use crate::wait::{wait_until, wait_until_gone};

/// Issue sentinel recorded when a drawer never opened or validated.
pub const DRAWER_ERROR_ISSUE: &str = "Drawer Error";

/// Tunable timeouts and ceilings. Defaults mirror the page's observed
/// latencies; tests shrink them.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Click attempts per row before the order is abandoned for the pass.
    pub drawer_open_attempts: u32,
    /// Wait for the drawer to appear after each click.
    pub drawer_open_timeout: Duration,
    /// Wait for the expected order id on first validation.
    pub validation_timeout: Duration,
    /// Wait for the order id after the single re-click retry.
    pub revalidation_timeout: Duration,
    /// Wait for asynchronously-loaded drawer content to settle.
    pub content_timeout: Duration,
    /// Wait for the drawer to disappear after closing.
    pub close_timeout: Duration,
    /// Wait for the initial rows/banner on startup and resume.
    pub startup_timeout: Duration,
    /// Orchestrator passes without progress before giving up.
    pub max_stagnant_passes: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            drawer_open_attempts: 5,
            drawer_open_timeout: Duration::from_secs(4),
            validation_timeout: Duration::from_secs(6),
            revalidation_timeout: Duration::from_secs(4),
            content_timeout: Duration::from_secs(8),
            close_timeout: Duration::from_secs(3),
            startup_timeout: Duration::from_secs(15),
            max_stagnant_passes: 10,
        }
    }
}

enum DrawerAttempt {
    Opened(PageElement),
    Failed,
    /// Routing is wedged; a snapshot was persisted and a reload issued.
    Wedged,
}

/// Top-level entry point for a processing run.
pub struct Harvester {
    page: Arc<dyn PageAdapter>,
    sink: Arc<dyn StatusSink>,
    config: HarvestConfig,
    running: AtomicBool,
}

impl Harvester {
    pub fn new(page: Arc<dyn PageAdapter>, sink: Arc<dyn StatusSink>) -> Self {
        Self::with_config(page, sink, HarvestConfig::default())
    }

    pub fn with_config(
        page: Arc<dyn PageAdapter>,
        sink: Arc<dyn StatusSink>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            page,
            sink,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Startup hook: if the previous run requested a resume, restore its
    /// snapshot and re-run automatically. Returns the report when a resume
    /// actually happened.
    pub async fn resume_if_requested(&self) -> Result<Option<SummaryReport>, HarvestError> {
        if !session::resume_requested(self.page.as_ref()) {
            return Ok(None);
        }
        info!("resume flag found, restoring recovery snapshot");
        let Some(state) = session::take_snapshot(self.page.as_ref()) else {
            warn!("resume requested but no usable snapshot, starting over is up to the caller");
            return Ok(None);
        };
        self.wait_for_orders().await;
        sleep(Duration::from_millis(500)).await;
        self.run_with(state).await.map(Some)
    }

    /// Run the full pipeline from a clean slate.
    pub async fn run(&self) -> Result<SummaryReport, HarvestError> {
        session::clear_recovery(self.page.as_ref());
        self.run_with(RunState::new()).await
    }

    #[instrument(skip(self, state))]
    async fn run_with(&self, mut state: RunState) -> Result<SummaryReport, HarvestError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HarvestError::RunInProgress);
        }
        let result = self.run_inner(&mut state).await;
        self.running.store(false, Ordering::SeqCst);
        self.page.release_wake_lock();
        result
    }

    async fn run_inner(&self, state: &mut RunState) -> Result<SummaryReport, HarvestError> {
        let page = self.page.as_ref();

        if page.acquire_wake_lock() {
            debug!("wake lock acquired for the run");
        }

        if state.processed_count() > 0 {
            info!(
                processed = state.processed_count(),
                "resuming with previously processed orders"
            );
        }

        // Startup preconditions, each fatal with its own error dialog.
        let Some(total) = locator::total_order_count(page) else {
            let dialog = Dialog::error(
                "Error",
                "Could not find the total order count. Make sure the results banner is visible.",
            );
            self.sink.show_dialog(dialog).await;
            return Err(HarvestError::TotalCountNotFound(
                "results banner missing".to_string(),
            ));
        };

        if page
            .find_element(&crate::selector::Selector::Tag("table".to_string()), None)
            .is_none()
        {
            self.sink
                .show_dialog(Dialog::error("Error", "Could not find the orders table."))
                .await;
            return Err(HarvestError::TableNotFound("no table element".to_string()));
        }

        let Some(container) = locator::scroll_container(page) else {
            self.sink
                .show_dialog(Dialog::error(
                    "Error",
                    "Could not find the scrollable order list.",
                ))
                .await;
            return Err(HarvestError::ScrollContainerNotFound(
                "virtualized list container missing".to_string(),
            ));
        };

        info!(total, "starting streaming processing");

        let mut stagnant_passes = 0u32;
        let mut last_processed = state.processed_count();

        while state.processed_count() < total && stagnant_passes < self.config.max_stagnant_passes {
            let rows = locator::order_rows(page);

            for row in &rows {
                let Some(order_id) = locator::row_id(row) else {
                    continue;
                };
                if state.is_processed(&order_id) {
                    continue;
                }

                let current = state.processed_count();
                self.sink.progress(
                    current + 1,
                    total,
                    &format!("Processing order {} of {total}", current + 1),
                );

                row.scroll_into_view();

                if !self.process_order(state, row, &order_id).await? {
                    // Wedged escalation already persisted state and issued
                    // the reload; end this run.
                    return Err(HarvestError::RoutingWedged(format!(
                        "{} consecutive empty drawer attempts",
                        navigation::WEDGED_ATTEMPT_THRESHOLD
                    )));
                }
            }

            if state.processed_count() == last_processed {
                stagnant_passes += 1;
                debug!(stagnant_passes, "no orders processed this pass");
            } else {
                stagnant_passes = 0;
                last_processed = state.processed_count();
            }

            if state.processed_count() < total {
                self.sink.progress(
                    state.processed_count(),
                    total,
                    &format!(
                        "Loading more orders... ({}/{total})",
                        state.processed_count()
                    ),
                );
                scroll::load_batch(page, &container).await;
            }
        }

        let processed = state.processed_count();
        info!(processed, total, "finished processing");

        if processed < total {
            self.sink
                .show_dialog(Dialog::warning(
                    "Processing Warning",
                    format!(
                        "Only processed {processed} of {total} orders. Some orders may not have loaded."
                    ),
                ))
                .await;
        }

        let report = aggregate(state);
        self.sink
            .show_dialog(Dialog::success("Calculation Complete", report.render()))
            .await;
        Ok(report)
    }

    /// Drive one order through its state machine. Returns false only on the
    /// wedged-routing escalation; per-order failures are absorbed into the
    /// record.
    async fn process_order(
        &self,
        state: &mut RunState,
        row: &PageElement,
        order_id: &str,
    ) -> Result<bool, HarvestError> {
        let page = self.page.as_ref();
        debug!(order_id, "processing order");

        // Subtotal comes from the row before the drawer ever opens; the
        // drawer-side extractor is only a fallback.
        let row_subtotal = locator::row_subtotal_cell(row)
            .map(|cell| extract::sanitize_money(&cell.text()))
            .filter(|m| m.value > 0.0);

        let mut drawer = match self.open_drawer_for_row(state, row).await {
            DrawerAttempt::Opened(drawer) => Some(drawer),
            DrawerAttempt::Failed => None,
            DrawerAttempt::Wedged => return Ok(false),
        };

        if let Some(d) = drawer.take() {
            let mut valid =
                extract::drawer_shows_order(&d, order_id, self.config.validation_timeout).await;
            if !valid {
                warn!(order_id, "drawer validation failed, retrying once");
                simulate_click(row, page.is_touch_primary());
                sleep(Duration::from_millis(1500)).await;
                valid =
                    extract::drawer_shows_order(&d, order_id, self.config.revalidation_timeout)
                        .await;
            }
            if valid {
                drawer = Some(d);
            } else {
                error!(order_id, "validation failed after retry, recording drawer error");
            }
        }

        let record = match drawer {
            Some(ref d) => {
                extract::wait_for_drawer_content(d, self.config.content_timeout).await;
                let offer = extract::offer(d);
                let subtotal = row_subtotal.unwrap_or_else(|| extract::subtotal(d));
                let items = extract::line_items(d);
                let date = extract::order_date(d, &page.current_route(), page.now(), order_id);
                let cancelled = extract::is_cancelled(d);
                let issue = extract::issue(d);
                debug!(
                    order_id,
                    offer = offer.value,
                    items = items.len(),
                    %date,
                    cancelled,
                    "extracted order"
                );
                OrderRecord {
                    offer,
                    subtotal,
                    items,
                    date,
                    cancelled,
                    issue,
                }
            }
            None => OrderRecord {
                offer: Money::none(),
                subtotal: row_subtotal.unwrap_or_else(Money::none),
                items: Vec::new(),
                date: extract::date_from_route(&page.current_route(), page.now()),
                cancelled: false,
                issue: DRAWER_ERROR_ISSUE.to_string(),
            },
        };

        state.record(order_id, record);

        self.close_drawer(drawer.as_ref()).await;
        navigation::cleanup_after_order(page).await;
        debug!(order_id, "order complete");
        Ok(true)
    }

    /// Click a row until its drawer opens, resetting the URL between
    /// attempts. Cycles through click targets by priority: the row's id
    /// button, the first cell's inner container, the first cell, the row.
    async fn open_drawer_for_row(&self, state: &RunState, row: &PageElement) -> DrawerAttempt {
        let page = self.page.as_ref();

        navigation::close_stray_drawer(page).await;
        let clean = navigation::clean_base_url(&page.current_route());

        row.scroll_into_view();
        sleep(Duration::from_millis(300)).await;

        let first_cell = row.children().into_iter().find(|c| c.tag() == "td");
        let first_cell_inner = first_cell
            .as_ref()
            .and_then(|c| c.children().into_iter().next());
        let id_button = row.query(&crate::selector::Selector::Role("button".to_string()));
        let targets: Vec<PageElement> = [id_button, first_cell_inner, first_cell, Some(row.clone())]
            .into_iter()
            .flatten()
            .collect();

        let mut consecutive_empty = 0u32;

        for attempt in 0..self.config.drawer_open_attempts {
            if attempt > 0 {
                page.replace_route(&clean);
                sleep(Duration::from_millis(300)).await;
            }

            if consecutive_empty >= navigation::WEDGED_ATTEMPT_THRESHOLD {
                error!(
                    consecutive_empty,
                    "no drawer at all across consecutive attempts, routing is wedged"
                );
                session::save_for_resume(page, state);
                page.reload_to(&clean);
                return DrawerAttempt::Wedged;
            }

            let target = &targets[attempt as usize % targets.len()];
            debug!(attempt = attempt + 1, target = %target.tag(), "clicking row target");
            simulate_click(target, page.is_touch_primary());

            if let Some(drawer) = self.wait_for_drawer_open().await {
                return DrawerAttempt::Opened(drawer);
            }

            if locator::visible_close_buttons(page).is_empty() {
                consecutive_empty += 1;
                debug!(consecutive_empty, "attempt produced no drawer at all");
            } else {
                consecutive_empty = 0;
            }

            page.replace_route(&clean);
            sleep(Duration::from_millis(400)).await;
        }

        error!(
            attempts = self.config.drawer_open_attempts,
            "drawer never opened"
        );
        page.replace_route(&clean);
        DrawerAttempt::Failed
    }

    async fn wait_for_drawer_open(&self) -> Option<PageElement> {
        let page = self.page.as_ref();
        let appeared = wait_until(
            || !locator::visible_close_buttons(page).is_empty(),
            self.config.drawer_open_timeout,
            Duration::from_millis(50),
        )
        .await;
        if !appeared {
            return None;
        }
        locator::open_drawer(page)
    }

    async fn close_drawer(&self, drawer: Option<&PageElement>) {
        let page = self.page.as_ref();
        if let Some(close) = locator::close_button_for(page, drawer) {
            simulate_click(&close, page.is_touch_primary());
        }
        wait_until_gone(
            || !locator::visible_close_buttons(page).is_empty(),
            self.config.close_timeout,
        )
        .await;
        sleep(Duration::from_millis(100)).await;
    }

    /// Wait for the results banner and at least one row to render.
    pub async fn wait_for_orders(&self) -> bool {
        let page = self.page.as_ref();
        wait_until(
            || {
                locator::total_order_count(page).is_some()
                    && !locator::order_rows(page).is_empty()
            },
            self.config.startup_timeout,
            Duration::from_millis(200),
        )
        .await
    }
}
