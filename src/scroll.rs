//! Forcing a virtualized order list to materialize more rows.
//!
//! The list only renders what the user has scrolled past, so the driver
//! issues redundant scroll mechanisms (offset assignment, programmatic
//! scroll, last-row-into-view, synthetic wheel) and re-measures until the
//! target count is reached or growth stalls.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::element::{InputEvent, PageElement};
use crate::locator;
use crate::page::PageAdapter;
use crate::wait::wait_until_gone;

/// Consecutive non-growing iterations before the driver gives up.
pub const STAGNATION_LIMIT: u32 = 10;
/// Settle delay after each scroll burst.
const SETTLE_DELAY: Duration = Duration::from_millis(1000);
/// Bounded wait for the loading spinner to clear.
const LOADING_TIMEOUT: Duration = Duration::from_secs(4);

/// Outcome of a loading pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The rendered row count reached the target.
    Complete { rows: usize },
    /// Growth stalled; processing continues with what is loaded.
    Stalled { rows: usize },
}

impl LoadOutcome {
    pub fn rows(&self) -> usize {
        match self {
            LoadOutcome::Complete { rows } | LoadOutcome::Stalled { rows } => *rows,
        }
    }
}

/// One scroll burst through every redundant mechanism.
pub fn nudge(page: &dyn PageAdapter, container: &PageElement) {
    container.set_scroll_top(container.scroll_height());
    container.scroll_into_view();
    if let Some(last_row) = locator::order_rows(page).into_iter().next_back() {
        last_row.scroll_into_view();
    }
    container.dispatch(InputEvent::Wheel { delta_y: 100 });
}

/// One scroll burst plus its waits. Returns the rendered row count after
/// the burst settles.
pub async fn load_batch(page: &dyn PageAdapter, container: &PageElement) -> usize {
    nudge(page, container);
    sleep(Duration::from_millis(500)).await;
    wait_until_gone(|| locator::loading_indicator_present(container), LOADING_TIMEOUT).await;
    sleep(SETTLE_DELAY).await;
    locator::order_rows(page).len()
}

/// Scroll until `target` rows are rendered or growth stalls.
///
/// Stalls are not errors: the caller surfaces a partial-data warning and
/// processes whatever loaded.
pub async fn load_rows(
    page: &dyn PageAdapter,
    container: &PageElement,
    target: usize,
) -> LoadOutcome {
    let mut stagnant = 0u32;
    let mut last_count = locator::order_rows(page).len();

    while last_count < target && stagnant < STAGNATION_LIMIT {
        nudge(page, container);

        sleep(Duration::from_millis(500)).await;
        wait_until_gone(|| locator::loading_indicator_present(container), LOADING_TIMEOUT).await;
        sleep(SETTLE_DELAY).await;

        let count = locator::order_rows(page).len();
        if count > last_count {
            debug!(rows = count, "row set grew");
            stagnant = 0;
            last_count = count;
        } else {
            stagnant += 1;
            debug!(stagnant, "no row growth this iteration");
        }
    }

    if last_count >= target {
        LoadOutcome::Complete { rows: last_count }
    } else {
        warn!(
            rows = last_count,
            target, "row loading stalled, continuing with partial data"
        );
        LoadOutcome::Stalled { rows: last_count }
    }
}
