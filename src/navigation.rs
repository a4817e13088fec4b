//! Detection and repair of corrupted client-side routing state.
//!
//! Opening a detail drawer pushes the order's UUID into the URL as a side
//! effect. Failed or repeated open attempts stack UUIDs into the path until
//! the application's router stops responding. The guard rewrites history in
//! place whenever it can; the orchestrator escalates to a snapshot-and-reload
//! only after the wedged-routing threshold.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::interaction::simulate_click;
use crate::locator;
use crate::page::{PageAdapter, Route};
use crate::wait::wait_until_gone;

/// Path length beyond which the URL is considered corrupted.
pub const MAX_PATH_LEN: usize = 200;
/// UUID-shaped tokens tolerated in the path before it counts as corrupted.
pub const MAX_PATH_UUIDS: usize = 2;
/// Consecutive no-drawer open attempts before routing counts as wedged.
pub const WEDGED_ATTEMPT_THRESHOLD: u32 = 3;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});

/// Query parameters that survive into the canonical list URL.
const MERCHANT_PARAM: &str = "restaurantUUID";
const RANGE_PARAM: &str = "dateRange";
const RANGE_START_PARAM: &str = "start";
const RANGE_END_PARAM: &str = "end";

/// Path of the clean order-list view.
pub const LIST_PATH: &str = "/manager/orders";

/// Canonical list URL rebuilt from the known query parameters.
///
/// Falls back to the list path with the current query when the merchant or
/// range bounds are absent.
pub fn clean_base_url(route: &Route) -> String {
    let merchant = route.param(MERCHANT_PARAM);
    let start = route.param(RANGE_START_PARAM);
    let end = route.param(RANGE_END_PARAM);

    if let (Some(merchant), Some(start), Some(end)) = (merchant, start, end) {
        let range = route.param(RANGE_PARAM).unwrap_or("custom");
        format!(
            "{}{}?{}={}&{}={}&{}={}&{}={}",
            route.origin,
            LIST_PATH,
            MERCHANT_PARAM,
            merchant,
            RANGE_PARAM,
            range,
            RANGE_START_PARAM,
            start,
            RANGE_END_PARAM,
            end,
        )
    } else {
        let mut fallback = route.clone();
        fallback.path = LIST_PATH.to_string();
        fallback.url()
    }
}

/// Whether `path` shows any corruption signature.
pub fn is_corrupted(path: &str) -> bool {
    if path.len() > MAX_PATH_LEN {
        warn!(len = path.len(), "URL corruption: path too long");
        return true;
    }
    if path.contains("//") {
        warn!("URL corruption: doubled separator in path");
        return true;
    }
    let uuids = UUID_RE.find_iter(path).count();
    if uuids > MAX_PATH_UUIDS {
        warn!(uuids, "URL corruption: UUID stacking in path");
        return true;
    }
    false
}

/// Rewrite a corrupted URL in place and close any stray drawer.
///
/// Returns whether a repair was performed.
pub async fn repair(page: &dyn PageAdapter) -> bool {
    let route = page.current_route();
    if !is_corrupted(&route.path) {
        return false;
    }
    let clean = clean_base_url(&route);
    debug!(%clean, "rewriting corrupted URL");
    page.replace_route(&clean);
    sleep(Duration::from_millis(500)).await;
    close_stray_drawer(page).await;
    true
}

/// Close an already-open drawer, if one is showing.
pub async fn close_stray_drawer(page: &dyn PageAdapter) -> bool {
    let Some(close) = locator::visible_close_buttons(page).into_iter().next() else {
        return false;
    };
    debug!("closing stray open drawer");
    simulate_click(&close, page.is_touch_primary());
    wait_until_gone(
        || !locator::visible_close_buttons(page).is_empty(),
        Duration::from_secs(3),
    )
    .await;
    sleep(Duration::from_millis(300)).await;
    true
}

/// Post-order hygiene: reset detail URLs back to the clean list view, then
/// run a corruption check as a safety net.
pub async fn cleanup_after_order(page: &dyn PageAdapter) {
    let route = page.current_route();
    if route.path.starts_with(LIST_PATH) && route.path != LIST_PATH {
        let clean = clean_base_url(&route);
        debug!(%clean, "resetting detail URL to list view");
        page.replace_route(&clean);
        sleep(Duration::from_millis(200)).await;
    }

    if is_corrupted(&page.current_route().path) {
        warn!("URL still corrupted after order, forcing reset");
        repair(page).await;
        sleep(Duration::from_millis(500)).await;
    }
}

/// Polls the current route and reports changes.
///
/// Passive collaborator for re-initialization: it never interleaves with an
/// in-flight order's state machine, it only tells the embedder the visible
/// route moved.
pub struct RouteWatcher {
    last: Route,
    interval: Duration,
}

impl RouteWatcher {
    pub fn new(page: &dyn PageAdapter) -> Self {
        Self {
            last: page.current_route(),
            interval: Duration::from_millis(500),
        }
    }

    /// Waits one poll interval, then reports the new route if it changed.
    pub async fn tick(&mut self, page: &dyn PageAdapter) -> Option<Route> {
        sleep(self.interval).await;
        let current = page.current_route();
        if current != self.last {
            debug!(url = %current.url(), "route change detected");
            self.last = current.clone();
            Some(current)
        } else {
            None
        }
    }
}
