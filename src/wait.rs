use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Default poll interval for disappearance checks.
pub const GONE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls `predicate` until it returns true or `timeout` elapses.
///
/// Cooperative: suspends between polls, never blocks a thread. There is no
/// external cancellation; callers that want to give up layer their own retry
/// policy on top of the boolean result.
pub async fn wait_until<F>(mut predicate: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(interval).await;
    }
}

/// Resolves true the instant `locate` stops matching, false on timeout.
/// Polls every 100 ms.
pub async fn wait_until_gone<F>(mut locate: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    wait_until(move || !locate(), timeout, GONE_POLL_INTERVAL).await
}
