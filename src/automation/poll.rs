use anyhow::Result;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Repeatedly evaluates `predicate` until it reports `true` or `timeout`
/// elapses.
///
/// The predicate runs once immediately and once more after every sleep,
/// including the sleep that lands exactly on the deadline. Each sleep is
/// `min(interval, remaining)`, so the wait never overshoots the deadline.
/// Returns `Ok(false)` when the deadline passes without a match; errors from
/// the predicate end the wait and propagate.
pub async fn poll_until<F>(interval: Duration, timeout: Duration, mut predicate: F) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if predicate()? {
            return Ok(true);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }

        let remaining = deadline - now;
        time::sleep(interval.min(remaining)).await;
    }
}
