//! Deadline-bounded predicate polling
//!
//! The chat application emits no completion event, so "wait until a predicate
//! over the current DOM holds, or the deadline elapses" is the core wait
//! primitive. Kept generic over the probe so observers can be exercised
//! without a browser.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Poll `probe` every `interval` until it returns true or `timeout` elapses.
///
/// The first probe runs immediately. Probe errors abort the wait; they mean
/// the page itself failed, not that the condition is still pending.
pub async fn poll_until<F, Fut>(
    condition: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if probe().await? {
            return Ok(());
        }

        if Instant::now() + interval > deadline {
            anyhow::bail!(
                "timed out after {}ms waiting for {condition}",
                timeout.as_millis()
            );
        }

        tokio::time::sleep(interval).await;
    }
}
