//! Response observation
//!
//! The application never announces that a reply finished. What it does do is
//! append one response container per reply, so the observer snapshots the
//! container count before submission and polls until the count grows. The
//! stop/processing indicator brackets the generation phase but flickers, so
//! it is used as a synchronization hint only, never as a correctness gate.

use std::time::Duration;

use tracing::debug;

use crate::automation::{PageHandle, PanelText};
use crate::error::{HandlerError, Result};
use crate::utils::constants::{
    PROCESSING_APPEAR_WINDOW, READY_INDICATOR, RESPONSE_CONTAINER, RESPONSE_PANEL,
    RESPONSE_POLL_INTERVAL, STOP_BUTTON,
};
use crate::utils::poll_until;

/// Count the response containers present right now. Call immediately before
/// submission; the result is the baseline for [`await_response`].
pub async fn count_responses(page: &dyn PageHandle) -> Result<usize> {
    page.count(RESPONSE_CONTAINER)
        .await
        .map_err(|e| HandlerError::interaction_with("counting response containers failed", e))
}

/// Wait for the reply that submission at baseline `n0` produced and return
/// its decoded text.
pub async fn await_response(page: &dyn PageHandle, n0: usize, timeout: Duration) -> Result<String> {
    wait_out_processing_indicator(page, timeout).await;

    // The core wait: a new container must appear. This is the only signal
    // the application actually guarantees.
    poll_until(
        "a new response container",
        timeout,
        RESPONSE_POLL_INTERVAL,
        || async {
            let count = page
                .count(RESPONSE_CONTAINER)
                .await
                .map_err(|e| e.context("re-counting response containers"))?;
            Ok(count > n0)
        },
    )
    .await
    .map_err(|e| HandlerError::interaction_with("no new response appeared", e))?;

    // Always take index n0, the first container appended after the snapshot.
    // Taking the last one would return the wrong reply whenever several
    // containers land in one batch.
    let text = match page
        .panel_text(RESPONSE_CONTAINER, n0, RESPONSE_PANEL)
        .await
        .map_err(|e| HandlerError::interaction_with("reading the response container failed", e))?
    {
        PanelText::MissingContainer => {
            return Err(HandlerError::interaction(format!(
                "response container at index {n0} disappeared before it could be read"
            )));
        }
        PanelText::MissingPanel => {
            return Err(HandlerError::interaction(format!(
                "response container at index {n0} has no content panel"
            )));
        }
        PanelText::Text(text) => text,
    };

    // Best-effort hint that the composer is accepting input again.
    match page.exists(READY_INDICATOR).await {
        Ok(true) => {}
        Ok(false) => debug!("ready indicator not present after response"),
        Err(e) => debug!(error = %e, "ready indicator probe failed"),
    }

    Ok(decode_entities(&text).trim().to_string())
}

/// Wait for the processing indicator to appear and then vanish. Both waits
/// are hints: generation can finish inside one poll interval, and the
/// indicator can flicker, so timeouts here are logged and swallowed.
async fn wait_out_processing_indicator(page: &dyn PageHandle, timeout: Duration) {
    let appeared = poll_until(
        "the processing indicator to appear",
        PROCESSING_APPEAR_WINDOW.min(timeout),
        RESPONSE_POLL_INTERVAL,
        || async { Ok(page.exists(STOP_BUTTON).await.unwrap_or(false)) },
    )
    .await
    .is_ok();

    if !appeared {
        debug!("processing indicator never appeared; generation may have outpaced the poll");
        return;
    }

    if poll_until(
        "the processing indicator to vanish",
        timeout,
        RESPONSE_POLL_INTERVAL,
        || async { Ok(!page.exists(STOP_BUTTON).await.unwrap_or(false)) },
    )
    .await
    .is_err()
    {
        debug!(
            timeout_ms = timeout.as_millis() as u64,
            "processing indicator still visible at the deadline"
        );
    }
}

/// Decode the five standard HTML/XML character entities. `&amp;` goes last
/// so already-decoded ampersands cannot cascade into a second decode.
pub fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
