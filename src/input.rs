//! Prompt injection
//!
//! Drives the application's contenteditable prompt region: clear what is
//! there, insert the new text as simulated editing, then click the enabled
//! send control. A raw value assignment would leave the application's editor
//! state (and its send-button enablement) out of sync, so everything goes
//! through real focus and edit events.

use std::time::Duration;

use tracing::debug;

use crate::automation::PageHandle;
use crate::error::{HandlerError, Result};
use crate::utils::constants::{PROMPT_INPUT, SEND_BUTTON, SEND_BUTTON_WINDOW};

/// Inject `text` into the prompt region and submit it.
pub async fn submit_prompt(page: &dyn PageHandle, text: &str, timeout: Duration) -> Result<()> {
    page.wait_for_visible(PROMPT_INPUT, timeout)
        .await
        .map_err(|e| HandlerError::interaction_with("prompt input not visible", e))?;

    page.focus(PROMPT_INPUT)
        .await
        .map_err(|e| HandlerError::interaction_with("focusing the prompt input failed", e))?;

    page.replace_editor_text(PROMPT_INPUT, text)
        .await
        .map_err(|e| HandlerError::interaction_with("injecting the prompt failed", e))?;

    debug!(chars = text.len(), "prompt injected; locating send control");

    // The send control only enables once the editor has content, so give it
    // a short window rather than failing on the first look.
    page.wait_for_visible(SEND_BUTTON, SEND_BUTTON_WINDOW.min(timeout))
        .await
        .map_err(|e| HandlerError::interaction_with("no enabled send control", e))?;

    page.click(SEND_BUTTON)
        .await
        .map_err(|e| HandlerError::interaction_with("clicking the send control failed", e))?;

    Ok(())
}
