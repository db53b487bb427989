//! DOM contract and fixed limits
//!
//! The selectors mirror the live chat application's markup and are brittle by
//! construction; they are the single place to touch when the application
//! changes its layout.

use std::time::Duration;

/// Contenteditable prompt region. Visibility of this element is the
/// readiness signal for the whole session.
pub const PROMPT_INPUT: &str = "#prompt-textarea";

/// Send control, only matched while enabled.
pub const SEND_BUTTON: &str = "button[data-testid=\"send-button\"]:not([disabled])";

/// Transient stop control shown while a reply is being generated.
pub const STOP_BUTTON: &str = "button[data-testid=\"stop-button\"]";

/// Control that reappears once the composer accepts input again.
pub const READY_INDICATOR: &str = "button[data-testid=\"composer-speech-button\"]";

/// One container per generated reply, appended in document order.
pub const RESPONSE_CONTAINER: &str = "div[data-message-author-role=\"assistant\"]";

/// Rendered-content panel nested in each response container.
pub const RESPONSE_PANEL: &str = ".markdown";

/// Fixed interval of the response-count poll.
pub const RESPONSE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long the processing indicator gets to appear after submission before
/// we assume generation outpaced the poll.
pub const PROCESSING_APPEAR_WINDOW: Duration = Duration::from_secs(5);

/// Short wait used when locating the enabled send control.
pub const SEND_BUTTON_WINDOW: Duration = Duration::from_secs(10);

/// Context window reported in model metadata. The web application does not
/// expose the real value; this matches the hosted model's published limit.
pub const CONTEXT_WINDOW: u32 = 128_000;
