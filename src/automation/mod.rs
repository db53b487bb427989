//! Injected browser-automation surface
//!
//! The session manager, input driver, and response observer talk to the
//! browser exclusively through these traits, so they can be exercised against
//! an in-memory fake as well as the chromiumoxide implementation in [`cdp`].

pub mod cdp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Asynchronous invalidation events pushed by a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// The page's renderer crashed; the handle is unusable.
    Crashed,
    /// The page or its target was closed/detached.
    Closed,
    /// An uncaught in-page script error. Informational only.
    ScriptError(String),
}

/// Result of looking up the content panel inside the n-th response container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelText {
    /// No container exists at the requested index.
    MissingContainer,
    /// The container exists but holds no content panel.
    MissingPanel,
    /// Rendered text of the panel.
    Text(String),
}

/// Opens a control connection to a browser endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> anyhow::Result<Arc<dyn BrowserHandle>>;
}

/// A live connection to a browser instance.
///
/// Handles become unusable the moment the underlying transport drops; callers
/// re-check [`is_connected`](BrowserHandle::is_connected) before each use
/// rather than caching results across awaits.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Liveness probe. Must hit the real connection, not cached state.
    async fn is_connected(&self) -> bool;

    /// Enumerate currently open pages.
    async fn pages(&self) -> anyhow::Result<Vec<Arc<dyn PageHandle>>>;

    /// Open a new page already navigated to `url`.
    async fn open_page(&self, url: &str) -> anyhow::Result<Arc<dyn PageHandle>>;

    /// Resolves once the transport has dropped, however that happened.
    async fn closed(&self);

    /// Graceful detach. Releases the control connection without closing the
    /// browser or its tabs; they may belong to a user's own session.
    async fn detach(&self) -> anyhow::Result<()>;
}

/// A controllable page within a connected browser.
#[async_trait]
pub trait PageHandle: Send + Sync + std::fmt::Debug {
    /// Cheap liveness probe against the real target.
    async fn is_live(&self) -> bool;

    async fn current_url(&self) -> anyhow::Result<String>;

    async fn navigate(&self, url: &str) -> anyhow::Result<()>;

    /// Wait until `selector` matches a visible element.
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> anyhow::Result<()>;

    /// Scroll the element into view and give it focus.
    async fn focus(&self, selector: &str) -> anyhow::Result<()>;

    /// Replace the focused editor's content with `text` by simulating user
    /// editing (select-all, delete, insert). Raw value assignment does not
    /// work on rich contenteditable surfaces.
    async fn replace_editor_text(&self, selector: &str, text: &str) -> anyhow::Result<()>;

    async fn click(&self, selector: &str) -> anyhow::Result<()>;

    /// Number of elements currently matching `selector`.
    async fn count(&self, selector: &str) -> anyhow::Result<usize>;

    /// Whether at least one element matches `selector` right now.
    async fn exists(&self, selector: &str) -> anyhow::Result<bool>;

    /// Rendered text of `panel` inside the `index`-th element matching
    /// `container`, in document order.
    async fn panel_text(
        &self,
        container: &str,
        index: usize,
        panel: &str,
    ) -> anyhow::Result<PanelText>;

    /// Subscribe to crash/close/script-error events for this page.
    async fn subscribe_events(&self) -> anyhow::Result<mpsc::Receiver<PageEvent>>;
}
