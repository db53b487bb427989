//! Browser session lifecycle
//!
//! Owns the browser and page handles, coalesces concurrent initialization
//! attempts onto a single in-flight future, and reacts to asynchronous
//! invalidation (disconnect, page close, page crash) without poisoning later
//! calls.
//!
//! # Locking
//!
//! All mutable state lives behind one `tokio::sync::Mutex`; invalidation
//! events go through a generation counter so a watcher for a torn-down
//! session can never clobber its successor. The only lock-free read is the
//! generation pre-check on the invalidation path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::HandlerConfig;
use crate::automation::{BrowserHandle, Connector, PageEvent, PageHandle};
use crate::discovery::EndpointResolver;
use crate::error::{HandlerError, Result};
use crate::utils::constants::PROMPT_INPUT;

/// Lifecycle of the managed browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

type InitFuture = Shared<BoxFuture<'static, std::result::Result<(), Arc<HandlerError>>>>;

struct SessionInner {
    state: SessionState,
    browser: Option<Arc<dyn BrowserHandle>>,
    page: Option<Arc<dyn PageHandle>>,
    /// Single-slot memo of the in-flight initialization. Concurrent callers
    /// clone and await this instead of starting their own attempt.
    inflight: Option<InitFuture>,
    generation: u64,
}

/// Manages exactly one browser session for one handler.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<HandlerConfig>,
    resolver: Arc<dyn EndpointResolver>,
    connector: Arc<dyn Connector>,
    inner: Arc<Mutex<SessionInner>>,
    generation: Arc<AtomicU64>,
}

impl SessionManager {
    pub fn new(
        config: HandlerConfig,
        resolver: Arc<dyn EndpointResolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            connector,
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Uninitialized,
                browser: None,
                page: None,
                inflight: None,
                generation: 0,
            })),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Guarantee a live, navigated, input-ready page.
    ///
    /// Fast path: state is `Ready` and both handles independently report
    /// live. Otherwise joins the in-flight initialization, starting one only
    /// if none exists. At most one connect+navigate sequence runs at any
    /// time, no matter how many callers arrive.
    pub async fn ensure_ready(&self) -> Result<Arc<dyn PageHandle>> {
        let init = {
            let mut inner = self.inner.lock().await;

            if inner.state == SessionState::Ready {
                if let (Some(browser), Some(page)) = (&inner.browser, &inner.page)
                    && browser.is_connected().await
                    && page.is_live().await
                {
                    return Ok(page.clone());
                }
                // Ready on paper, dead in practice: rebuild from scratch.
                warn!("session handles are stale; reinitializing");
                self.teardown_locked(&mut inner).await;
            }

            match &inner.inflight {
                Some(init) => init.clone(),
                None => {
                    inner.state = SessionState::Initializing;
                    let manager = self.clone();
                    let init = async move { manager.run_initialization().await }
                        .boxed()
                        .shared();
                    inner.inflight = Some(init.clone());
                    init
                }
            }
        };

        init.await.map_err(HandlerError::Shared)?;

        let inner = self.inner.lock().await;
        inner.page.clone().ok_or_else(|| {
            HandlerError::initialization("session was invalidated before it could be used")
        })
    }

    /// Tear down the session when the page or browser actually died.
    ///
    /// Called by the facade after an interaction failure; a timeout against a
    /// healthy page must not cost the session.
    pub async fn reset_if_dead(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Ready {
            return;
        }
        let alive = match (&inner.browser, &inner.page) {
            (Some(browser), Some(page)) => browser.is_connected().await && page.is_live().await,
            _ => false,
        };
        if !alive {
            warn!("page or browser died mid-interaction; resetting session");
            self.teardown_locked(&mut inner).await;
        }
    }

    /// Await any in-flight initialization (either outcome), then tear down.
    /// Safe to call repeatedly.
    pub async fn dispose(&self) {
        let inflight = self.inner.lock().await.inflight.clone();
        if let Some(init) = inflight {
            let _ = init.await;
        }
        let mut inner = self.inner.lock().await;
        self.teardown_locked(&mut inner).await;
        debug!("session disposed");
    }

    /// Body of the memoized initialization future. Clears the slot on both
    /// outcomes so the next call starts fresh instead of retrying a poisoned
    /// memo.
    async fn run_initialization(self) -> std::result::Result<(), Arc<HandlerError>> {
        let result = self.try_initialize().await;
        let mut inner = self.inner.lock().await;
        inner.inflight = None;

        match result {
            Ok((browser, page, events)) => {
                let generation = self.bump_generation(&mut inner);
                inner.state = SessionState::Ready;
                inner.browser = Some(browser.clone());
                inner.page = Some(page);
                drop(inner);
                self.spawn_watchers(browser, events, generation);
                info!(generation, "browser session ready");
                Ok(())
            }
            Err(e) => {
                inner.state = SessionState::Failed;
                inner.browser = None;
                inner.page = None;
                Err(Arc::new(e))
            }
        }
    }

    async fn try_initialize(
        &self,
    ) -> Result<(
        Arc<dyn BrowserHandle>,
        Arc<dyn PageHandle>,
        mpsc::Receiver<PageEvent>,
    )> {
        let port = self.config.debug_port;
        info!(port, "initializing browser session");

        let endpoint = self
            .resolver
            .resolve_endpoint(port)
            .await
            .map_err(|e| HandlerError::discovery_with(port, e))?
            .ok_or_else(|| HandlerError::discovery(port))?;
        debug!(%endpoint, "resolved browser endpoint");

        let browser = self.connector.connect(&endpoint).await.map_err(|e| {
            HandlerError::initialization_with(format!("connect to {endpoint} failed"), e)
        })?;

        match self.attach_page(&browser).await {
            Ok((page, events)) => Ok((browser, page, events)),
            Err(e) => {
                // Release the connection we just opened before surfacing.
                if let Err(detach_err) = browser.detach().await {
                    warn!(error = %detach_err, "detach after failed initialization");
                }
                Err(e)
            }
        }
    }

    async fn attach_page(
        &self,
        browser: &Arc<dyn BrowserHandle>,
    ) -> Result<(Arc<dyn PageHandle>, mpsc::Receiver<PageEvent>)> {
        let base_url = self.config.base_url.trim_end_matches('/');

        // Reuse a page already on the target application; renavigating it
        // would discard login state or an open conversation.
        let pages = browser
            .pages()
            .await
            .map_err(|e| HandlerError::initialization_with("page enumeration failed", e))?;
        let mut existing = None;
        for page in pages {
            if let Ok(url) = page.current_url().await
                && url.starts_with(base_url)
            {
                existing = Some(page);
                break;
            }
        }

        let page = match existing {
            Some(page) => {
                debug!("reusing page already on the target application");
                page
            }
            None => browser
                .open_page("about:blank")
                .await
                .map_err(|e| HandlerError::initialization_with("opening a page failed", e))?,
        };

        let current = page.current_url().await.unwrap_or_default();
        if !current.starts_with(base_url) {
            tokio::time::timeout(self.config.timeout(), page.navigate(&self.config.base_url))
                .await
                .map_err(|_| {
                    HandlerError::initialization(format!(
                        "navigation to {} timed out after {}ms",
                        self.config.base_url, self.config.timeout_ms
                    ))
                })?
                .map_err(|e| {
                    HandlerError::initialization_with(
                        format!("navigation to {} failed", self.config.base_url),
                        e,
                    )
                })?;
        }

        let events = page
            .subscribe_events()
            .await
            .map_err(|e| HandlerError::initialization_with("page event subscription failed", e))?;

        // Readiness signal: the application accepts input once the prompt
        // region is visible.
        page.wait_for_visible(PROMPT_INPUT, self.config.timeout())
            .await
            .map_err(|e| {
                HandlerError::initialization_with("input surface never became visible", e)
            })?;

        Ok((page, events))
    }

    fn spawn_watchers(
        &self,
        browser: Arc<dyn BrowserHandle>,
        mut events: mpsc::Receiver<PageEvent>,
        generation: u64,
    ) {
        let manager = self.clone();
        tokio::spawn(async move {
            browser.closed().await;
            manager.invalidate(generation, "browser disconnected").await;
        });

        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    PageEvent::Crashed => {
                        manager.invalidate(generation, "page crashed").await;
                        break;
                    }
                    PageEvent::Closed => {
                        manager.invalidate(generation, "page closed").await;
                        break;
                    }
                    PageEvent::ScriptError(detail) => {
                        warn!(generation, %detail, "uncaught in-page script error");
                    }
                }
            }
        });
    }

    /// Flip to not-ready and drop the handles, but only when the event
    /// belongs to the current session generation.
    async fn invalidate(&self, generation: u64, reason: &str) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        warn!(generation, reason, "session invalidated");
        inner.state = SessionState::Uninitialized;
        inner.page = None;
        // The transport behind these handles is already dead; dropping is
        // all the cleanup there is.
        inner.browser = None;
        self.bump_generation(&mut inner);
    }

    /// Idempotent teardown. Ready flag and page go first; a still-connected
    /// browser gets a graceful detach, never a destructive close, since the
    /// tab may be a user's own session. Detach problems are logged, not
    /// thrown.
    async fn teardown_locked(&self, inner: &mut SessionInner) {
        inner.state = SessionState::Uninitialized;
        inner.page = None;
        self.bump_generation(inner);

        if let Some(browser) = inner.browser.take()
            && browser.is_connected().await
            && let Err(e) = browser.detach().await
        {
            warn!(error = %e, "browser detach failed during teardown; continuing");
        }
    }

    fn bump_generation(&self, inner: &mut SessionInner) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.generation = generation;
        generation
    }
}
