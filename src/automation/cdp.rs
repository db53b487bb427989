//! chromiumoxide implementation of the automation surface
//!
//! Attaches to an already-running browser over its websocket debugger URL.
//! The CDP event `Handler` is drained by a spawned task; that task ending is
//! the push signal that the transport dropped. Liveness probes go through
//! live CDP calls (`Browser::version`, target URL reads) so a dead connection
//! is detected even when no event was delivered.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Browser;
use chromiumoxide::cdp::browser_protocol::inspector::{EventDetached, EventTargetCrashed};
use chromiumoxide::cdp::js_protocol::runtime::EventExceptionThrown;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use super::{BrowserHandle, Connector, PageEvent, PageHandle, PanelText};

/// Connects to a websocket debugger endpoint with a bounded attempt time.
pub struct CdpConnector {
    connect_timeout: Duration,
}

impl CdpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for CdpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

#[async_trait]
impl Connector for CdpConnector {
    async fn connect(&self, endpoint: &str) -> anyhow::Result<Arc<dyn BrowserHandle>> {
        let (browser, mut handler) =
            tokio::time::timeout(self.connect_timeout, Browser::connect(endpoint.to_string()))
                .await
                .map_err(|_| {
                    anyhow::anyhow!(
                        "connect to {endpoint} timed out after {}ms",
                        self.connect_timeout.as_millis()
                    )
                })??;

        let (closed_tx, closed_rx) = watch::channel(false);
        let event_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    let msg = e.to_string();
                    // Chrome sends CDP events chromiumoxide cannot deserialize;
                    // those are noise, not connection failures.
                    let benign = msg
                        .contains("data did not match any variant of untagged enum Message")
                        || msg.contains("Failed to deserialize WS response");
                    if benign {
                        trace!(error = %msg, "ignoring unrecognized CDP message");
                    } else {
                        error!(error = %msg, "browser handler error");
                    }
                }
            }
            debug!("browser event handler finished; transport is gone");
            let _ = closed_tx.send(true);
        });

        Ok(Arc::new(CdpBrowser {
            browser,
            event_task: Mutex::new(Some(event_task)),
            closed: closed_rx,
        }))
    }
}

/// A browser reached over an existing debug endpoint.
pub struct CdpBrowser {
    browser: Browser,
    event_task: Mutex<Option<JoinHandle<()>>>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl BrowserHandle for CdpBrowser {
    async fn is_connected(&self) -> bool {
        if *self.closed.borrow() {
            return false;
        }
        self.browser.version().await.is_ok()
    }

    async fn pages(&self) -> anyhow::Result<Vec<Arc<dyn PageHandle>>> {
        let pages = self.browser.pages().await?;
        Ok(pages
            .into_iter()
            .map(|page| Arc::new(CdpPage { page }) as Arc<dyn PageHandle>)
            .collect())
    }

    async fn open_page(&self, url: &str) -> anyhow::Result<Arc<dyn PageHandle>> {
        let page = self.browser.new_page(url).await?;
        Ok(Arc::new(CdpPage { page }))
    }

    async fn closed(&self) {
        let mut rx = self.closed.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // Sender dropped with the event task: same thing as closed.
    }

    async fn detach(&self) -> anyhow::Result<()> {
        // Stop draining events and drop the transport. Never `close()` here:
        // the browser and its tabs may be a user's own session.
        if let Some(task) = self.event_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}

/// One controllable page. Everything that inspects the DOM goes through
/// in-page evaluation so results reflect the live document, not a cache.
pub struct CdpPage {
    page: Page,
}

impl std::fmt::Debug for CdpPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpPage").finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct PanelLookup {
    found: bool,
    panel: bool,
    text: Option<String>,
}

fn js_string(value: &str) -> String {
    // serde_json string encoding is valid JS string literal syntax.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

impl CdpPage {
    async fn eval_value(&self, script: String) -> anyhow::Result<serde_json::Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn is_live(&self) -> bool {
        self.page.url().await.is_ok()
    }

    async fn current_url(&self) -> anyhow::Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.page.goto(url).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> anyhow::Result<()> {
        let start = std::time::Instant::now();
        let mut poll_interval = Duration::from_millis(100);
        let max_interval = Duration::from_secs(1);

        loop {
            // Visible means present with a resolvable click point, which
            // rules out zero-size and display:none matches.
            if let Ok(element) = self.page.find_element(selector).await
                && element.clickable_point().await.is_ok()
            {
                return Ok(());
            }

            if start.elapsed() >= timeout {
                anyhow::bail!(
                    "element not visible (timeout after {}ms): '{}'",
                    timeout.as_millis(),
                    selector
                );
            }

            tokio::time::sleep(poll_interval).await;
            poll_interval = (poll_interval * 2).min(max_interval);
        }
    }

    async fn focus(&self, selector: &str) -> anyhow::Result<()> {
        let element = self.page.find_element(selector).await?;
        element.scroll_into_view().await?;
        // Click at the resolved point instead of Element::click; focusing via
        // a real input event is what the application's editor expects.
        let point = element.clickable_point().await?;
        self.page.click(point).await?;
        Ok(())
    }

    async fn replace_editor_text(&self, selector: &str, text: &str) -> anyhow::Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                document.execCommand('selectAll', false, null);
                document.execCommand('delete', false, null);
                document.execCommand('insertText', false, {text});
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector),
            text = js_string(text),
        );
        let value = self.eval_value(script).await?;
        if value.as_bool() != Some(true) {
            anyhow::bail!("input surface '{selector}' vanished while editing");
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> anyhow::Result<()> {
        let element = self.page.find_element(selector).await?;
        element.scroll_into_view().await?;
        let point = element.clickable_point().await?;
        self.page.click(point).await?;
        Ok(())
    }

    async fn count(&self, selector: &str) -> anyhow::Result<usize> {
        let script = format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        );
        let value = self.eval_value(script).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn exists(&self, selector: &str) -> anyhow::Result<bool> {
        let script = format!("!!document.querySelector({})", js_string(selector));
        let value = self.eval_value(script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn panel_text(
        &self,
        container: &str,
        index: usize,
        panel: &str,
    ) -> anyhow::Result<PanelText> {
        let script = format!(
            r#"(() => {{
                const containers = document.querySelectorAll({container});
                const target = containers[{index}];
                if (!target) return {{ found: false, panel: false, text: null }};
                const panel = target.querySelector({panel});
                if (!panel) return {{ found: true, panel: false, text: null }};
                return {{ found: true, panel: true, text: panel.innerText }};
            }})()"#,
            container = js_string(container),
            index = index,
            panel = js_string(panel),
        );
        let value = self.eval_value(script).await?;
        let lookup: PanelLookup = serde_json::from_value(value)
            .map_err(|e| anyhow::anyhow!("unexpected panel lookup shape: {e}"))?;

        Ok(match lookup {
            PanelLookup { found: false, .. } => PanelText::MissingContainer,
            PanelLookup { panel: false, .. } => PanelText::MissingPanel,
            PanelLookup { text, .. } => PanelText::Text(text.unwrap_or_default()),
        })
    }

    async fn subscribe_events(&self) -> anyhow::Result<mpsc::Receiver<PageEvent>> {
        let (tx, rx) = mpsc::channel(16);
        let mut crashed = self.page.event_listener::<EventTargetCrashed>().await?;
        let mut detached = self.page.event_listener::<EventDetached>().await?;
        let mut exceptions = self.page.event_listener::<EventExceptionThrown>().await?;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    ev = crashed.next() => match ev {
                        Some(_) => {
                            let _ = tx.send(PageEvent::Crashed).await;
                            break;
                        }
                        None => break,
                    },
                    ev = detached.next() => match ev {
                        Some(_) => {
                            let _ = tx.send(PageEvent::Closed).await;
                            break;
                        }
                        None => break,
                    },
                    ev = exceptions.next() => match ev {
                        Some(ex) => {
                            let detail = ex
                                .exception_details
                                .exception
                                .as_ref()
                                .and_then(|e| e.description.clone())
                                .unwrap_or_else(|| ex.exception_details.text.clone());
                            let _ = tx.send(PageEvent::ScriptError(detail)).await;
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(rx)
    }
}
