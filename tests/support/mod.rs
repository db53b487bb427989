//! In-memory fake of the automation surface
//!
//! Implements the discovery and browser traits over plain shared state so the
//! session manager, input driver, and response observer can be exercised
//! without a browser. Tests script what a send click appends to the page and
//! inject invalidation events directly.

// Each test binary exercises its own subset of the fake surface.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};

use chat_bridge::automation::{BrowserHandle, Connector, PageEvent, PageHandle, PanelText};
use chat_bridge::discovery::EndpointResolver;

/// Route adapter logs through the test harness when `RUST_LOG` asks for them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Resolver that always answers with the same scripted result.
pub struct FakeResolver {
    endpoint: Option<String>,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub fn with_endpoint() -> Self {
        Self {
            endpoint: Some("ws://127.0.0.1:9222/devtools/browser/fake".to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn without_endpoint() -> Self {
        Self {
            endpoint: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EndpointResolver for FakeResolver {
    async fn resolve_endpoint(&self, _port: u16) -> anyhow::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.endpoint.clone())
    }
}

/// What one send click appends to the page. Each click consumes one effect;
/// a click with no scripted effect appends nothing.
#[derive(Debug, Clone)]
pub struct SubmitEffect {
    /// Panel text per appended container; `None` appends a container with no
    /// content panel.
    pub append: Vec<Option<String>>,
}

impl SubmitEffect {
    pub fn reply(text: &str) -> Self {
        Self {
            append: vec![Some(text.to_string())],
        }
    }
}

pub struct FakePage {
    live: AtomicBool,
    url: Mutex<String>,
    pub navigations: Mutex<Vec<String>>,
    pub injected: Mutex<Vec<String>>,
    pub clicks: Mutex<Vec<String>>,
    containers: Mutex<Vec<Option<String>>>,
    submit_effects: Mutex<VecDeque<SubmitEffect>>,
    pub stop_visible: AtomicBool,
    pub ready_visible: AtomicBool,
    /// When set, the next injection kills the page mid-edit.
    pub die_on_injection: AtomicBool,
    hidden: Mutex<Vec<String>>,
    events_tx: Mutex<Option<mpsc::Sender<PageEvent>>>,
}

impl std::fmt::Debug for FakePage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakePage").finish_non_exhaustive()
    }
}

impl FakePage {
    pub fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            live: AtomicBool::new(true),
            url: Mutex::new(url.to_string()),
            navigations: Mutex::new(Vec::new()),
            injected: Mutex::new(Vec::new()),
            clicks: Mutex::new(Vec::new()),
            containers: Mutex::new(Vec::new()),
            submit_effects: Mutex::new(VecDeque::new()),
            stop_visible: AtomicBool::new(false),
            ready_visible: AtomicBool::new(true),
            die_on_injection: AtomicBool::new(false),
            hidden: Mutex::new(Vec::new()),
            events_tx: Mutex::new(None),
        })
    }

    pub async fn script_submit(&self, effect: SubmitEffect) {
        self.submit_effects.lock().await.push_back(effect);
    }

    pub async fn preload_containers(&self, texts: &[&str]) {
        let mut containers = self.containers.lock().await;
        containers.extend(texts.iter().map(|t| Some(t.to_string())));
    }

    pub async fn container_count(&self) -> usize {
        self.containers.lock().await.len()
    }

    /// Append a container out of band, as a later reply would.
    pub async fn append_container(&self, text: &str) {
        self.containers.lock().await.push(Some(text.to_string()));
    }

    /// Make a selector invisible to `wait_for_visible`.
    pub async fn hide(&self, selector: &str) {
        self.hidden.lock().await.push(selector.to_string());
    }

    pub fn kill(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Push an invalidation event to whoever subscribed.
    pub async fn emit(&self, event: PageEvent) {
        let tx = self.events_tx.lock().await.clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn current_url(&self) -> anyhow::Result<String> {
        Ok(self.url.lock().await.clone())
    }

    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.navigations.lock().await.push(url.to_string());
        *self.url.lock().await = url.to_string();
        Ok(())
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.hidden.lock().await.iter().any(|s| s == selector) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("element not visible: '{selector}'");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn focus(&self, _selector: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn replace_editor_text(&self, _selector: &str, text: &str) -> anyhow::Result<()> {
        if self.die_on_injection.load(Ordering::SeqCst) {
            self.live.store(false, Ordering::SeqCst);
            anyhow::bail!("page went away mid-edit");
        }
        self.injected.lock().await.push(text.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str) -> anyhow::Result<()> {
        self.clicks.lock().await.push(selector.to_string());
        if selector.contains("send-button") {
            let effect = self.submit_effects.lock().await.pop_front();
            if let Some(effect) = effect {
                self.containers.lock().await.extend(effect.append);
            }
        }
        Ok(())
    }

    async fn count(&self, _selector: &str) -> anyhow::Result<usize> {
        Ok(self.containers.lock().await.len())
    }

    async fn exists(&self, selector: &str) -> anyhow::Result<bool> {
        if selector.contains("stop-button") {
            Ok(self.stop_visible.load(Ordering::SeqCst))
        } else if selector.contains("speech") {
            Ok(self.ready_visible.load(Ordering::SeqCst))
        } else {
            Ok(false)
        }
    }

    async fn panel_text(
        &self,
        _container: &str,
        index: usize,
        _panel: &str,
    ) -> anyhow::Result<PanelText> {
        Ok(match self.containers.lock().await.get(index) {
            None => PanelText::MissingContainer,
            Some(None) => PanelText::MissingPanel,
            Some(Some(text)) => PanelText::Text(text.clone()),
        })
    }

    async fn subscribe_events(&self) -> anyhow::Result<mpsc::Receiver<PageEvent>> {
        let (tx, rx) = mpsc::channel(16);
        *self.events_tx.lock().await = Some(tx);
        Ok(rx)
    }
}

pub struct FakeBrowser {
    connected: AtomicBool,
    pub detached: AtomicBool,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    pub page: Arc<FakePage>,
    /// Pages reported by enumeration; empty means the session must open one.
    pub existing_pages: Mutex<Vec<Arc<FakePage>>>,
    pub opened: AtomicUsize,
}

impl FakeBrowser {
    pub fn new(page: Arc<FakePage>) -> Arc<Self> {
        let (closed_tx, closed_rx) = watch::channel(false);
        Arc::new(Self {
            connected: AtomicBool::new(true),
            detached: AtomicBool::new(false),
            closed_tx,
            closed_rx,
            page,
            existing_pages: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
        })
    }

    /// Simulate the transport dropping out from under us.
    pub fn simulate_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.page.kill();
        let _ = self.closed_tx.send(true);
    }
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.detached.load(Ordering::SeqCst)
    }

    async fn pages(&self) -> anyhow::Result<Vec<Arc<dyn PageHandle>>> {
        Ok(self
            .existing_pages
            .lock()
            .await
            .iter()
            .map(|p| p.clone() as Arc<dyn PageHandle>)
            .collect())
    }

    async fn open_page(&self, url: &str) -> anyhow::Result<Arc<dyn PageHandle>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.page.url.lock().await = url.to_string();
        Ok(self.page.clone())
    }

    async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    async fn detach(&self) -> anyhow::Result<()> {
        self.detached.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out scripted browsers, one per connect call.
pub struct FakeConnector {
    browsers: Mutex<VecDeque<Arc<FakeBrowser>>>,
    pub connects: AtomicUsize,
    pub fail_connect: AtomicBool,
    connect_delay: Duration,
}

impl FakeConnector {
    pub fn new(browsers: Vec<Arc<FakeBrowser>>) -> Arc<Self> {
        Arc::new(Self {
            browsers: Mutex::new(browsers.into()),
            connects: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            connect_delay: Duration::ZERO,
        })
    }

    /// Connector that stalls inside connect, letting tests pile callers onto
    /// the same in-flight initialization.
    pub fn with_delay(browsers: Vec<Arc<FakeBrowser>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            browsers: Mutex::new(browsers.into()),
            connects: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            connect_delay: delay,
        })
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _endpoint: &str) -> anyhow::Result<Arc<dyn BrowserHandle>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            anyhow::bail!("scripted connect failure");
        }
        self.browsers
            .lock()
            .await
            .pop_front()
            .map(|b| b as Arc<dyn BrowserHandle>)
            .ok_or_else(|| anyhow::anyhow!("no more scripted browsers"))
    }
}
