//! Debug endpoint discovery
//!
//! Resolves a local remote-debugging port to the browser's websocket control
//! endpoint by querying `GET /json/version`. An unreachable port is a
//! negative result, not an error: the browser may simply not be running yet.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// How long the version probe may take before the port counts as unreachable.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct JsonVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Resolves a debug port to a browser control endpoint.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// `Ok(None)` means nothing answered on the port; `Err` means the port
    /// answered with something that is not a debuggable browser.
    async fn resolve_endpoint(&self, port: u16) -> anyhow::Result<Option<String>>;
}

/// HTTP implementation querying the browser's `/json/version` endpoint.
pub struct HttpEndpointResolver {
    client: reqwest::Client,
}

impl HttpEndpointResolver {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpEndpointResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EndpointResolver for HttpEndpointResolver {
    async fn resolve_endpoint(&self, port: u16) -> anyhow::Result<Option<String>> {
        let url = format!("http://127.0.0.1:{port}/json/version");
        debug!(%url, "probing browser debug endpoint");

        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(%url, error = %e, "debug port did not answer");
                return Ok(None);
            }
        };

        if !resp.status().is_success() {
            anyhow::bail!("debug endpoint returned {}", resp.status());
        }

        let body: JsonVersion = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("malformed /json/version payload: {e}"))?;

        Ok(Some(body.web_socket_debugger_url))
    }
}
