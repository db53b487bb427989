//! Request/response API over a browser-hosted chat application
//!
//! Attaches to an already-running, remotely-debuggable browser via chromiumoxide,
//! drives the chat application's input surface, and extracts generated replies
//! by watching the DOM. There is no completion event to subscribe to, so the
//! core wait primitive is a bounded poll over the response-container count.

pub mod automation;
pub mod discovery;
mod error;
mod handler;
mod input;
mod observer;
pub mod prompt;
mod session;
mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for a single chat-bridge handler.
///
/// Every field falls back to a usable default, so `HandlerConfig::default()`
/// (or an empty `config.yaml`) produces a working setup pointed at a local
/// browser started with `--remote-debugging-port=9222`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Base URL of the chat application the attached page must be on.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Local remote-debugging port to discover the browser endpoint on.
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,

    /// Deadline in milliseconds for each blocking wait (readiness,
    /// selector waits, the response poll).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Display name reported by `ChatHandler::model()`.
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Max-output-tokens value reported in the model metadata. Advisory
    /// only; the web application enforces its own limits.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_base_url() -> String {
    "https://chatgpt.com".to_string()
}

fn default_debug_port() -> u16 {
    9222
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_model_name() -> String {
    "chatgpt-web".to_string()
}

fn default_max_output_tokens() -> u32 {
    4096
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            debug_port: default_debug_port(),
            timeout_ms: default_timeout_ms(),
            model_name: default_model_name(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl HandlerConfig {
    /// Operation deadline as a `Duration`.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

/// Load config from config.yaml in package root
pub fn load_yaml_config() -> anyhow::Result<HandlerConfig> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml");

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let config: HandlerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    } else {
        Ok(HandlerConfig::default())
    }
}

pub use error::{HandlerError, Result};
pub use handler::{ChatHandler, ModelDescriptor, ModelInfo, ResponseChunk, count_tokens};
pub use prompt::{ContentBlock, ConversationTurn, MessageContent, Role, flatten_conversation};
pub use session::{SessionManager, SessionState};
