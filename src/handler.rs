//! Public handler facade
//!
//! The contract the rest of the system consumes: produce a response for a
//! conversation or a single prompt, report model metadata, estimate tokens,
//! dispose. One handler owns one session manager; construction is cheap and
//! the browser session is built lazily on first use.

use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt, pin_mut};

use crate::automation::Connector;
use crate::automation::cdp::CdpConnector;
use crate::discovery::{EndpointResolver, HttpEndpointResolver};
use crate::error::Result;
use crate::prompt::{ContentBlock, ConversationTurn, flatten_conversation};
use crate::session::{SessionManager, SessionState};
use crate::utils::constants::CONTEXT_WINDOW;
use crate::{HandlerConfig, input, observer};

/// One unit of a response. A successful call yields exactly one `Text`
/// followed by one `Usage`; the web application exposes neither partial
/// output nor real token counts, so the text arrives whole and the usage
/// counters are always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseChunk {
    Text { text: String },
    Usage { input_tokens: u32, output_tokens: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub context_window: u32,
    pub max_output_tokens: u32,
    pub supports_images: bool,
    pub supports_prompt_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub id: String,
    pub info: ModelInfo,
}

/// Adapter facade over a browser-hosted chat application.
pub struct ChatHandler {
    config: HandlerConfig,
    session: SessionManager,
}

impl ChatHandler {
    /// Handler wired to the real browser automation surface.
    pub fn new(config: HandlerConfig) -> Self {
        Self::with_automation(
            config,
            Arc::new(HttpEndpointResolver::new()),
            Arc::new(CdpConnector::default()),
        )
    }

    /// Handler with an injected discovery and automation surface.
    pub fn with_automation(
        config: HandlerConfig,
        resolver: Arc<dyn EndpointResolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let session = SessionManager::new(config.clone(), resolver, connector);
        Self { config, session }
    }

    /// Produce a response for a conversation.
    ///
    /// Single-pass producer, not a true incremental stream: the whole
    /// exchange runs when the stream is first polled, then the two chunks
    /// are yielded. Any failure aborts before the first yield.
    pub fn create_message<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        turns: &'a [ConversationTurn],
    ) -> impl Stream<Item = Result<ResponseChunk>> + 'a {
        try_stream! {
            let text = self.run_exchange(system_prompt, turns).await?;
            yield ResponseChunk::Text { text };
            yield ResponseChunk::Usage {
                input_tokens: 0,
                output_tokens: 0,
            };
        }
    }

    /// Produce a response for a single prompt, concatenating all text chunks.
    pub async fn complete_prompt(&self, text: &str) -> Result<String> {
        let turns = [ConversationTurn::user(text)];
        let stream = self.create_message(None, &turns);
        pin_mut!(stream);

        let mut out = String::new();
        while let Some(chunk) = stream.next().await {
            if let ResponseChunk::Text { text } = chunk? {
                out.push_str(&text);
            }
        }
        Ok(out)
    }

    /// Static model metadata. No network interaction.
    pub fn model(&self) -> ModelDescriptor {
        ModelDescriptor {
            id: self.config.model_name.clone(),
            info: ModelInfo {
                context_window: CONTEXT_WINDOW,
                max_output_tokens: self.config.max_output_tokens,
                supports_images: false,
                supports_prompt_cache: false,
            },
        }
    }

    /// Lifecycle state of the underlying session, for diagnostics.
    pub async fn session_state(&self) -> SessionState {
        self.session.state().await
    }

    /// Release the browser session. Waits for any in-flight initialization
    /// first; safe to call multiple times.
    pub async fn dispose(&self) {
        self.session.dispose().await;
    }

    async fn run_exchange(
        &self,
        system_prompt: Option<&str>,
        turns: &[ConversationTurn],
    ) -> Result<String> {
        let page = self.session.ensure_ready().await?;
        let prompt = flatten_conversation(system_prompt, turns);
        let timeout = self.config.timeout();

        // Interaction failures may mean the page died under us; audit
        // liveness so the next call reinitializes instead of retrying a dead
        // session, while a plain timeout leaves the session alone.
        let baseline = match observer::count_responses(page.as_ref()).await {
            Ok(n0) => n0,
            Err(e) => {
                self.session.reset_if_dead().await;
                return Err(e);
            }
        };

        if let Err(e) = input::submit_prompt(page.as_ref(), &prompt, timeout).await {
            self.session.reset_if_dead().await;
            return Err(e);
        }

        match observer::await_response(page.as_ref(), baseline, timeout).await {
            Ok(text) => Ok(text),
            Err(e) => {
                self.session.reset_if_dead().await;
                Err(e)
            }
        }
    }
}

/// Estimate the token count of `blocks`.
///
/// A rough character-based approximation (one token per four characters,
/// rounded up) over text-bearing blocks only; the web application offers no
/// real tokenizer and this never performs a network round-trip.
pub fn count_tokens(blocks: &[ContentBlock]) -> u32 {
    let chars: usize = blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .map(str::len)
        .sum();
    chars.div_ceil(4) as u32
}
