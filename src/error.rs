//! Error taxonomy for the adapter
//!
//! Every failure names its phase (discovery, initialization, interaction) and
//! keeps the underlying cause attached for diagnostics. Teardown problems are
//! logged warnings, never errors.

use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HandlerError>;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// No reachable debug endpoint on the configured port. Non-sticky: the
    /// next call retries discovery from scratch.
    #[error("no debuggable browser endpoint on port {port}")]
    Discovery {
        port: u16,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Connect, navigate, or the readiness wait failed. Session state is left
    /// `Failed`; the next call starts a fresh attempt.
    #[error("session initialization failed: {context}")]
    Initialization {
        context: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Input surface, send control, new response container, or content panel
    /// not found within the deadline, or the wait loop timed out.
    #[error("page interaction failed: {context}")]
    Interaction {
        context: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// One underlying failure distributed to every caller that joined the
    /// same in-flight initialization attempt.
    #[error(transparent)]
    Shared(Arc<HandlerError>),
}

impl HandlerError {
    pub fn discovery(port: u16) -> Self {
        HandlerError::Discovery { port, source: None }
    }

    pub fn discovery_with(port: u16, source: anyhow::Error) -> Self {
        HandlerError::Discovery {
            port,
            source: Some(source),
        }
    }

    pub fn initialization(context: impl Into<String>) -> Self {
        HandlerError::Initialization {
            context: context.into(),
            source: None,
        }
    }

    pub fn initialization_with(context: impl Into<String>, source: anyhow::Error) -> Self {
        HandlerError::Initialization {
            context: context.into(),
            source: Some(source),
        }
    }

    pub fn interaction(context: impl Into<String>) -> Self {
        HandlerError::Interaction {
            context: context.into(),
            source: None,
        }
    }

    pub fn interaction_with(context: impl Into<String>, source: anyhow::Error) -> Self {
        HandlerError::Interaction {
            context: context.into(),
            source: Some(source),
        }
    }

    /// True for failures raised during endpoint discovery.
    pub fn is_discovery(&self) -> bool {
        match self {
            HandlerError::Discovery { .. } => true,
            HandlerError::Shared(inner) => inner.is_discovery(),
            _ => false,
        }
    }

    /// True for failures raised while connecting, navigating, or waiting for
    /// readiness.
    pub fn is_initialization(&self) -> bool {
        match self {
            HandlerError::Initialization { .. } => true,
            HandlerError::Shared(inner) => inner.is_initialization(),
            _ => false,
        }
    }

    /// True for failures raised while driving an already-initialized page.
    pub fn is_interaction(&self) -> bool {
        match self {
            HandlerError::Interaction { .. } => true,
            HandlerError::Shared(inner) => inner.is_interaction(),
            _ => false,
        }
    }
}
