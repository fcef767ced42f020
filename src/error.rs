//! Error types for the finance helper orchestrator

use thiserror::Error;

use crate::models::ErrorKind;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Outcome of a single backend round trip that did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request was sent but no response came back.
    #[error("No response from server: {0}")]
    Unreachable(String),

    #[error("Server rejected request with status {status}: {body}")]
    ServerRejected { status: u16, body: String },

    /// Success status, but the body was not the expected shape.
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Unreachable(_) => ErrorKind::Unreachable,
            RemoteError::ServerRejected { .. } | RemoteError::InvalidResponse(_) => {
                ErrorKind::ServerRejected
            }
        }
    }

    /// Human-readable message, preferring text the server sent back.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            RemoteError::Unreachable(_) => UNREACHABLE_MESSAGE.to_string(),
            RemoteError::ServerRejected { body, .. } => {
                server_message(body).unwrap_or_else(|| fallback.to_string())
            }
            RemoteError::InvalidResponse(_) => fallback.to_string(),
        }
    }
}

pub const UNREACHABLE_MESSAGE: &str =
    "No response from server. Please check your connection and try again.";

/// Pull an `error` (or `message`) string out of a JSON error body.
fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .filter_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Operation Failures
    // =============================

    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Remote {
        message: String,
        #[source]
        source: RemoteError,
    },

    #[error("Bank linking session failed: {0}")]
    Widget(String),

    // =============================
    // Rejected Calls
    // =============================

    #[error("{0} is already in progress")]
    Busy(&'static str),

    #[error("Bank account is already connected")]
    AlreadyConnected,

    // =============================
    // Setup Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestrationError {
    pub fn remote(source: RemoteError, fallback: &str) -> Self {
        OrchestrationError::Remote {
            message: source.user_message(fallback),
            source,
        }
    }

    /// Tag recorded in a component's error slot, if this failure is one that
    /// gets recorded at all. Rejected calls leave the slot alone.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            OrchestrationError::Validation(_) => Some(ErrorKind::Validation),
            OrchestrationError::Remote { source, .. } => Some(source.kind()),
            OrchestrationError::Widget(_) => Some(ErrorKind::Widget),
            _ => None,
        }
    }
}
