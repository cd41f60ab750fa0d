//! Error types for the camsync agent

use thiserror::Error;

/// Main error type for the camsync agent.
///
/// The first four variants are the reconciliation taxonomy; every multi-step
/// operation collapses its failure into exactly one of them (or one of the
/// ambient variants below) and reports it through `Display`.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The request never completed (connect, DNS, timeout, body read)
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The collaborator answered with a non-success status or envelope code
    #[error("Rejected by server ({code}): {message}")]
    RejectedByServer { code: String, message: String },

    /// A confirmation was answered negatively
    #[error("Declined by user: {0}")]
    UserDeclined(String),

    /// Local and cloud state diverged elsewhere and need a decision
    #[error("State mismatch: {0}")]
    PartialStateMismatch(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn rejected(code: impl ToString, message: impl Into<String>) -> Self {
        AgentError::RejectedByServer {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used by the local HTTP API
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::NetworkFailure(_) => "network_failure",
            AgentError::RejectedByServer { .. } => "rejected_by_server",
            AgentError::UserDeclined(_) => "user_declined",
            AgentError::PartialStateMismatch(_) => "partial_state_mismatch",
            AgentError::IoError(_) => "io",
            AgentError::JsonError(_) => "json",
            AgentError::ConfigError(_) => "config",
            AgentError::ValidationError(_) => "validation",
            AgentError::NotFound(_) => "not_found",
            AgentError::InvalidTransition(_) => "invalid_transition",
            AgentError::ServerError(_) => "server",
            AgentError::ShutdownError(_) => "shutdown",
            AgentError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => AgentError::rejected(status.as_u16(), err.to_string()),
            None => AgentError::NetworkFailure(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}
