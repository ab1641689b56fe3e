//! Error types for the assistant core
//!
//! Most failures never reach the UI: backend and parse problems are folded
//! into message intents at the call boundary. The variants here are what is
//! left for callers to see, plus the internal classifications used to pick
//! the right fallback reply.

use thiserror::Error;

/// Coarse classification of [`AssistantError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    AuthExpired,
    BackendUnavailable,
    MalformedResponse,
    CodeMismatch,
    CodeExpired,
    AttemptsExhausted,
    RecordingFailure,
    TurnInFlight,
    Cancelled,
    InvalidTransition,
    NoCardAvailable,
    Ledger,
    Config,
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session expired, sign in again")]
    AuthExpired,

    #[error("Backend unavailable (status {status})")]
    BackendUnavailable { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Incorrect confirmation code (attempts left: {remaining_attempts})")]
    CodeMismatch { remaining_attempts: u32 },

    #[error("Confirmation code expired")]
    CodeExpired,

    #[error("Too many incorrect confirmation codes")]
    AttemptsExhausted,

    #[error("Recording failed: {0}")]
    RecordingFailure(String),

    #[error("A request for this conversation is already in flight")]
    TurnInFlight,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Cannot {action} while payment is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("No card available for payment")]
    NoCardAvailable,

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AssistantError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssistantError::InvalidInput(_) => ErrorKind::InvalidInput,
            AssistantError::AuthExpired => ErrorKind::AuthExpired,
            AssistantError::BackendUnavailable { .. } | AssistantError::Network(_) => {
                ErrorKind::BackendUnavailable
            }
            AssistantError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            AssistantError::CodeMismatch { .. } => ErrorKind::CodeMismatch,
            AssistantError::CodeExpired => ErrorKind::CodeExpired,
            AssistantError::AttemptsExhausted => ErrorKind::AttemptsExhausted,
            AssistantError::RecordingFailure(_) => ErrorKind::RecordingFailure,
            AssistantError::TurnInFlight => ErrorKind::TurnInFlight,
            AssistantError::Cancelled => ErrorKind::Cancelled,
            AssistantError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            AssistantError::NoCardAvailable => ErrorKind::NoCardAvailable,
            AssistantError::Ledger(_) => ErrorKind::Ledger,
            AssistantError::Config(_) => ErrorKind::Config,
        }
    }

    /// Only transport-level failures are worth retrying. A 5xx is treated as
    /// transient; a 4xx or anything schema-related is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AssistantError::Network(_) => true,
            AssistantError::BackendUnavailable { status } => *status >= 500,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for AssistantError {
    fn from(err: rusqlite::Error) -> Self {
        AssistantError::Ledger(err.to_string())
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 => AssistantError::AuthExpired,
            Some(status) => AssistantError::BackendUnavailable {
                status: status.as_u16(),
            },
            None => AssistantError::Network(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
