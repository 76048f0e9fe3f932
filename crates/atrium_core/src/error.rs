use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AtriumError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid lifecycle transition: {0}")]
    InvalidTransition(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classification of errors for logging and user display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Rejected user action (empty message, duplicate name, last-room delete).
    UserError,
    /// The backend answered with a failure.
    BackendError,
    /// Network connectivity or streaming issue.
    NetworkError,
    /// Internal system error.
    SystemError,
    /// Invalid or missing configuration.
    ConfigError,
}

impl AtriumError {
    /// Returns the broad error category for routing and display purposes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::UserError,
            Self::NotFound(_) => ErrorCategory::UserError,
            Self::InvalidTransition(_) => ErrorCategory::SystemError,
            Self::Backend(_) => ErrorCategory::BackendError,
            Self::Connection(_) => ErrorCategory::NetworkError,
            Self::Config(_) => ErrorCategory::ConfigError,
            Self::Internal(_) => ErrorCategory::SystemError,
        }
    }

    /// Returns a user-friendly message (hides internal details).
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(msg) => format!("Not found: {msg}"),
            Self::InvalidTransition(_) => "That action is not available right now.".into(),
            Self::Backend(msg) => format!("Server error: {msg}"),
            Self::Connection(_) => "Connection error. Check your network.".into(),
            Self::Config(msg) => format!("Configuration issue: {msg}"),
            Self::Internal(_) => "An unexpected error occurred.".into(),
        }
    }
}

/// Classify an `anyhow::Error` into a category by inspecting the message for
/// known patterns. Used where errors cross the operation boundary untyped
/// (status polls, stream teardown) and only routing is needed.
pub fn classify_error(error: &anyhow::Error) -> ErrorCategory {
    if let Some(err) = error.downcast_ref::<AtriumError>() {
        return err.category();
    }

    let msg = error.to_string().to_lowercase();
    if msg.contains("timeout") || msg.contains("connection") || msg.contains("dns") {
        ErrorCategory::NetworkError
    } else if msg.contains("config") {
        ErrorCategory::ConfigError
    } else if msg.contains("not found") || msg.contains("no such") {
        ErrorCategory::UserError
    } else if msg.contains("http 4") || msg.contains("http 5") {
        ErrorCategory::BackendError
    } else {
        ErrorCategory::SystemError
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
