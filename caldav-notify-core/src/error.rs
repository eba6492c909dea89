//! Error types for caldav-notify.

use thiserror::Error;

/// Errors that can occur while fetching, normalizing or scheduling events.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid {field} timestamp: '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("Unauthorized. Please check your credentials in the fetch script.")]
    Unauthorized(String),

    #[error("Failed to run {command} (exit status {status}):\n{stderr}")]
    SourceFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Fetch command '{0}' not found in PATH")]
    SourceNotFound(String),

    #[error("Failed to spawn {command}: {reason}")]
    SourceSpawn { command: String, reason: String },

    #[error("Fetch command timed out after {0}s")]
    SourceTimeout(u64),

    #[error("Failed to decode events: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NotifyError {
    /// Whether the poll loop should stop the daemon on this error.
    ///
    /// Invocation and configuration failures are fatal. Everything that can
    /// plausibly succeed on the next cycle is not.
    pub fn is_fatal(&self) -> bool {
        match self {
            NotifyError::Config(_)
            | NotifyError::Unauthorized(_)
            | NotifyError::SourceFailed { .. }
            | NotifyError::SourceNotFound(_)
            | NotifyError::SourceSpawn { .. } => true,
            NotifyError::InvalidTimestamp { .. }
            | NotifyError::SourceTimeout(_)
            | NotifyError::Decode(_)
            | NotifyError::Io(_) => false,
        }
    }
}

/// Result type alias for caldav-notify operations.
pub type NotifyResult<T> = Result<T, NotifyError>;
