use thiserror::Error;

/// Infrastructure failures raised by adapters, configuration and startup.
#[derive(Error, Debug)]
pub enum QuickpitchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Queue error: {message}")]
    Queue { message: String },

    #[error("Identity provider error: {message}")]
    Identity { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl QuickpitchError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

impl From<tokio::task::JoinError> for QuickpitchError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::internal(format!("blocking task failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, QuickpitchError>;

/// Outcome taxonomy of the submission pipeline operations.
///
/// The HTTP boundary maps each variant to a status code; see `server::status_for`.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("submission not found")]
    NotFound,

    #[error("upload not complete: {missing} object is not in storage yet")]
    Incomplete { missing: &'static str },

    #[error("object storage unavailable")]
    StorageUnavailable(#[source] QuickpitchError),

    #[error("job dispatch failed")]
    DispatchFailed(#[source] QuickpitchError),

    #[error("completion event rejected: {0}")]
    Rejected(String),

    #[error("internal failure")]
    Internal(#[source] QuickpitchError),
}

impl SubmissionError {
    /// Whether retrying the same call later can succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Incomplete { .. } | Self::StorageUnavailable(_) | Self::DispatchFailed(_)
        )
    }
}

/// Opaque rejection of an inbound webhook.
///
/// Carries no detail on purpose: callers must not learn which check failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("webhook rejected")]
pub struct EventRejected;
