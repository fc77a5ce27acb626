//! Error types for the sync engine.
//!
//! Errors are classified by recoverability:
//! - Retryable: transport failures, rate limits, upstream 5xx
//! - NonRetryable: validation/auth rejections from the store, bad config
//!
//! "Record not found" and "out of scope" are not errors — they are normal
//! reconcile outcomes and live on [`crate::engine::ReconcileOutcome`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found at {0}")]
    ConfigNotFound(PathBuf),
}

impl SyncError {
    /// Returns true if a fresh attempt of the same call may succeed.
    ///
    /// Rate limits (429), request timeouts (408) and server-side failures
    /// are retryable; everything else surfaces immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Http(err) => err.is_timeout() || err.is_connect(),
            SyncError::Api { status, .. } => {
                *status == 429 || *status == 408 || *status >= 500
            }
            _ => false,
        }
    }

    /// Shorthand for an upstream rejection with a status code.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        SyncError::Api {
            status,
            message: message.into(),
        }
    }
}
