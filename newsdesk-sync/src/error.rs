//! Error types for newsdesk-sync.

use thiserror::Error;

use newsdesk_core::{ConfigError, NewsId};

/// Everything the engine can report.
///
/// Foreground calls (explicit fetch, status change, reset) return these to
/// the caller; background tasks (poll, reconnect) only log them.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Mutation target is not in the current record set.
    #[error("unknown record: {0}")]
    UnknownRecord(NewsId),

    /// Transport-level failure: connect, timeout, reset, non-JSON error status.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The service answered with an explicit `success: false`.
    #[error("server rejected request: {message}")]
    ServerRejected { message: String },

    /// A push event that could not be decoded.
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// A successful HTTP response whose body was not the expected envelope.
    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse {
        endpoint: &'static str,
        reason: String,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{task} task failed: {reason}")]
    TaskFailed { task: &'static str, reason: String },
}

impl SyncError {
    /// Worth retrying on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkFailure(_) | SyncError::InvalidResponse { .. }
        )
    }

    /// Text for the presentation layer's error banner.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::ServerRejected { message } => message.clone(),
            SyncError::UnknownRecord(id) => format!("article {id} is not in the current list"),
            SyncError::NetworkFailure(_) | SyncError::InvalidResponse { .. } => {
                "could not reach the news service; try again".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::NetworkFailure(err.to_string())
    }
}

pub(crate) fn malformed(reason: impl Into<String>) -> SyncError {
    SyncError::MalformedEvent {
        reason: reason.into(),
    }
}
