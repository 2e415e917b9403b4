//! Upload error types.

use mediavault_transfer::{PreflightError, TransferError};
use mediavault_transport::TransportError;

/// Errors produced by an upload, finalize or delete.
///
/// Cancellation is not an error: it is reported as
/// [`UploadOutcome::Cancelled`](crate::UploadOutcome::Cancelled).
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("preflight failed: {0}")]
    Preflight(#[from] PreflightError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("unexpected HTTP {status}: {message}")]
    Protocol { status: u16, message: String },

    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("content already stored{}", .existing_id.as_ref().map(|id| format!(" as record {id}")).unwrap_or_default())]
    DuplicateContent {
        existing_id: Option<String>,
        checksum: Option<String>,
    },

    #[error("payload too large for the server")]
    PayloadTooLarge,

    #[error("bad request (HTTP {status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("delete token rejected")]
    InvalidDeleteToken,

    #[error("record {0} has no delete token")]
    NotDeletable(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("task error: {0}")]
    Task(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(TransportError::Http(e))
    }
}

impl From<tokio::task::JoinError> for UploadError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(format!("task join error: {e}"))
    }
}
