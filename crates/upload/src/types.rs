//! Data types for the upload flow.

use std::sync::Arc;

use mediavault_protocol::FinalizeRecord;
use mediavault_protocol::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_TUS_PATH};
use serde::{Deserialize, Serialize};

/// Progress callback receiving `(bytes_done, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// How the file bytes reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStrategy {
    /// Create-then-patch resumable protocol, followed by finalize.
    #[default]
    Resumable,
    /// One streamed `multipart/form-data` POST carrying file and metadata.
    DirectMultipart,
}

/// Lifecycle of a resumable session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Created,
    Uploading,
    Completed,
    Cancelled,
    Failed(String),
}

/// Snapshot of a resumable session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSessionState {
    /// Final path segment of `location`, once the server assigned one.
    pub upload_id: Option<String>,
    /// Absolute upload URL; persist it to resume later.
    pub location: Option<String>,
    pub bytes_acked: u64,
    pub total_bytes: u64,
    pub status: SessionStatus,
}

impl UploadSessionState {
    pub(crate) fn new(total_bytes: u64) -> Self {
        Self {
            upload_id: None,
            location: None,
            bytes_acked: 0,
            total_bytes,
            status: SessionStatus::Created,
        }
    }
}

/// Terminal result of the byte-transfer phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { upload_id: String },
    Cancelled,
}

/// Terminal result of a whole upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// New record with its delete token.
    Stored(FinalizeRecord),
    /// Byte-identical content already existed; no delete token was issued.
    Merged(FinalizeRecord),
    /// The caller cancelled before the record was registered.
    Cancelled,
}

impl UploadOutcome {
    /// Classifies a finalize record by its delete token.
    pub fn from_record(record: FinalizeRecord) -> Self {
        if record.is_duplicate() {
            Self::Merged(record)
        } else {
            Self::Stored(record)
        }
    }

    pub fn record(&self) -> Option<&FinalizeRecord> {
        match self {
            Self::Stored(r) | Self::Merged(r) => Some(r),
            Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Resumable session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Creation endpoint, relative to the server root.
    pub tus_path: String,
    pub chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tus_path: DEFAULT_TUS_PATH.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub strategy: UploadStrategy,
    pub session: SessionConfig,
    /// Sources above this size are refused before any request.
    pub max_upload_size: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strategy: UploadStrategy::default(),
            session: SessionConfig::default(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}
