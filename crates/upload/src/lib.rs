//! Upload client for the MediaVault archive.
//!
//! An upload runs in two phases: the raw bytes travel over the resumable
//! upload protocol (or, on the legacy path, a single streamed multipart
//! POST), then a metadata-only finalize call turns them into a stored
//! record carrying a delete token.
//!
//! # Pipeline
//!
//! 1. **Preflight**: metadata and size checks, no network
//! 2. **Create**: declare length and context, receive a location
//! 3. **Patch**: send fixed-size chunks, one in flight at a time
//! 4. **Finalize**: register the upload, persist the returned record

pub mod direct;
pub mod error;
pub mod finalize;
pub mod latch;
pub mod orchestrator;
pub mod records;
pub mod session;
pub mod types;

#[cfg(test)]
mod mock_server;

// Re-export primary types for convenience.
pub use direct::direct_upload;
pub use error::UploadError;
pub use finalize::{delete, finalize, interpret_finalize_response};
pub use latch::CompletionLatch;
pub use orchestrator::UploadOrchestrator;
pub use records::{RecordStore, default_records_path};
pub use session::ResumableUploadSession;
pub use types::{
    OrchestratorConfig, ProgressFn, SessionConfig, SessionOutcome, SessionStatus, UploadOutcome,
    UploadSessionState, UploadStrategy,
};
