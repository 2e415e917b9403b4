//! Wire protocol types for the MediaVault archive API.
//!
//! Covers the resumable upload handshake headers, the finalize and delete
//! JSON bodies, and the shared defaults every client crate starts from.

pub mod constants;
pub mod media;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use chrono::NaiveDate;
pub use media::{DEFAULT_MIME_TYPE, mime_type_for_path};
pub use messages::{
    DeleteRequest, DeleteResponse, DuplicateConflict, ErrorBody, FinalizeRecord, FinalizeRequest,
};
pub use types::{MetadataError, UploadMetadata, decode_upload_metadata, encode_upload_metadata};
