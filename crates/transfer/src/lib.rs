//! Byte sources for streaming uploads.
//!
//! Everything here is pull-based: callers ask a [`ByteSource`] for the next
//! bytes and never hold more than one buffer of the file in memory.

mod checksum;
mod multipart;
mod progress;
mod source;
mod stream;
mod validation;

pub use checksum::{checksum_bytes, checksum_file};
pub use multipart::{FilePart, MultipartBodyStream, Phase, generate_boundary};
pub use progress::SpeedCalculator;
pub use source::{ByteSource, BytesSource, ChunkSource, SeekableSource, read_chunk};
pub use stream::{BodyProgress, into_body_stream};
pub use validation::{PreflightError, preflight};

/// Buffer size used when pulling a source into a streamed request body.
pub const STREAM_BUFFER_SIZE: usize = 256 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a regular file: {0}")]
    NotAFile(String),
}
