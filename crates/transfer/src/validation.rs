use mediavault_protocol::{MetadataError, UploadMetadata};

/// Reasons an upload is refused before any I/O.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("file is {size} bytes, above the {limit}-byte upload limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("invalid metadata: {0}")]
    Metadata(#[from] MetadataError),
}

/// Checks metadata and size against the configured limit.
///
/// Pure and synchronous: callers run it before touching the network.
pub fn preflight(
    metadata: &UploadMetadata,
    source_size: u64,
    max_size: u64,
) -> Result<(), PreflightError> {
    metadata.validate()?;
    if source_size > max_size {
        return Err(PreflightError::TooLarge {
            size: source_size,
            limit: max_size,
        });
    }
    Ok(())
}
