use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::TransferError;

/// Computes SHA-256 of `data` and returns the lowercase hex digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file, streaming it in 64 KiB reads.
///
/// The digest format matches the server's `checksum_sha256` field.
pub fn checksum_file(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
