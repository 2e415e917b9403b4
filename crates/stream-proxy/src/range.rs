//! `Range` and `Content-Range` helpers.

use crate::error::ProxyError;

/// Builds a `Range` value. A `length` of 0 means open-ended.
///
/// Fails when the last byte of the range does not fit in a `u64`.
pub fn range_header(offset: u64, length: u64) -> Result<String, ProxyError> {
    if length == 0 {
        return Ok(format!("bytes={offset}-"));
    }
    let last = (length - 1)
        .checked_add(offset)
        .ok_or(ProxyError::InvalidRange { offset, length })?;
    Ok(format!("bytes={offset}-{last}"))
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// `None` for an unsatisfied range (`bytes */<total>`).
    pub range: Option<(u64, u64)>,
    /// `None` when the server sent `*`.
    pub total: Option<u64>,
}

/// Parses a `Content-Range` header value.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;

    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    let range = match span.trim() {
        "*" => None,
        s => {
            let (start, end) = s.split_once('-')?;
            let start: u64 = start.trim().parse().ok()?;
            let end: u64 = end.trim().parse().ok()?;
            if end < start {
                return None;
            }
            Some((start, end))
        }
    };
    if range.is_none() && total.is_none() {
        return None;
    }
    Some(ContentRange { range, total })
}
