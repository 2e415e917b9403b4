//! Content information reported to the player once per request.

use mediavault_protocol::{DEFAULT_MIME_TYPE, mime_type_for_path};
use mediavault_transport::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap};

use crate::range::parse_content_range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
    /// Length of the whole resource, not of the requested range.
    pub content_length: u64,
    pub byte_range_supported: bool,
    pub content_type: String,
}

impl ContentInfo {
    /// Derives content information from upstream response headers.
    ///
    /// The total comes from the `Content-Range` total when present, else
    /// from `Content-Length`.
    pub fn from_headers(headers: &HeaderMap, path: &str) -> Self {
        let header = |name| headers.get(name).and_then(|v| v.to_str().ok());

        let from_range = header(CONTENT_RANGE)
            .and_then(parse_content_range)
            .and_then(|r| r.total);
        let from_length = header(CONTENT_LENGTH).and_then(|v| v.trim().parse().ok());
        let content_length = from_range.or(from_length).unwrap_or(0);

        let byte_range_supported = header(ACCEPT_RANGES).is_some_and(|v| {
            v.split(',')
                .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"))
        });

        Self {
            content_length,
            byte_range_supported,
            content_type: content_type_for(header(CONTENT_TYPE), path),
        }
    }
}

/// Picks the content type: the response MIME type when it is specific,
/// otherwise a guess from the path extension.
pub fn content_type_for(mime: Option<&str>, path: &str) -> String {
    let essence = mime
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty() && m != DEFAULT_MIME_TYPE);
    match essence {
        Some(m) => m,
        None => mime_type_for_path(path)
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string(),
    }
}
