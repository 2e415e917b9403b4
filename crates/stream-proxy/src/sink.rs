//! The player side of an intercepted request.

use std::sync::Arc;

use bytes::Bytes;

use crate::content::ContentInfo;
use crate::error::ProxyError;

/// Receives the response for one pending player request.
///
/// The loader guarantees: `set_content_info` at most once and before any
/// data, and exactly one of `finish_loading` / `finish_with_error`, after
/// which nothing else is called. Implementations must not block.
pub trait LoadingRequestSink: Send + Sync {
    fn set_content_info(&self, info: ContentInfo);

    fn respond_with_data(&self, data: Bytes);

    fn finish_loading(&self);

    fn finish_with_error(&self, error: ProxyError);
}

/// A player's request for a byte range of a synthetic URL.
#[derive(Clone)]
pub struct LoadingRequest {
    pub url: String,
    pub offset: u64,
    /// 0 means "to the end of the resource".
    pub length: u64,
    pub sink: Arc<dyn LoadingRequestSink>,
}

impl LoadingRequest {
    pub fn new(url: impl Into<String>, offset: u64, length: u64, sink: Arc<dyn LoadingRequestSink>) -> Self {
        Self {
            url: url.into(),
            offset,
            length,
            sink,
        }
    }
}

impl std::fmt::Debug for LoadingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingRequest")
            .field("url", &self.url)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}
