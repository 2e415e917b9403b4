//! Authenticated streaming relay for media playback.
//!
//! A media player is handed a synthetic URL (custom scheme wrapping the
//! real host, path and query). Each byte-range request the player makes
//! for it is rewritten to the real origin, sent with injected credentials
//! and a `Range` header over a transport carrying the caller's trust
//! policy, and streamed back into the player's pending request as body
//! chunks arrive.

pub mod content;
pub mod error;
pub mod loader;
pub mod range;
pub mod registry;
pub mod sink;
pub mod url;

// Re-export primary types for convenience.
pub use content::{ContentInfo, content_type_for};
pub use error::ProxyError;
pub use loader::StreamingProxyLoader;
pub use range::{ContentRange, parse_content_range, range_header};
pub use registry::{ProxyRequestState, RequestId};
pub use sink::{LoadingRequest, LoadingRequestSink};
pub use url::SchemeMapping;
