//! Proxy error types.

use mediavault_transport::TransportError;

/// Failures surfaced to the player as a loading error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unexpected scheme in {0}")]
    UnsupportedScheme(String),

    #[error("range out of bounds: offset {offset}, length {length}")]
    InvalidRange { offset: u64, length: u64 },

    #[error("loader shut down before the request finished")]
    Shutdown,

    #[error("upstream answered HTTP {0}")]
    Upstream(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<TransportError> for ProxyError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::InvalidUrl(u) => Self::InvalidUrl(u),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
