//! Shared HTTP transport for the upload client and the playback proxy.
//!
//! A transport is built once from an immutable [`TransportConfig`]; the
//! certificate trust policy is part of that value and never changes for
//! the lifetime of the client.

mod client;
mod credentials;
mod trust;

pub use client::{HttpTransport, TransportConfig};
pub use credentials::Credentials;
pub use trust::TrustPolicy;

/// Re-exported so dependents build requests without naming `reqwest` directly.
pub use reqwest::{Method, StatusCode, Url, header};

/// Errors from the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("credentials contain characters not allowed in a header")]
    InvalidCredentials,
}

impl TransportError {
    /// Whether the failure was a connect, request or resource timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }
}
