//! Authenticated HTTP client.
//!
//! Async client using `reqwest`; every request built through
//! [`HttpTransport::request`] carries the Basic `Authorization` header.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, RequestBuilder, Url};
use tracing::{debug, warn};

use crate::{Credentials, TransportError, TrustPolicy};

const USER_AGENT: &str = concat!("mediavault/", env!("CARGO_PKG_VERSION"));

/// Immutable transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Server root, e.g. `https://archive.example.org` or a sub-path.
    pub base_url: String,
    pub trust: TrustPolicy,
    pub credentials: Option<Credentials>,
    /// Connect timeout, also applied to small control requests.
    pub request_timeout: Duration,
    /// Upper bound for any single request including its body.
    pub resource_timeout: Duration,
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            trust: TrustPolicy::default(),
            credentials: None,
            request_timeout: Duration::from_secs(60),
            resource_timeout: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_timeouts(mut self, request: Duration, resource: Duration) -> Self {
        self.request_timeout = request;
        self.resource_timeout = resource;
        self
    }
}

/// HTTP transport bound to one server and one trust policy.
///
/// Cheap to clone: the underlying connection pool is shared.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    auth: Option<HeaderValue>,
    trust: TrustPolicy,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Builds the client. Fails on an unparsable base URL or credentials
    /// that cannot be carried in a header.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme: {}",
                base_url.scheme()
            )));
        }

        let auth = config
            .credentials
            .as_ref()
            .map(Credentials::basic_header)
            .transpose()?;

        if config.trust.accepts_invalid_certs() {
            warn!(host = ?base_url.host_str(), "certificate verification disabled by user setting");
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(config.trust.accepts_invalid_certs())
            .connect_timeout(config.request_timeout)
            .timeout(config.resource_timeout)
            .build()?;

        debug!(base_url = %base_url, trust = ?config.trust, "transport created");

        Ok(Self {
            http,
            base_url,
            auth,
            trust: config.trust,
            request_timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn trust(&self) -> TrustPolicy {
        self.trust
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Host used to key per-server local state, including a non-default port.
    pub fn host_key(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Resolves an absolute API path under the base URL, keeping any
    /// sub-path the server is mounted at.
    pub fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(None);
        Ok(url)
    }

    /// Resolves a `Location` header value, absolute or relative to the base.
    pub fn resolve(&self, location: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(location)
            .map_err(|e| TransportError::InvalidUrl(format!("{location}: {e}")))
    }

    /// Starts a request with the auth header attached.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.auth {
            Some(value) => builder.header(AUTHORIZATION, value.clone()),
            None => builder,
        }
    }

    /// Starts a small control request bounded by the request timeout.
    pub fn control_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.request(method, url).timeout(self.request_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(
            TransportConfig::new(base).with_credentials(Credentials::new("user", "pass")),
        )
        .unwrap()
    }

    #[test]
    fn endpoint_keeps_sub_path() {
        let t = transport("https://example.org/archive/");
        assert_eq!(
            t.endpoint("/api/uploads/finalize").unwrap().as_str(),
            "https://example.org/archive/api/uploads/finalize"
        );

        let t = transport("https://example.org");
        assert_eq!(
            t.endpoint("/api/delete").unwrap().as_str(),
            "https://example.org/api/delete"
        );
    }

    #[test]
    fn resolve_handles_relative_and_absolute_locations() {
        let t = transport("https://example.org:8443/");
        assert_eq!(
            t.resolve("/files/abc").unwrap().as_str(),
            "https://example.org:8443/files/abc"
        );
        assert_eq!(
            t.resolve("https://cdn.example.org/files/xyz").unwrap().as_str(),
            "https://cdn.example.org/files/xyz"
        );
    }

    #[test]
    fn host_key_includes_port() {
        assert_eq!(transport("https://example.org:8443").host_key(), "example.org:8443");
        assert_eq!(transport("https://example.org").host_key(), "example.org");
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            HttpTransport::new(TransportConfig::new("ftp://example.org")),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(HttpTransport::new(TransportConfig::new("not a url")).is_err());
    }

    #[test]
    fn accept_all_policy_builds() {
        let t = HttpTransport::new(
            TransportConfig::new("https://self-signed.local").with_trust(TrustPolicy::AcceptAll),
        )
        .unwrap();
        assert_eq!(t.trust(), TrustPolicy::AcceptAll);
    }

    #[tokio::test]
    async fn requests_carry_basic_auth() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let resp = "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n";
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        let t = transport(&format!("http://127.0.0.1:{port}"));
        let url = t.endpoint("/ping").unwrap();
        let resp = t.control_request(Method::GET, url).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /ping "));
        assert!(request.contains("authorization: basic dxnlcjpwyxnz"));
    }
}
