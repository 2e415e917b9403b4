//! Synthetic scheme mapping.
//!
//! `proxy://host[:port]/path?query` ⇄ `https://host[:port]/path?query`.
//! Only the scheme changes; authority, path and query pass through as-is.

use mediavault_transport::Url;

use crate::error::ProxyError;

/// Pair of schemes the player-facing and real URLs use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeMapping {
    pub synthetic: String,
    pub upstream: String,
}

impl Default for SchemeMapping {
    fn default() -> Self {
        Self {
            synthetic: "proxy".to_string(),
            upstream: "https".to_string(),
        }
    }
}

impl SchemeMapping {
    pub fn new(synthetic: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            synthetic: synthetic.into(),
            upstream: upstream.into(),
        }
    }

    /// Wraps a real media URL for the player.
    pub fn to_synthetic(&self, url: &str) -> Result<String, ProxyError> {
        let rest = strip_scheme(url, &self.upstream)
            .ok_or_else(|| ProxyError::UnsupportedScheme(url.to_string()))?;
        Ok(format!("{}://{rest}", self.synthetic))
    }

    /// Recovers the real URL from a synthetic one.
    pub fn to_upstream(&self, url: &str) -> Result<Url, ProxyError> {
        let rest = strip_scheme(url, &self.synthetic)
            .ok_or_else(|| ProxyError::UnsupportedScheme(url.to_string()))?;
        let real = format!("{}://{rest}", self.upstream);
        let parsed = Url::parse(&real).map_err(|e| ProxyError::InvalidUrl(format!("{real}: {e}")))?;
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(ProxyError::InvalidUrl(real));
        }
        Ok(parsed)
    }

    /// Whether `url` uses the synthetic scheme.
    pub fn is_synthetic(&self, url: &str) -> bool {
        strip_scheme(url, &self.synthetic).is_some()
    }
}

/// Returns what follows `scheme://`, matching the scheme case-insensitively.
fn strip_scheme<'a>(url: &'a str, scheme: &str) -> Option<&'a str> {
    let (head, rest) = url.split_once("://")?;
    head.eq_ignore_ascii_case(scheme).then_some(rest)
}
