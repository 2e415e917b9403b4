use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::HeaderValue;

use crate::TransportError;

/// Username/password pair for HTTP Basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Builds the `Authorization: Basic <base64(user:pass)>` value.
    ///
    /// The value is marked sensitive so it is redacted from debug output.
    pub fn basic_header(&self) -> Result<HeaderValue, TransportError> {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|_| TransportError::InvalidCredentials)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_header_encodes_user_and_password() {
        let creds = Credentials::new("user", "pass");
        let value = creds.basic_header().unwrap();
        assert_eq!(value.to_str().unwrap(), "Basic dXNlcjpwYXNz");
        assert!(value.is_sensitive());
    }

    #[test]
    fn password_may_contain_colon() {
        let creds = Credentials::new("a", "b:c");
        let value = creds.basic_header().unwrap();
        assert_eq!(value.to_str().unwrap(), format!("Basic {}", STANDARD.encode("a:b:c")));
    }

    #[test]
    fn debug_redacts_password() {
        let out = format!("{:?}", Credentials::new("alice", "s3cret"));
        assert!(out.contains("alice"));
        assert!(!out.contains("s3cret"));
    }
}
