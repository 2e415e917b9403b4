use serde::{Deserialize, Serialize};

/// How server certificates are checked.
///
/// `AcceptAll` exists for self-hosted servers with self-signed
/// certificates and is only ever enabled by explicit user opt-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    /// Platform root store verification.
    #[default]
    Verify,
    /// Accept any certificate, including self-signed and mismatched hosts.
    AcceptAll,
}

impl TrustPolicy {
    /// Maps the user's "trust all certificates" setting to a policy.
    pub fn from_opt_in(trust_all: bool) -> Self {
        if trust_all {
            Self::AcceptAll
        } else {
            Self::Verify
        }
    }

    pub fn accepts_invalid_certs(self) -> bool {
        self == Self::AcceptAll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_verifies() {
        assert_eq!(TrustPolicy::default(), TrustPolicy::Verify);
        assert!(!TrustPolicy::default().accepts_invalid_certs());
    }

    #[test]
    fn opt_in_maps_to_accept_all() {
        assert_eq!(TrustPolicy::from_opt_in(true), TrustPolicy::AcceptAll);
        assert_eq!(TrustPolicy::from_opt_in(false), TrustPolicy::Verify);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&TrustPolicy::AcceptAll).unwrap();
        assert_eq!(json, "\"accept_all\"");
        let back: TrustPolicy = serde_json::from_str("\"verify\"").unwrap();
        assert_eq!(back, TrustPolicy::Verify);
    }
}
