//! Caller identity for correlating asynchronous results.

use serde::{Deserialize, Serialize};

/// Opaque identifier supplied by the host for one request.
///
/// The host hands a `CallerId` in with every request and expects the single
/// terminal result for that request to come back tagged with the same id.
/// Two ids are the same caller only if their underlying strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    /// Wrap a host-provided identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh identifier for hosts that do not bring their own.
    pub fn generate() -> Self {
        Self(format!("callback-{}", uuid::Uuid::new_v4()))
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CallerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_by_value() {
        assert_eq!(CallerId::new("cb-1"), CallerId::from("cb-1"));
        assert_ne!(CallerId::new("cb-1"), CallerId::new("cb-2"));
    }

    #[test]
    fn test_generate_is_unique() {
        let a = CallerId::generate();
        let b = CallerId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("callback-"));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&CallerId::new("cb-7")).unwrap();
        assert_eq!(json, "\"cb-7\"");
    }
}
