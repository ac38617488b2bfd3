//! Configuration types for the bridge
//!
//! [`ConnectionConfig`] identifies the hub a registration targets.
//! [`BridgeConfig`] controls how the registration state machine behaves.

use std::time::Duration;

use crate::error::BridgeError;

/// Hub path and connection string for one registration.
///
/// Both fields are opaque to the bridge beyond being non-empty; the hub
/// backend is the one that interprets them.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    hub_path: String,
    connection_string: String,
}

impl ConnectionConfig {
    /// Build a connection, rejecting empty fields.
    pub fn new(
        hub_path: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Result<Self, BridgeError> {
        let hub_path = hub_path.into();
        let connection_string = connection_string.into();

        if hub_path.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "notificationHubPath can't be null or empty".to_string(),
            ));
        }

        if connection_string.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "connectionString can't be null or empty".to_string(),
            ));
        }

        Ok(Self {
            hub_path,
            connection_string,
        })
    }

    pub fn hub_path(&self) -> &str {
        &self.hub_path
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

// The connection string embeds the shared access key.
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("hub_path", &self.hub_path)
            .field("connection_string", &"<redacted>")
            .finish()
    }
}

/// What to do when a request arrives while one of the same kind is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyPolicy {
    /// Tell the new caller `Busy`; the pending request carries on
    #[default]
    RejectBusy,
    /// Tell the pending caller `Superseded`; the new caller takes the slot
    Supersede,
}

/// Configuration for the bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Policy for a second request while one is pending
    /// Default: RejectBusy
    pub concurrency_policy: ConcurrencyPolicy,

    /// How long a pending request may wait for the OS or the hub before it
    /// is failed with a timeout. `None` waits forever.
    /// Default: 60 seconds
    pub pending_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            concurrency_policy: ConcurrencyPolicy::RejectBusy,
            pending_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl BridgeConfig {
    /// Create a new BridgeConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a BridgeConfig where the newest request wins
    pub fn superseding() -> Self {
        Self {
            concurrency_policy: ConcurrencyPolicy::Supersede,
            ..Default::default()
        }
    }

    /// Create a BridgeConfig that never times out a pending request
    pub fn without_timeout() -> Self {
        Self {
            pending_timeout: None,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.pending_timeout == Some(Duration::ZERO) {
            return Err(BridgeError::Configuration(
                "Pending timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_concurrency_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency_policy = policy;
        self
    }

    pub fn with_pending_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pending_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_config_rejects_empty_fields() {
        let err = ConnectionConfig::new("", "Endpoint=sb://x/").unwrap_err();
        assert!(err.to_string().contains("notificationHubPath"));

        let err = ConnectionConfig::new("hub", "   ").unwrap_err();
        assert!(err.to_string().contains("connectionString"));

        let config = ConnectionConfig::new("hub", "Endpoint=sb://x/").unwrap();
        assert_eq!(config.hub_path(), "hub");
        assert_eq!(config.connection_string(), "Endpoint=sb://x/");
    }

    #[test]
    fn test_connection_config_debug_redacts_secret() {
        let config =
            ConnectionConfig::new("hub", "Endpoint=sb://x/;SharedAccessKey=s3cr3t").unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("hub"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.concurrency_policy, ConcurrencyPolicy::RejectBusy);
        assert_eq!(config.pending_timeout, Some(Duration::from_secs(60)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_presets() {
        let superseding = BridgeConfig::superseding();
        assert_eq!(superseding.concurrency_policy, ConcurrencyPolicy::Supersede);
        assert!(superseding.validate().is_ok());

        let no_timeout = BridgeConfig::without_timeout();
        assert!(no_timeout.pending_timeout.is_none());
        assert!(no_timeout.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid = BridgeConfig::new().with_pending_timeout(Some(Duration::ZERO));
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = BridgeConfig::new()
            .with_concurrency_policy(ConcurrencyPolicy::Supersede)
            .with_pending_timeout(Some(Duration::from_secs(5)));

        assert_eq!(config.concurrency_policy, ConcurrencyPolicy::Supersede);
        assert_eq!(config.pending_timeout, Some(Duration::from_secs(5)));
        assert!(config.validate().is_ok());
    }
}
