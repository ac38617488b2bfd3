//! The notification hub backend, seen from the bridge.

use async_trait::async_trait;
use hub_transport::RegistrationInfo;

use crate::config::ConnectionConfig;
use crate::os::DeviceToken;

/// Errors reported by a hub backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The hub refused the token or the credentials
    #[error("Hub rejected request: {0}")]
    Rejected(String),

    /// The hub could not be reached
    #[error("Hub unavailable: {0}")]
    Unavailable(String),

    /// There was no registration to remove
    #[error("No registration found: {0}")]
    NotFound(String),
}

/// Notification hub SDK: performs the network side of registration.
///
/// The bridge never retries; a failure here is reported to the caller as is.
#[async_trait]
pub trait HubBackend: Send + Sync {
    /// Register a device token with the hub
    async fn complete_registration(
        &self,
        device_token: &DeviceToken,
        connection: &ConnectionConfig,
    ) -> Result<RegistrationInfo, BackendError>;

    /// Remove this installation's native registration from the hub
    async fn unregister(&self, connection: &ConnectionConfig) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let error = BackendError::Rejected("401 Unauthorized".to_string());
        assert_eq!(error.to_string(), "Hub rejected request: 401 Unauthorized");

        let error = BackendError::Unavailable("connection reset".to_string());
        assert_eq!(error.to_string(), "Hub unavailable: connection reset");

        let error = BackendError::NotFound("my-hub".to_string());
        assert_eq!(error.to_string(), "No registration found: my-hub");
    }
}
