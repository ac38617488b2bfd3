//! In-memory notification hub
//!
//! Keeps native registrations per hub path and checks connection strings the
//! way a real hub checks credentials: without a shared access key, nothing is
//! accepted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hub_bridge::{BackendError, ConnectionConfig, DeviceToken, HubBackend, RegistrationInfo};
use tracing::debug;

const SHARED_ACCESS_KEY: &str = "SharedAccessKey=";

/// Hub backend that stores registrations in memory
pub struct InMemoryHub {
    /// Registrations by hub path
    registrations: Mutex<HashMap<String, Vec<RegistrationInfo>>>,
    /// Simulated network round trip
    latency: Duration,
    next_id: AtomicU64,
}

impl InMemoryHub {
    pub fn new(latency: Duration) -> Self {
        Self {
            registrations: Mutex::new(HashMap::new()),
            latency,
            next_id: AtomicU64::new(1),
        }
    }

    /// Registrations currently held for a hub path
    pub fn registrations(&self, hub_path: &str) -> Vec<RegistrationInfo> {
        self.registrations
            .lock()
            .map(|r| r.get(hub_path).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn check_credentials(connection: &ConnectionConfig) -> Result<(), BackendError> {
    if connection.connection_string().contains(SHARED_ACCESS_KEY) {
        Ok(())
    } else {
        Err(BackendError::Rejected(format!(
            "connection string for '{}' carries no shared access key",
            connection.hub_path()
        )))
    }
}

#[async_trait]
impl HubBackend for InMemoryHub {
    async fn complete_registration(
        &self,
        device_token: &DeviceToken,
        connection: &ConnectionConfig,
    ) -> Result<RegistrationInfo, BackendError> {
        self.round_trip().await;
        check_credentials(connection)?;

        let token = device_token.to_hex();
        let mut registrations = self
            .registrations
            .lock()
            .map_err(|_| BackendError::Unavailable("hub state poisoned".to_string()))?;
        let hub = registrations
            .entry(connection.hub_path().to_string())
            .or_default();

        // Native registrations are keyed by token; re-registering refreshes it.
        if let Some(existing) = hub.iter().find(|r| r.channel_uri == token) {
            debug!(
                "Hub {}: refreshed registration {}",
                connection.hub_path(),
                existing.registration_id
            );
            return Ok(existing.clone());
        }

        let info = RegistrationInfo {
            registration_id: format!("sim-reg-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
            channel_uri: token,
            notification_hub_path: connection.hub_path().to_string(),
        };
        debug!(
            "Hub {}: created registration {}",
            connection.hub_path(),
            info.registration_id
        );
        hub.push(info.clone());
        Ok(info)
    }

    async fn unregister(&self, connection: &ConnectionConfig) -> Result<(), BackendError> {
        self.round_trip().await;
        check_credentials(connection)?;

        let mut registrations = self
            .registrations
            .lock()
            .map_err(|_| BackendError::Unavailable("hub state poisoned".to_string()))?;

        match registrations.remove(connection.hub_path()) {
            Some(removed) if !removed.is_empty() => {
                debug!(
                    "Hub {}: removed {} registration(s)",
                    connection.hub_path(),
                    removed.len()
                );
                Ok(())
            }
            _ => Err(BackendError::NotFound(connection.hub_path().to_string())),
        }
    }
}
