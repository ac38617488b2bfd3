//! Events consumed by the bridge's event loop.
//!
//! Host requests, OS callbacks and backend completions all arrive as one
//! [`BridgeEvent`] type on one channel, so a single task sees them in order.

use hub_transport::{CallerId, NotificationPayload, RegistrationInfo};

use crate::backend::BackendError;
use crate::config::ConnectionConfig;
use crate::os::{DeviceToken, OsError};

/// Identifies one backend call so a late completion can be told apart
/// from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// Everything the event loop reacts to
#[derive(Debug)]
pub enum BridgeEvent {
    /// Host asked to register (connection already validated)
    RegisterApplication {
        caller_id: CallerId,
        connection: ConnectionConfig,
    },
    /// Host asked to unregister; without a connection the last registered
    /// one is used
    UnregisterApplication {
        caller_id: CallerId,
        connection: Option<ConnectionConfig>,
    },
    /// OS handed out a device token
    DeviceTokenReceived(DeviceToken),
    /// OS failed to register for remote notifications
    RegistrationFailed(OsError),
    /// OS delivered a push payload
    NotificationReceived(NotificationPayload),
    /// Hub backend finished a registration call
    RegistrationCompleted {
        attempt: AttemptId,
        result: Result<RegistrationInfo, BackendError>,
    },
    /// Hub backend finished an unregistration call
    UnregistrationCompleted {
        attempt: AttemptId,
        result: Result<(), BackendError>,
    },
    /// Stop the event loop
    Shutdown,
}

impl BridgeEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::RegisterApplication { .. } => "register_application",
            BridgeEvent::UnregisterApplication { .. } => "unregister_application",
            BridgeEvent::DeviceTokenReceived(_) => "device_token_received",
            BridgeEvent::RegistrationFailed(_) => "registration_failed",
            BridgeEvent::NotificationReceived(_) => "notification_received",
            BridgeEvent::RegistrationCompleted { .. } => "registration_completed",
            BridgeEvent::UnregistrationCompleted { .. } => "unregistration_completed",
            BridgeEvent::Shutdown => "shutdown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_id_display() {
        assert_eq!(AttemptId::new(7).to_string(), "attempt-7");
        assert_eq!(AttemptId::new(7).as_u64(), 7);
    }

    #[test]
    fn test_event_debug() {
        let event = BridgeEvent::UnregisterApplication {
            caller_id: CallerId::new("cb-1"),
            connection: None,
        };
        assert!(format!("{:?}", event).contains("UnregisterApplication"));
        assert_eq!(event.name(), "unregister_application");
    }
}
