//! Routing of unsolicited push payloads to the host.
//!
//! Payloads are not tied to any request, so the router never consults the
//! registration slot: every payload goes to the host, whether or not a
//! registration is pending or has ever happened.

use std::sync::Arc;

use hub_transport::{CallbackTransport, NotificationPayload, OutboundMessage};

/// Forwards OS push payloads to the host transport.
pub struct NotificationRouter {
    transport: Arc<dyn CallbackTransport>,
    forwarded: u64,
}

impl NotificationRouter {
    pub fn new(transport: Arc<dyn CallbackTransport>) -> Self {
        Self {
            transport,
            forwarded: 0,
        }
    }

    /// Forward a payload unmodified.
    ///
    /// Returns `true` if the host transport accepted it. A payload the host
    /// cannot take is logged and dropped.
    pub fn on_notification_received(&mut self, payload: NotificationPayload) -> bool {
        let fields = payload.len();
        match self
            .transport
            .deliver(OutboundMessage::NotificationReceived(payload))
        {
            Ok(()) => {
                self.forwarded += 1;
                tracing::debug!("Forwarded notification with {} fields to host", fields);
                true
            }
            Err(e) => {
                tracing::warn!("Dropping notification, host transport failed: {}", e);
                false
            }
        }
    }

    /// Number of payloads handed to the host so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}
