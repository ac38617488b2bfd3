//! Sync-first notification hub bridge
//!
//! Host requests and OS callbacks are turned into [`BridgeEvent`]s and handed
//! to a background worker. No method on [`NotificationHubBridge`] blocks.

use std::sync::Arc;
use std::thread::JoinHandle;

use hub_transport::{
    CallbackTransport, CallerId, ErrorKind, NotificationPayload, OutboundMessage, Outcome,
    RequestKind,
};
use tokio::sync::{mpsc, watch};

use crate::backend::HubBackend;
use crate::config::{BridgeConfig, ConnectionConfig};
use crate::controller::RegistrationController;
use crate::error::{BridgeError, Result};
use crate::event::BridgeEvent;
use crate::os::{DeviceToken, OsError, PushRegistrar};
use crate::worker::{spawn_bridge_worker, BridgeStatus, BridgeWorker};

/// What happened to a request carrying hub credentials at submission time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Accepted by the event loop; the result arrives through the transport
    Queued,
    /// Rejected up front; the `InvalidConfig` error was already delivered
    Rejected,
}

/// Cloneable handle for OS callbacks
///
/// Hand this to whatever context the OS calls back on. Each method only
/// enqueues an event.
#[derive(Debug, Clone)]
pub struct OsEventSink {
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl OsEventSink {
    /// The OS issued a device token
    pub fn device_token_received(&self, device_token: DeviceToken) -> Result<()> {
        self.send(BridgeEvent::DeviceTokenReceived(device_token))
    }

    /// The OS failed to register for remote notifications
    pub fn registration_failed(&self, error: OsError) -> Result<()> {
        self.send(BridgeEvent::RegistrationFailed(error))
    }

    /// The OS delivered a push payload
    pub fn notification_received(&self, payload: NotificationPayload) -> Result<()> {
        self.send(BridgeEvent::NotificationReceived(payload))
    }

    fn send(&self, event: BridgeEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| BridgeError::WorkerDisconnected)
    }
}

/// Bridge between a host, the OS push subsystem and a notification hub
///
/// # Example
///
/// ```rust,ignore
/// use hub_bridge::prelude::*;
///
/// let (transport, outbound) = ChannelTransport::new();
/// let bridge = NotificationHubBridge::new(
///     BridgeConfig::default(),
///     Arc::new(my_registrar),
///     Arc::new(my_backend),
///     Arc::new(transport),
/// )?;
///
/// bridge.register_application(
///     CallerId::generate(),
///     "my-hub",
///     "Endpoint=sb://my-ns.servicebus.windows.net/;SharedAccessKey=...",
/// )?;
///
/// // Later, from the OS callback context
/// bridge.os_events().device_token_received(token)?;
///
/// while let Some(message) = outbound.recv() {
///     println!("{}", message.to_host_json());
/// }
/// ```
pub struct NotificationHubBridge {
    /// Send events to background worker
    events: mpsc::UnboundedSender<BridgeEvent>,

    /// Latest snapshot published by the worker
    status: watch::Receiver<BridgeStatus>,

    /// Used for synchronous rejections only
    transport: Arc<dyn CallbackTransport>,

    /// Background worker handle (kept alive)
    _worker: JoinHandle<()>,
}

impl NotificationHubBridge {
    /// Create a bridge and start its worker thread
    pub fn new(
        config: BridgeConfig,
        registrar: Arc<dyn PushRegistrar>,
        backend: Arc<dyn HubBackend>,
        transport: Arc<dyn CallbackTransport>,
    ) -> Result<Self> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                tracing::error!("Failed to create tokio runtime for bridge worker: {}", e);
                BridgeError::Runtime(e)
            })?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(BridgeStatus::default());

        let worker = BridgeWorker::new(
            RegistrationController::new(&config),
            registrar,
            backend,
            Arc::clone(&transport),
            events_tx.clone(),
            status_tx,
        );
        let handle = spawn_bridge_worker(runtime, worker, events_rx)?;

        tracing::info!(
            "Notification hub bridge started (policy: {:?}, pending timeout: {:?})",
            config.concurrency_policy,
            config.pending_timeout
        );

        Ok(Self {
            events: events_tx,
            status: status_rx,
            transport,
            _worker: handle,
        })
    }

    /// Register this installation with a notification hub
    ///
    /// Empty `hub_path` or `connection_string` is answered with an
    /// `InvalidConfig` error before this returns and before the OS is asked
    /// for anything.
    pub fn register_application(
        &self,
        caller_id: CallerId,
        hub_path: &str,
        connection_string: &str,
    ) -> Result<Submission> {
        let Some(connection) = self.validated(
            &caller_id,
            RequestKind::RegisterApplication,
            hub_path,
            connection_string,
        ) else {
            return Ok(Submission::Rejected);
        };

        self.send(BridgeEvent::RegisterApplication {
            caller_id,
            connection,
        })?;
        Ok(Submission::Queued)
    }

    /// Remove the last successful registration from its hub
    ///
    /// With nothing registered in this process the caller gets a
    /// `NotRegistered` error.
    pub fn unregister_application(&self, caller_id: CallerId) -> Result<()> {
        self.send(BridgeEvent::UnregisterApplication {
            caller_id,
            connection: None,
        })
    }

    /// Remove this installation's registration from the given hub
    ///
    /// Needs no prior registration in this process, so it also works after
    /// an app restart. Credentials are checked the same way as in
    /// [`register_application`](Self::register_application).
    pub fn unregister_application_from(
        &self,
        caller_id: CallerId,
        hub_path: &str,
        connection_string: &str,
    ) -> Result<Submission> {
        let Some(connection) = self.validated(
            &caller_id,
            RequestKind::UnregisterApplication,
            hub_path,
            connection_string,
        ) else {
            return Ok(Submission::Rejected);
        };

        self.send(BridgeEvent::UnregisterApplication {
            caller_id,
            connection: Some(connection),
        })?;
        Ok(Submission::Queued)
    }

    /// The OS issued a device token
    pub fn device_token_received(&self, device_token: DeviceToken) -> Result<()> {
        self.send(BridgeEvent::DeviceTokenReceived(device_token))
    }

    /// The OS failed to register for remote notifications
    pub fn registration_failed(&self, error: OsError) -> Result<()> {
        self.send(BridgeEvent::RegistrationFailed(error))
    }

    /// The OS delivered a push payload
    pub fn notification_received(&self, payload: NotificationPayload) -> Result<()> {
        self.send(BridgeEvent::NotificationReceived(payload))
    }

    /// Handle for OS callbacks that outlives borrows of the bridge
    pub fn os_events(&self) -> OsEventSink {
        OsEventSink {
            events: self.events.clone(),
        }
    }

    /// Latest status snapshot
    pub fn status(&self) -> BridgeStatus {
        self.status.borrow().clone()
    }

    /// Shutdown the background worker
    ///
    /// Called automatically on drop. Requests still pending get no result.
    pub fn shutdown(&self) {
        let _ = self.events.send(BridgeEvent::Shutdown);
    }

    /// Build the connection, or deliver `InvalidConfig` to `caller_id` and
    /// return `None`
    fn validated(
        &self,
        caller_id: &CallerId,
        request: RequestKind,
        hub_path: &str,
        connection_string: &str,
    ) -> Option<ConnectionConfig> {
        let message = match ConnectionConfig::new(hub_path, connection_string) {
            Ok(connection) => return Some(connection),
            Err(BridgeError::InvalidConfig(message)) => message,
            Err(other) => other.to_string(),
        };
        tracing::debug!(
            "Rejecting {} for {}: {}",
            request.event_name(),
            caller_id,
            message
        );

        let rejection = OutboundMessage::result(
            caller_id.clone(),
            request,
            Outcome::error(ErrorKind::InvalidConfig, message),
        );
        if let Err(e) = self.transport.deliver(rejection) {
            tracing::warn!("Failed to deliver rejection to host: {}", e);
        }
        None
    }

    fn send(&self, event: BridgeEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| BridgeError::WorkerDisconnected)
    }
}

impl Drop for NotificationHubBridge {
    fn drop(&mut self) {
        tracing::debug!(
            "NotificationHubBridge dropping, registration state: {:?}",
            self.status.borrow().registration
        );
        let _ = self.events.send(BridgeEvent::Shutdown);
    }
}
