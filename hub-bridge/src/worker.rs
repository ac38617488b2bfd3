//! Background worker thread for event processing
//!
//! Spawns a thread with its own tokio runtime that owns the registration
//! controller and the notification router. Host calls and OS callbacks only
//! send [`BridgeEvent`]s; this loop is the one place that reads and writes the
//! registration slot.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use hub_transport::{CallbackTransport, CallerId};
use tokio::sync::{mpsc, watch};

use crate::backend::HubBackend;
use crate::controller::{Effect, RegistrationController, RegistrationState};
use crate::error::{BridgeError, Result};
use crate::event::BridgeEvent;
use crate::os::PushRegistrar;
use crate::router::NotificationRouter;

/// Snapshot of the bridge, published after every processed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeStatus {
    pub registration: RegistrationState,
    pub pending_unregistration: Option<CallerId>,
    /// Hub path of the last successful registration
    pub registered_hub_path: Option<String>,
    pub notifications_forwarded: u64,
    /// OS or hub callbacks that arrived with nothing to resolve
    pub unmatched_callbacks: u64,
    pub running: bool,
}

impl Default for BridgeStatus {
    fn default() -> Self {
        Self {
            registration: RegistrationState::Idle,
            pending_unregistration: None,
            registered_hub_path: None,
            notifications_forwarded: 0,
            unmatched_callbacks: 0,
            running: true,
        }
    }
}

/// State owned by the event loop
pub(crate) struct BridgeWorker {
    controller: RegistrationController,
    router: NotificationRouter,
    registrar: Arc<dyn PushRegistrar>,
    backend: Arc<dyn HubBackend>,
    transport: Arc<dyn CallbackTransport>,
    /// Loopback for backend completions
    events: mpsc::UnboundedSender<BridgeEvent>,
    status: watch::Sender<BridgeStatus>,
}

impl BridgeWorker {
    pub(crate) fn new(
        controller: RegistrationController,
        registrar: Arc<dyn PushRegistrar>,
        backend: Arc<dyn HubBackend>,
        transport: Arc<dyn CallbackTransport>,
        events: mpsc::UnboundedSender<BridgeEvent>,
        status: watch::Sender<BridgeStatus>,
    ) -> Self {
        Self {
            controller,
            router: NotificationRouter::new(Arc::clone(&transport)),
            registrar,
            backend,
            transport,
            events,
            status,
        }
    }

    /// Main event loop running inside the tokio runtime
    pub(crate) async fn run(mut self, mut events: mpsc::UnboundedReceiver<BridgeEvent>) {
        tracing::info!("Bridge worker started");

        loop {
            let deadline = self.controller.next_deadline();

            let flow = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.process_event(event),
                    None => {
                        tracing::info!("Event channel closed, shutting down worker");
                        ControlFlow::Break(())
                    }
                },
                _ = wait_for_deadline(deadline) => {
                    let effects = self.controller.expire(Instant::now());
                    self.apply(effects);
                    ControlFlow::Continue(())
                }
            };

            if flow.is_break() {
                break;
            }
            self.publish_status(true);
        }

        events.close();
        self.publish_status(false);
        tracing::info!("Bridge worker shut down");
    }

    /// Feed one event through the controller or router and carry out the result.
    pub(crate) fn process_event(&mut self, event: BridgeEvent) -> ControlFlow<()> {
        tracing::debug!("Worker: processing {}", event.name());
        let now = Instant::now();

        // Anything past its deadline is failed before the event can match it.
        let expired = self.controller.expire(now);
        self.apply(expired);

        let effects = match event {
            BridgeEvent::RegisterApplication {
                caller_id,
                connection,
            } => self
                .controller
                .register_application(caller_id, connection, now),
            BridgeEvent::UnregisterApplication {
                caller_id,
                connection,
            } => self
                .controller
                .unregister_application(caller_id, connection, now),
            BridgeEvent::DeviceTokenReceived(device_token) => {
                self.controller.on_registration_succeeded(device_token)
            }
            BridgeEvent::RegistrationFailed(error) => self.controller.on_registration_failed(error),
            BridgeEvent::NotificationReceived(payload) => {
                self.router.on_notification_received(payload);
                Vec::new()
            }
            BridgeEvent::RegistrationCompleted { attempt, result } => {
                self.controller.on_registration_completed(attempt, result)
            }
            BridgeEvent::UnregistrationCompleted { attempt, result } => {
                self.controller.on_unregistration_completed(attempt, result)
            }
            BridgeEvent::Shutdown => {
                tracing::info!("Worker received shutdown command");
                return ControlFlow::Break(());
            }
        };

        self.apply(effects);
        ControlFlow::Continue(())
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Deliver(message) => {
                    if let Err(e) = self.transport.deliver(message) {
                        tracing::warn!("Failed to deliver result to host: {}", e);
                    }
                }
                Effect::RequestDeviceToken => {
                    if let Err(e) = self.registrar.request_device_token() {
                        tracing::warn!("OS refused device token request: {}", e);
                        queue.extend(self.controller.on_registration_failed(e));
                    }
                }
                Effect::CompleteRegistration {
                    attempt,
                    device_token,
                    connection,
                } => {
                    let backend = Arc::clone(&self.backend);
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        let result = backend
                            .complete_registration(&device_token, &connection)
                            .await;
                        if events
                            .send(BridgeEvent::RegistrationCompleted { attempt, result })
                            .is_err()
                        {
                            tracing::debug!("Worker gone, dropping hub result for {}", attempt);
                        }
                    });
                }
                Effect::Unregister {
                    attempt,
                    connection,
                } => {
                    let backend = Arc::clone(&self.backend);
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        let result = backend.unregister(&connection).await;
                        if events
                            .send(BridgeEvent::UnregistrationCompleted { attempt, result })
                            .is_err()
                        {
                            tracing::debug!(
                                "Worker gone, dropping hub unregistration for {}",
                                attempt
                            );
                        }
                    });
                }
            }
        }
    }

    fn publish_status(&self, running: bool) {
        self.status.send_replace(BridgeStatus {
            registration: self.controller.state(),
            pending_unregistration: self.controller.pending_unregistration().cloned(),
            registered_hub_path: self.controller.registered_hub_path().map(str::to_string),
            notifications_forwarded: self.router.forwarded(),
            unmatched_callbacks: self.controller.unmatched_callbacks(),
            running,
        });
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Spawns the background worker thread
///
/// The runtime is built by the caller so a failure surfaces as an error
/// instead of a worker that silently never starts.
pub(crate) fn spawn_bridge_worker(
    runtime: tokio::runtime::Runtime,
    worker: BridgeWorker,
    events: mpsc::UnboundedReceiver<BridgeEvent>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("hub-bridge-worker".to_string())
        .spawn(move || {
            runtime.block_on(worker.run(events));
        })
        .map_err(|e| {
            tracing::error!("Failed to spawn bridge worker thread: {}", e);
            BridgeError::Runtime(e)
        })
}
