//! # Notification Hub Bridge
//!
//! Registers an application installation with a push-notification hub on
//! behalf of a host runtime (typically a WebView), and routes incoming push
//! payloads back to that host.
//!
//! ## Overview
//!
//! Registration is a two-step handshake. The OS is asked for a device token;
//! when it answers, the token and the host's hub credentials are handed to a
//! [`HubBackend`] which completes the registration. The outcome goes back to
//! the host caller that started the handshake, through a [`CallbackTransport`].
//!
//! - **One pending request at a time**: a second request either gets `Busy` or
//!   supersedes the first, per [`ConcurrencyPolicy`]
//! - **Exactly one result per request**: success, error, busy, superseded or
//!   timeout
//! - **Stray callbacks are dropped**: an OS or hub answer with nothing waiting
//!   for it is logged and counted, never delivered
//! - **Sync-first facade**: the state machine runs on a background worker thread
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hub_bridge::prelude::*;
//!
//! let (transport, outbound) = ChannelTransport::new();
//! let bridge = NotificationHubBridge::new(
//!     BridgeConfig::default(),
//!     registrar,
//!     backend,
//!     Arc::new(transport),
//! )?;
//!
//! bridge.register_application(CallerId::generate(), "my-hub", connection_string)?;
//!
//! // OS callbacks
//! let os = bridge.os_events();
//! os.device_token_received(token)?;
//!
//! if let Some(message) = outbound.recv() {
//!     println!("{}", message.to_host_json());
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! host ──register/unregister──┐
//! OS ──token/failure/payload──┼──> BridgeEvent channel ──> worker
//! hub backend task ──result───┘                             │
//!                                  RegistrationController ◄─┤
//!                                  NotificationRouter ◄─────┘
//!                                          │
//!                                  CallbackTransport ──> host
//! ```
//!
//! [`RegistrationController`] is a plain state machine with no I/O: it returns
//! [`Effect`]s that the worker carries out. It can be driven directly in tests.

pub mod backend;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod os;
pub mod router;
mod worker;

// Re-export main types for convenience
pub use backend::{BackendError, HubBackend};
pub use bridge::{NotificationHubBridge, OsEventSink, Submission};
pub use config::{BridgeConfig, ConcurrencyPolicy, ConnectionConfig};
pub use controller::{Effect, PendingPhase, RegistrationController, RegistrationState};
pub use error::{BridgeError, Result};
pub use event::{AttemptId, BridgeEvent};
pub use os::{DeviceToken, OsError, PushRegistrar};
pub use router::NotificationRouter;
pub use worker::BridgeStatus;

// Re-export commonly used types from the transport crate
pub use hub_transport::{
    CallbackTransport, CallerId, ChannelTransport, ErrorKind, NotificationPayload,
    OutboundMessage, OutboundReceiver, Outcome, RegistrationInfo, RequestKind, TransportError,
};

/// Prelude module for convenient imports
///
/// ```rust
/// use hub_bridge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BridgeConfig, BridgeError, BridgeStatus, CallbackTransport, CallerId, ChannelTransport,
        ConcurrencyPolicy, DeviceToken, HubBackend, NotificationHubBridge, NotificationPayload,
        OsError, OsEventSink, OutboundMessage, Outcome, PushRegistrar, RegistrationInfo, Result,
        Submission,
    };
    pub use std::sync::Arc;
}
