//! Host callback transport for the notification hub bridge.
//!
//! This crate is the boundary between the bridge and the host application.
//! It knows nothing about push registration; it only models what crosses the
//! boundary and how it gets there.
//!
//! # Overview
//!
//! - [`CallerId`]: opaque identifier the host attaches to each request.
//! - [`OutboundMessage`]: either the single terminal [`Outcome`] of a request,
//!   keyed by its caller, or an unsolicited [`NotificationPayload`].
//! - [`CallbackTransport`]: the trait the bridge delivers through.
//! - [`ChannelTransport`] / [`OutboundReceiver`]: a channel-backed transport
//!   and the receiver the host drains, in order or per caller.
//!
//! # Example
//!
//! ```
//! use hub_transport::{
//!     CallbackTransport, CallerId, ChannelTransport, NotificationPayload, OutboundMessage,
//!     Outcome, RequestKind,
//! };
//! use std::time::Duration;
//!
//! let (transport, receiver) = ChannelTransport::new();
//!
//! let payload: NotificationPayload = [("title".to_string(), serde_json::json!("x"))]
//!     .into_iter()
//!     .collect();
//! transport
//!     .deliver(OutboundMessage::NotificationReceived(payload))
//!     .unwrap();
//! transport
//!     .deliver(OutboundMessage::result(
//!         CallerId::new("cb-1"),
//!         RequestKind::RegisterApplication,
//!         Outcome::Busy,
//!     ))
//!     .unwrap();
//!
//! // The notification is held back, not dropped
//! let result = receiver
//!     .recv_result_for(&CallerId::new("cb-1"), Duration::from_millis(10))
//!     .unwrap();
//! println!("{}", result.to_host_json());
//! assert_eq!(receiver.drain().len(), 1);
//! ```

pub mod caller;
pub mod message;
mod receiver;
pub mod transport;

pub use caller::CallerId;
pub use message::{
    ErrorKind, NotificationPayload, OutboundMessage, Outcome, RegistrationInfo, RequestKind,
};
pub use receiver::OutboundReceiver;
pub use transport::{CallbackTransport, ChannelTransport, TransportError};
