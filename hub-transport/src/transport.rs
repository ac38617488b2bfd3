//! Delivery of outbound messages to the host.
//!
//! This module provides the [`CallbackTransport`] trait the bridge writes to,
//! and [`ChannelTransport`], which hands every message to a channel the host
//! drains at its own pace.

use std::sync::{mpsc, Arc};

use crate::message::OutboundMessage;
use crate::receiver::OutboundReceiver;

/// Errors that can occur while handing a message to the host.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host side of the transport has gone away
    #[error("Host transport disconnected")]
    Disconnected,
}

/// Boundary between the bridge and the host application.
///
/// Implementations must not block: the bridge calls `deliver` from its event
/// loop and from host-facing entry points.
pub trait CallbackTransport: Send + Sync {
    fn deliver(&self, message: OutboundMessage) -> Result<(), TransportError>;
}

impl<T: CallbackTransport + ?Sized> CallbackTransport for Arc<T> {
    fn deliver(&self, message: OutboundMessage) -> Result<(), TransportError> {
        (**self).deliver(message)
    }
}

/// Transport that forwards messages into an unbounded channel.
///
/// # Example
///
/// ```
/// use hub_transport::{CallerId, ChannelTransport, CallbackTransport, OutboundMessage, Outcome, RequestKind};
///
/// let (transport, receiver) = ChannelTransport::new();
/// transport
///     .deliver(OutboundMessage::result(
///         CallerId::new("cb-1"),
///         RequestKind::RegisterApplication,
///         Outcome::Busy,
///     ))
///     .unwrap();
///
/// let message = receiver.try_recv().unwrap();
/// assert_eq!(message.caller_id(), Some(&CallerId::new("cb-1")));
/// ```
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<OutboundMessage>,
}

impl ChannelTransport {
    /// Create a transport and the receiver the host reads from.
    pub fn new() -> (Self, OutboundReceiver) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, OutboundReceiver::new(receiver))
    }
}

impl CallbackTransport for ChannelTransport {
    fn deliver(&self, message: OutboundMessage) -> Result<(), TransportError> {
        tracing::trace!(
            caller = ?message.caller_id(),
            keep_callback = message.keep_callback(),
            "Delivering message to host"
        );
        self.sender
            .send(message)
            .map_err(|_| TransportError::Disconnected)
    }
}
