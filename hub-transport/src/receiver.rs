//! Host-side end of a [`ChannelTransport`](crate::ChannelTransport)
//!
//! The host either takes messages in delivery order or waits for the result
//! addressed to one caller. Messages skipped while waiting are held back and
//! handed out first by the next in-order read, so nothing is lost or reordered.

use std::collections::VecDeque;
use std::sync::{mpsc, Mutex};
use std::time::{Duration, Instant};

use crate::caller::CallerId;
use crate::message::OutboundMessage;

struct Inbox {
    rx: mpsc::Receiver<OutboundMessage>,
    /// Delivered but skipped by `recv_result_for`, oldest first
    held: VecDeque<OutboundMessage>,
}

/// Receiver over outbound messages
pub struct OutboundReceiver {
    inbox: Mutex<Inbox>,
}

impl OutboundReceiver {
    pub(crate) fn new(rx: mpsc::Receiver<OutboundMessage>) -> Self {
        Self {
            inbox: Mutex::new(Inbox {
                rx,
                held: VecDeque::new(),
            }),
        }
    }

    /// Block until a message is available
    ///
    /// Returns `None` once the channel is closed and nothing is held back.
    pub fn recv(&self) -> Option<OutboundMessage> {
        let inbox = self.inbox.lock().ok()?;
        Self::next_held(inbox, |rx| rx.recv().ok())
    }

    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<OutboundMessage> {
        let inbox = self.inbox.lock().ok()?;
        Self::next_held(inbox, |rx| rx.try_recv().ok())
    }

    /// Block until a message is available or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<OutboundMessage> {
        let inbox = self.inbox.lock().ok()?;
        Self::next_held(inbox, |rx| rx.recv_timeout(timeout).ok())
    }

    /// Wait up to `timeout` for the result addressed to `caller_id`
    ///
    /// Notifications and other callers' results that arrive first are held
    /// back for the in-order methods.
    pub fn recv_result_for(
        &self,
        caller_id: &CallerId,
        timeout: Duration,
    ) -> Option<OutboundMessage> {
        let mut inbox = self.inbox.lock().ok()?;

        if let Some(index) = inbox
            .held
            .iter()
            .position(|m| m.caller_id() == Some(caller_id))
        {
            return inbox.held.remove(index);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = inbox.rx.recv_timeout(remaining).ok()?;
            if message.caller_id() == Some(caller_id) {
                return Some(message);
            }
            tracing::trace!(
                "Holding back {:?} while waiting for {}",
                message.caller_id(),
                caller_id
            );
            inbox.held.push_back(message);
        }
    }

    /// Everything delivered so far, without blocking
    pub fn drain(&self) -> Vec<OutboundMessage> {
        let Ok(mut inbox) = self.inbox.lock() else {
            return Vec::new();
        };
        let mut messages: Vec<_> = inbox.held.drain(..).collect();
        messages.extend(inbox.rx.try_iter());
        messages
    }

    fn next_held(
        mut inbox: std::sync::MutexGuard<'_, Inbox>,
        read: impl FnOnce(&mpsc::Receiver<OutboundMessage>) -> Option<OutboundMessage>,
    ) -> Option<OutboundMessage> {
        match inbox.held.pop_front() {
            Some(message) => Some(message),
            None => read(&inbox.rx),
        }
    }
}

impl std::fmt::Debug for OutboundReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let held = self.inbox.lock().map(|inbox| inbox.held.len()).ok();
        f.debug_struct("OutboundReceiver")
            .field("held", &held)
            .finish_non_exhaustive()
    }
}
