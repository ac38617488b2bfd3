//! Outbound messages delivered to the host.
//!
//! Two kinds of message cross the boundary: exactly one terminal result per
//! host request, keyed by the request's [`CallerId`], and any number of
//! unsolicited notification payloads that belong to no request at all.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::caller::CallerId;

/// The host request a result answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    RegisterApplication,
    UnregisterApplication,
}

impl RequestKind {
    /// Event name used in the host envelope
    pub fn event_name(&self) -> &'static str {
        match self {
            RequestKind::RegisterApplication => "registerApplication",
            RequestKind::UnregisterApplication => "unregisterApplication",
        }
    }
}

/// Error categories surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Empty hub path or connection string
    InvalidConfig,
    /// Unregistration without credentials while nothing is registered
    NotRegistered,
    /// The native push subsystem refused to hand out a device token
    OsRegistrationFailed,
    /// The hub backend rejected the device token or connection
    BackendRegistrationFailed,
    /// The hub backend failed to remove the registration
    BackendUnregistrationFailed,
    /// No answer arrived before the pending request expired
    Timeout,
}

/// Registration details returned by the hub on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInfo {
    pub registration_id: String,
    /// Push address the hub registered: the hex device token
    pub channel_uri: String,
    pub notification_hub_path: String,
}

/// Terminal outcome of a single host request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Registration carries its details; unregistration carries nothing.
    Success(Option<RegistrationInfo>),
    Error { kind: ErrorKind, message: String },
    /// Another request of the same kind was already in flight
    Busy,
    /// A newer request of the same kind took over this one's slot
    Superseded,
}

impl Outcome {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Outcome::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Error kind, if this outcome is an error
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    fn status(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "ok",
            Outcome::Error { .. } => "error",
            Outcome::Busy => "busy",
            Outcome::Superseded => "superseded",
        }
    }
}

/// Push payload as delivered by the OS.
///
/// The bridge never looks inside; keys and values reach the host exactly as
/// they arrived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationPayload(Map<String, Value>);

impl NotificationPayload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for NotificationPayload {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl FromIterator<(String, Value)> for NotificationPayload {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A message on its way to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// The one terminal result for a host request
    Result {
        caller_id: CallerId,
        request: RequestKind,
        outcome: Outcome,
    },
    /// An unsolicited push payload
    NotificationReceived(NotificationPayload),
}

impl OutboundMessage {
    pub fn result(caller_id: CallerId, request: RequestKind, outcome: Outcome) -> Self {
        OutboundMessage::Result {
            caller_id,
            request,
            outcome,
        }
    }

    /// Caller this message is addressed to; `None` for notifications.
    pub fn caller_id(&self) -> Option<&CallerId> {
        match self {
            OutboundMessage::Result { caller_id, .. } => Some(caller_id),
            OutboundMessage::NotificationReceived(_) => None,
        }
    }

    /// Outcome carried by a result message
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            OutboundMessage::Result { outcome, .. } => Some(outcome),
            OutboundMessage::NotificationReceived(_) => None,
        }
    }

    /// Whether the host should keep its callback registered after this message.
    ///
    /// Results close the request; notifications repeat for the application's
    /// lifetime.
    pub fn keep_callback(&self) -> bool {
        matches!(self, OutboundMessage::NotificationReceived(_))
    }

    /// Render the envelope a script host consumes.
    pub fn to_host_json(&self) -> Value {
        match self {
            OutboundMessage::Result {
                caller_id,
                request,
                outcome,
            } => {
                let mut envelope = json!({
                    "callbackId": caller_id,
                    "event": request.event_name(),
                    "status": outcome.status(),
                    "keepCallback": false,
                });
                match outcome {
                    Outcome::Success(Some(info)) => {
                        envelope["result"] = json!(info);
                    }
                    Outcome::Error { kind, message } => {
                        envelope["errorKind"] = json!(kind);
                        envelope["message"] = json!(message);
                    }
                    Outcome::Success(None) | Outcome::Busy | Outcome::Superseded => {}
                }
                envelope
            }
            OutboundMessage::NotificationReceived(payload) => json!({
                "event": "notificationReceived",
                "keepCallback": true,
                "payload": payload,
            }),
        }
    }
}
