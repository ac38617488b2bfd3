//! The native push subsystem, seen from the bridge.
//!
//! The OS is asked for a device token through [`PushRegistrar`] and answers
//! later, on its own schedule, through the bridge's OS entry points.

/// Opaque push address issued by the OS for this installation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeviceToken(Vec<u8>);

impl DeviceToken {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex-encoded token. Returns `None` on odd length or a non-hex digit.
    pub fn from_hex(encoded: &str) -> Option<Self> {
        hex::decode(encoded).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex, the form hubs and hosts expect
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl std::fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = self.to_hex();
        let prefix = hex.get(..8).unwrap_or(&hex);
        write!(f, "DeviceToken({prefix}..)")
    }
}

/// Error reported by the native push subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct OsError {
    /// Platform error code, when the OS provides one
    pub code: Option<i64>,
    pub message: String,
}

impl OsError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Entry point into the OS push-registration API.
///
/// `request_device_token` must return immediately. The OS answers at most once
/// per request, asynchronously, with either a token or an error delivered to the
/// bridge. An `Err` here means the request never reached the OS and is treated
/// exactly like an asynchronous registration failure.
pub trait PushRegistrar: Send + Sync {
    fn request_device_token(&self) -> Result<(), OsError>;
}
