//! Simulated OS push registrar
//!
//! Every device-token request is reported on a channel. The scenario driver
//! reads it and answers through the bridge's OS entry points, playing the OS.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;

use hub_bridge::{DeviceToken, OsError, PushRegistrar};

/// One request the bridge made to the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRequest {
    /// Starts at 1 and counts up per registrar
    pub sequence: u64,
}

impl TokenRequest {
    /// The token the simulated OS issues for this request
    pub fn device_token(&self) -> DeviceToken {
        let mut bytes = vec![0u8; 32];
        bytes[..8].copy_from_slice(&self.sequence.to_be_bytes());
        bytes[8..].fill(0x5a);
        DeviceToken::from_bytes(bytes)
    }
}

/// Registrar that hands each token request to the scenario driver
pub struct ChannelRegistrar {
    requests: mpsc::Sender<TokenRequest>,
    sequence: AtomicU64,
}

impl ChannelRegistrar {
    pub fn new() -> (Self, mpsc::Receiver<TokenRequest>) {
        let (requests, receiver) = mpsc::channel();
        let registrar = Self {
            requests,
            sequence: AtomicU64::new(0),
        };
        (registrar, receiver)
    }
}

impl PushRegistrar for ChannelRegistrar {
    fn request_device_token(&self) -> Result<(), OsError> {
        let request = TokenRequest {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
        };
        tracing::debug!("Simulated OS: device token request #{}", request.sequence);

        self.requests
            .send(request)
            .map_err(|_| OsError::new("simulated OS is not listening"))
    }
}
