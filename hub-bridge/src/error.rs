use thiserror::Error;

/// Errors that can occur in the notification hub bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Hub path or connection string unusable
    #[error("Invalid hub configuration: {0}")]
    InvalidConfig(String),

    /// Bridge configuration rejected by validation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The event loop runtime could not be started
    #[error("Failed to start bridge runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// The background worker is gone (shut down or crashed)
    #[error("Bridge worker has disconnected")]
    WorkerDisconnected,
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
