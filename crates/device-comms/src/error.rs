//! Transport Error Types

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the [`Comms`](crate::Comms) facade
#[derive(Debug, Error)]
pub enum CommsError {
    /// No worker is alive for this facade
    #[error("Port not open")]
    PortNotOpen,

    /// `open()` called while a worker is still alive
    #[error("Port already open")]
    AlreadyOpen,

    /// Outbound queue stayed full past the queue-full timeout
    #[error("Outbound queue full after {}ms", .0.as_millis())]
    Backpressure(Duration),

    /// The worker thread could not be started
    #[error("Failed to spawn connection worker: {0}")]
    WorkerSpawn(String),

    /// Timing configuration failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Error reported by the underlying connection
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Errors raised by a [`Connection`](crate::Connection) implementation
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// Device could not be acquired
    #[error("Failed to open {device}: {reason}")]
    Open { device: String, reason: String },

    /// Read or write failure on the link
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation attempted before `open` or after `close`
    #[error("Connection is not open")]
    NotOpen,

    /// Peer closed the link
    #[error("Connection closed by device")]
    Closed,
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => ConnectionError::Closed,
            _ => ConnectionError::Io(err.to_string()),
        }
    }
}

impl From<tokio_serial::Error> for ConnectionError {
    fn from(err: tokio_serial::Error) -> Self {
        ConnectionError::Io(err.to_string())
    }
}

/// Errors while loading transport configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Source could not be read or deserialized
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
