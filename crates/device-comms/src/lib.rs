//! Device Communication Transport
//!
//! This crate talks to an attached data-logging device over a line-oriented
//! byte stream (serial, Bluetooth SPP, Wi-Fi bridge) without blocking the
//! application. A dedicated worker owns the physical connection and pumps
//! messages in and out of it; the [`Comms`] facade exposes a simple
//! message-oriented interface and enforces the keep-alive contract.

mod comms;
mod config;
mod connection;
mod error;
mod line;
mod message;
mod serial;
mod tasks;
mod tcp;
mod worker;

#[cfg(test)]
mod testing;

pub use comms::Comms;
pub use self::config::{CommsConfig, ENV_PREFIX};
pub use connection::Connection;
pub use error::{CommsError, ConfigError, ConnectionError};
pub use message::{Command, DeviceDescriptor, Message};
pub use serial::{SerialConnection, DEFAULT_BAUD_RATE};
pub use tcp::{TcpConnection, DEFAULT_TCP_PORT};
pub use worker::WorkerState;

/// Default timing constants, in milliseconds
pub mod defaults {
    /// Time allowed for the device to be acquired
    pub const CONNECT_TIMEOUT_MS: u64 = 1000;
    /// Base read/write timeout
    pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
    /// How long a producer waits on a full outbound queue
    pub const QUEUE_FULL_TIMEOUT_MS: u64 = 1000;
    /// Silence on the command channel after which the worker shuts down
    pub const KEEP_ALIVE_TIMEOUT_MS: u64 = 4000;
    /// Writer wake-up interval when there is no outbound traffic
    pub const WRITER_POLL_MS: u64 = 1000;
    /// Pause after a fatal I/O error before a task exits
    pub const ERROR_BACKOFF_MS: u64 = 500;
    /// Outbound queue depth
    pub const OUTBOUND_CAPACITY: usize = 5;
}
