//! Message, command and device types

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, already-framed unit of payload
///
/// The transport never inspects message contents. Outbound messages are
/// written verbatim, so callers include whatever delimiter the device expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Message(String);

impl Message {
    /// Create a message from any string-like payload
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    /// Payload as text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Payload as raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Message {
    fn from(payload: String) -> Self {
        Self(payload)
    }
}

impl From<&str> for Message {
    fn from(payload: &str) -> Self {
        Self(payload.to_string())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Control commands sent from the facade to the worker supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Re-arm the liveness timeout
    KeepAlive,
    /// Shut the worker down
    Close,
}

/// Identifies the device a connection should open
///
/// A serial port name (`/dev/ttyACM0`, `COM3`) or a network address
/// (`192.168.4.1:7223`), depending on the connection type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceDescriptor(String);

impl DeviceDescriptor {
    /// Create a descriptor
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Descriptor as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceDescriptor {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceDescriptor {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
