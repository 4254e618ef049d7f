//! Connection capability
//!
//! A [`Connection`] is the blocking byte-stream link to the physical device.
//! The worker drives it from two concurrent tasks: the reader only calls
//! [`Connection::read_line`] and the writer only calls [`Connection::write`].
//! Implementations must therefore allow one read and one write to be in
//! flight at the same time, typically by locking the read and write halves
//! of the underlying stream independently.

use crate::error::ConnectionError;
use crate::message::{DeviceDescriptor, Message};

/// Blocking link to a data-logging device
pub trait Connection: Send + Sync + 'static {
    /// Acquire the device
    fn open(&self, device: &DeviceDescriptor) -> Result<(), ConnectionError>;

    /// Release the device. Errors are reported but the caller may ignore them.
    fn close(&self) -> Result<(), ConnectionError>;

    /// Discard any unread input
    fn flush_input(&self) -> Result<(), ConnectionError>;

    /// Discard any unsent output
    fn flush_output(&self) -> Result<(), ConnectionError>;

    /// Block until a full line is available
    ///
    /// An empty message means nothing arrived before the link's own read
    /// timeout and is not an error.
    fn read_line(&self) -> Result<Message, ConnectionError>;

    /// Block until the message bytes are accepted by the link
    fn write(&self, message: &Message) -> Result<(), ConnectionError>;

    /// Enumerate devices this connection type can open
    fn get_available_devices(&self) -> Result<Vec<DeviceDescriptor>, ConnectionError>;

    /// Whether the link is wireless
    fn is_wireless(&self) -> bool {
        false
    }
}
