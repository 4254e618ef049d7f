//! Serial Connection
//!
//! USB CDC and Bluetooth SPP ports, driven through the blocking `serialport`
//! API re-exported by `tokio-serial`. The port is cloned into independently
//! locked read and write halves so the reader and writer never contend.

use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::line::LineReader;
use crate::message::{DeviceDescriptor, Message};
use parking_lot::Mutex;
use std::io::Write;
use std::time::Duration;
use tokio_serial::{ClearBuffer, SerialPort};
use tracing::{debug, info};

/// Default baud rate for data-logger USB/BT links
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default port read timeout
const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Serial-port [`Connection`]
pub struct SerialConnection {
    baud_rate: u32,
    /// Port read timeout; bounds how long `read_line` blocks
    timeout: Duration,
    reader: Mutex<Option<LineReader<Box<dyn SerialPort>>>>,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
}

impl SerialConnection {
    /// Create an unopened serial connection
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Set the port read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Default for SerialConnection {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

impl Connection for SerialConnection {
    fn open(&self, device: &DeviceDescriptor) -> Result<(), ConnectionError> {
        info!("Opening serial port {} at {} baud", device, self.baud_rate);

        let open_error = |e: tokio_serial::Error| ConnectionError::Open {
            device: device.to_string(),
            reason: e.to_string(),
        };
        let port = tokio_serial::new(device.as_str(), self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(open_error)?;
        let read_half = port.try_clone().map_err(open_error)?;

        *self.reader.lock() = Some(LineReader::new(read_half));
        *self.writer.lock() = Some(port);
        Ok(())
    }

    fn close(&self) -> Result<(), ConnectionError> {
        debug!("Closing serial port");
        self.writer.lock().take();
        self.reader.lock().take();
        Ok(())
    }

    fn flush_input(&self) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock();
        let port = writer.as_mut().ok_or(ConnectionError::NotOpen)?;
        port.clear(ClearBuffer::Input)?;
        drop(writer);

        if let Some(reader) = self.reader.lock().as_mut() {
            reader.discard_pending();
        }
        Ok(())
    }

    fn flush_output(&self) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock();
        let port = writer.as_mut().ok_or(ConnectionError::NotOpen)?;
        port.clear(ClearBuffer::Output)?;
        Ok(())
    }

    fn read_line(&self) -> Result<Message, ConnectionError> {
        let mut reader = self.reader.lock();
        reader.as_mut().ok_or(ConnectionError::NotOpen)?.next_line()
    }

    fn write(&self, message: &Message) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock();
        let port = writer.as_mut().ok_or(ConnectionError::NotOpen)?;
        port.write_all(message.as_bytes())?;
        port.flush()?;
        Ok(())
    }

    fn get_available_devices(&self) -> Result<Vec<DeviceDescriptor>, ConnectionError> {
        let ports = tokio_serial::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|port| DeviceDescriptor::new(port.port_name))
            .collect())
    }
}
