//! TCP Connection for Wi-Fi bridged loggers

use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::line::LineReader;
use crate::message::{DeviceDescriptor, Message};
use parking_lot::Mutex;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// Default port of the logger's Wi-Fi bridge
pub const DEFAULT_TCP_PORT: u16 = 7223;

/// Address of the logger when it runs its own access point
const DEFAULT_AP_ADDRESS: &str = "192.168.4.1";

/// TCP [`Connection`]; the device descriptor is a `host:port` address
pub struct TcpConnection {
    connect_timeout: Duration,
    read_timeout: Duration,
    reader: Mutex<Option<LineReader<TcpStream>>>,
    writer: Mutex<Option<TcpStream>>,
}

impl TcpConnection {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    fn resolve(device: &DeviceDescriptor) -> Result<SocketAddr, ConnectionError> {
        let open_error = |reason: String| ConnectionError::Open {
            device: device.to_string(),
            reason,
        };
        device
            .as_str()
            .to_socket_addrs()
            .map_err(|e| open_error(e.to_string()))?
            .next()
            .ok_or_else(|| open_error("address did not resolve".to_string()))
    }
}

impl Default for TcpConnection {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(1))
    }
}

impl Connection for TcpConnection {
    fn open(&self, device: &DeviceDescriptor) -> Result<(), ConnectionError> {
        let addr = Self::resolve(device)?;
        info!("Connecting to {}", addr);

        let open_error = |e: std::io::Error| ConnectionError::Open {
            device: device.to_string(),
            reason: e.to_string(),
        };
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(open_error)?;
        stream.set_read_timeout(Some(self.read_timeout)).map_err(open_error)?;
        stream.set_nodelay(true).map_err(open_error)?;
        let read_half = stream.try_clone().map_err(open_error)?;

        *self.reader.lock() = Some(LineReader::new(read_half));
        *self.writer.lock() = Some(stream);
        Ok(())
    }

    fn close(&self) -> Result<(), ConnectionError> {
        debug!("Closing TCP connection");
        // Shutting down first unblocks a reader parked in read_line
        let result = match self.writer.lock().take() {
            Some(stream) => stream.shutdown(Shutdown::Both).map_err(ConnectionError::from),
            None => Ok(()),
        };
        self.reader.lock().take();
        result
    }

    fn flush_input(&self) -> Result<(), ConnectionError> {
        let mut reader = self.reader.lock();
        reader.as_mut().ok_or(ConnectionError::NotOpen)?.discard_pending();
        Ok(())
    }

    fn flush_output(&self) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock();
        writer.as_mut().ok_or(ConnectionError::NotOpen)?.flush()?;
        Ok(())
    }

    fn read_line(&self) -> Result<Message, ConnectionError> {
        let mut reader = self.reader.lock();
        reader.as_mut().ok_or(ConnectionError::NotOpen)?.next_line()
    }

    fn write(&self, message: &Message) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock();
        let stream = writer.as_mut().ok_or(ConnectionError::NotOpen)?;
        stream.write_all(message.as_bytes())?;
        Ok(())
    }

    fn get_available_devices(&self) -> Result<Vec<DeviceDescriptor>, ConnectionError> {
        Ok(vec![DeviceDescriptor::new(format!(
            "{}:{}",
            DEFAULT_AP_ADDRESS, DEFAULT_TCP_PORT
        ))])
    }

    fn is_wireless(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    #[test]
    fn test_line_exchange_with_bridge() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let bridge = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            socket.write_all(b"{\"s\":{\"t\":1}}\r\n").unwrap();
            let mut line = String::new();
            BufReader::new(socket).read_line(&mut line).unwrap();
            line
        });

        let connection = TcpConnection::default();
        connection.open(&DeviceDescriptor::new(addr.to_string())).unwrap();

        assert_eq!(connection.read_line().unwrap().as_str(), "{\"s\":{\"t\":1}}");
        connection.write(&Message::from("{\"getMeta\":null}\r\n")).unwrap();
        assert_eq!(bridge.join().unwrap(), "{\"getMeta\":null}\r\n");

        connection.close().unwrap();
        assert!(matches!(connection.read_line(), Err(ConnectionError::NotOpen)));
    }

    #[test]
    fn test_peer_close_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let bridge = std::thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            drop(socket);
        });

        let connection = TcpConnection::default();
        connection.open(&DeviceDescriptor::new(addr.to_string())).unwrap();
        bridge.join().unwrap();

        assert!(matches!(connection.read_line(), Err(ConnectionError::Closed)));
    }

    #[test]
    fn test_capabilities() {
        let connection = TcpConnection::default();
        assert!(connection.is_wireless());
        assert_eq!(
            connection.get_available_devices().unwrap(),
            vec![DeviceDescriptor::from("192.168.4.1:7223")]
        );
    }
}
