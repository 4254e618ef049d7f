//! Comms Facade
//!
//! [`Comms`] is what the rest of the application talks to. It owns the three
//! link channels and the worker handle, and hides the worker lifecycle.
//!
//! The owner must call [`Comms::keep_alive`] more often than the configured
//! keep-alive timeout, otherwise the worker tears the link down on its own.
//! Failures inside the worker are never reported per operation: callers see
//! [`Comms::is_open`] turn false and then get [`CommsError::PortNotOpen`].

use crate::config::CommsConfig;
use crate::connection::Connection;
use crate::error::CommsError;
use crate::message::{Command, DeviceDescriptor, Message};
use crate::worker::{self, WorkerChannels, WorkerHandle, WorkerState};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Facade ends of the channels for one worker lifetime
struct Link {
    worker: WorkerHandle,
    inbound: mpsc::UnboundedReceiver<Message>,
    outbound: mpsc::Sender<Message>,
    commands: mpsc::UnboundedSender<Command>,
}

/// Message-oriented handle to a data-logging device
pub struct Comms {
    /// Device to open
    device: DeviceDescriptor,
    /// Link implementation shared with the worker
    connection: Arc<dyn Connection>,
    /// Timing configuration
    config: CommsConfig,
    /// Whether the device streams telemetry unsolicited
    supports_streaming: bool,
    /// Present while a worker has been started
    link: Option<Link>,
}

impl Comms {
    /// Create a facade with default timings
    pub fn new(device: impl Into<DeviceDescriptor>, connection: Arc<dyn Connection>) -> Self {
        Self::with_config(device, connection, CommsConfig::default())
    }

    /// Create a facade with explicit timings
    pub fn with_config(
        device: impl Into<DeviceDescriptor>,
        connection: Arc<dyn Connection>,
        config: CommsConfig,
    ) -> Self {
        Self {
            device: device.into(),
            connection,
            config,
            supports_streaming: false,
            link: None,
        }
    }

    /// Start a fresh worker with fresh channels
    ///
    /// Returns once the worker is spawned; a device that fails to open shows
    /// up as [`is_open`](Self::is_open) turning false shortly after.
    pub fn open(&mut self) -> Result<(), CommsError> {
        if self.is_open() {
            return Err(CommsError::AlreadyOpen);
        }
        self.config.validate()?;

        info!("Opening connection {}", self.device);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let worker = worker::spawn(
            Arc::clone(&self.connection),
            self.device.clone(),
            self.config.clone(),
            WorkerChannels {
                inbound: inbound_tx,
                outbound: outbound_rx,
                commands: command_rx,
            },
        )?;

        self.link = Some(Link {
            worker,
            inbound: inbound_rx,
            outbound: outbound_tx,
            commands: command_tx,
        });
        Ok(())
    }

    /// True while the worker is alive
    pub fn is_open(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.worker.is_alive())
    }

    /// Current worker state, if a worker was ever started
    pub fn worker_state(&self) -> Option<WorkerState> {
        self.link.as_ref().map(|link| link.worker.state())
    }

    /// Re-arm the worker's keep-alive timeout; never blocks
    pub fn keep_alive(&self) {
        if let Some(link) = &self.link {
            let _ = link.commands.send(Command::KeepAlive);
        }
    }

    /// Ask the worker to shut down and wait for it
    ///
    /// Waits up to twice the default timeout. A worker that has not stopped by
    /// then is left to finish on its own and keeps reporting as open until it
    /// does.
    pub async fn close(&mut self) {
        debug!("Comms close requested");
        if !self.is_open() {
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let _ = link.commands.send(Command::Close);
        if link.worker.wait_stopped(self.config.join_timeout()).await {
            debug!("Connection worker joined");
            self.link = None;
        } else {
            error!(
                "Timeout joining connection worker after {}ms",
                self.config.join_timeout().as_millis()
            );
        }
    }

    /// Wait up to the default timeout for an inbound message
    ///
    /// `Ok(None)` means nothing arrived in time. Once the reader has exited,
    /// the call waits out the timeout for the worker to stop and then reports
    /// [`CommsError::PortNotOpen`].
    pub async fn read_message(&mut self) -> Result<Option<Message>, CommsError> {
        if !self.is_open() {
            return Err(CommsError::PortNotOpen);
        }
        let timeout = self.config.default_timeout();
        let link = self.link.as_mut().ok_or(CommsError::PortNotOpen)?;
        let deadline = Instant::now() + timeout;

        match tokio::time::timeout(timeout, link.inbound.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            // Reader gone; the worker is on its way to Stopped
            Ok(None) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if link.worker.wait_stopped(remaining).await {
                    Err(CommsError::PortNotOpen)
                } else {
                    Ok(None)
                }
            }
            Err(_) => Ok(None),
        }
    }

    /// Queue a message for the writer, waiting up to the queue-full timeout
    pub async fn write_message(&self, message: impl Into<Message>) -> Result<(), CommsError> {
        if !self.is_open() {
            return Err(CommsError::PortNotOpen);
        }
        let link = self.link.as_ref().ok_or(CommsError::PortNotOpen)?;
        let timeout = self.config.queue_full_timeout();

        link.outbound
            .send_timeout(message.into(), timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => CommsError::Backpressure(timeout),
                SendTimeoutError::Closed(_) => CommsError::PortNotOpen,
            })
    }

    /// Devices the underlying connection can open
    pub fn get_available_devices(&self) -> Result<Vec<DeviceDescriptor>, CommsError> {
        Ok(self.connection.get_available_devices()?)
    }

    /// Whether the underlying link is wireless
    pub fn is_wireless(&self) -> bool {
        self.connection.is_wireless()
    }

    pub fn supports_streaming(&self) -> bool {
        self.supports_streaming
    }

    pub fn set_supports_streaming(&mut self, supports_streaming: bool) {
        self.supports_streaming = supports_streaming;
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn config(&self) -> &CommsConfig {
        &self.config
    }
}
