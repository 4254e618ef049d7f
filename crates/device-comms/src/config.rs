//! Transport timing configuration

use crate::defaults;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix, e.g. `DEVICE_COMMS__KEEP_ALIVE_TIMEOUT_MS=8000`
pub const ENV_PREFIX: &str = "DEVICE_COMMS";

/// Timing and queueing parameters for a [`Comms`](crate::Comms) instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommsConfig {
    /// Time allowed to acquire the device (milliseconds)
    pub connect_timeout_ms: u64,
    /// Base read/write timeout; `read_message` waits this long (milliseconds)
    pub default_timeout_ms: u64,
    /// How long `write_message` waits on a full outbound queue (milliseconds)
    pub queue_full_timeout_ms: u64,
    /// Command-channel silence that tears the worker down (milliseconds)
    pub keep_alive_timeout_ms: u64,
    /// Writer wake-up interval with no outbound traffic (milliseconds)
    pub writer_poll_ms: u64,
    /// Pause after a fatal reader/writer error (milliseconds)
    pub error_backoff_ms: u64,
    /// Outbound queue depth
    pub outbound_capacity: usize,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            default_timeout_ms: defaults::DEFAULT_TIMEOUT_MS,
            queue_full_timeout_ms: defaults::QUEUE_FULL_TIMEOUT_MS,
            keep_alive_timeout_ms: defaults::KEEP_ALIVE_TIMEOUT_MS,
            writer_poll_ms: defaults::WRITER_POLL_MS,
            error_backoff_ms: defaults::ERROR_BACKOFF_MS,
            outbound_capacity: defaults::OUTBOUND_CAPACITY,
        }
    }
}

impl CommsConfig {
    /// Short timings for bench rigs and tests
    pub fn fast() -> Self {
        Self {
            connect_timeout_ms: 100,
            default_timeout_ms: 100,
            queue_full_timeout_ms: 100,
            keep_alive_timeout_ms: 400,
            writer_poll_ms: 50,
            error_backoff_ms: 20,
            ..Default::default()
        }
    }

    /// Load from an optional file layered under `DEVICE_COMMS__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("Loading comms config from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let cfg: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject zero durations and an empty outbound queue
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("default_timeout_ms", self.default_timeout_ms),
            ("queue_full_timeout_ms", self.queue_full_timeout_ms),
            ("keep_alive_timeout_ms", self.keep_alive_timeout_ms),
            ("writer_poll_ms", self.writer_poll_ms),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::Invalid(
                "outbound_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn queue_full_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_full_timeout_ms)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.keep_alive_timeout_ms)
    }

    pub fn writer_poll(&self) -> Duration {
        Duration::from_millis(self.writer_poll_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Bound on joining the worker and its tasks during shutdown
    pub fn join_timeout(&self) -> Duration {
        self.default_timeout() * 2
    }
}
