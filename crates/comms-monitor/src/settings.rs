//! Monitor configuration

use anyhow::{ensure, Context, Result};
use device_comms::CommsConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `COMMS_MONITOR__LOG_LEVEL=debug`
const ENV_PREFIX: &str = "COMMS_MONITOR";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Transport timings
    pub comms: CommsConfig,
    /// How often keep-alive is sent (milliseconds)
    pub keep_alive_interval_ms: u64,
    /// Pause before reopening a dropped link (milliseconds); 0 disables
    pub reconnect_delay_ms: u64,
    /// Line terminator appended to stdin lines
    pub line_ending: String,
    /// Log level when not running verbose
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            comms: CommsConfig::default(),
            keep_alive_interval_ms: 1000,
            reconnect_delay_ms: 2000,
            line_ending: "\r\n".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load from an optional file layered under `COMMS_MONITOR__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let cfg: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("reading monitor configuration")?
            .try_deserialize()
            .context("parsing monitor configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.comms.validate()?;
        ensure!(
            self.keep_alive_interval_ms > 0
                && self.keep_alive_interval_ms < self.comms.keep_alive_timeout_ms,
            "keep_alive_interval_ms ({}) must be between 0 and keep_alive_timeout_ms ({})",
            self.keep_alive_interval_ms,
            self.comms.keep_alive_timeout_ms
        );
        Ok(())
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Option<Duration> {
        (self.reconnect_delay_ms > 0).then(|| Duration::from_millis(self.reconnect_delay_ms))
    }
}
