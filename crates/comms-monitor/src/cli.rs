//! Command line interface

use clap::{Parser, Subcommand};
use device_comms::{DEFAULT_BAUD_RATE, DEFAULT_TCP_PORT};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "comms-monitor", version, about = "Monitor a data logger link")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "COMMS_MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List serial ports that can be opened
    List,

    /// Attach to a serial, USB or Bluetooth SPP port
    Serial {
        /// Port name, e.g. /dev/ttyACM0 or COM3
        port: String,

        /// Baud rate
        #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
        baud: u32,
    },

    /// Attach to a Wi-Fi bridge
    Tcp {
        /// host:port of the bridge
        #[arg(default_value_t = format!("192.168.4.1:{}", DEFAULT_TCP_PORT))]
        address: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serial() {
        let cli = Cli::parse_from(["comms-monitor", "serial", "/dev/ttyACM0", "--baud", "57600"]);
        match cli.command {
            Commands::Serial { port, baud } => {
                assert_eq!(port, "/dev/ttyACM0");
                assert_eq!(baud, 57600);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_tcp_default_address() {
        let cli = Cli::parse_from(["comms-monitor", "-v", "tcp"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Tcp { address } if address == "192.168.4.1:7223"));
    }
}
