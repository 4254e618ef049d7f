//! Data Logger Link Monitor - Main Entry Point

mod cli;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use settings::MonitorConfig;
use device_comms::{Comms, CommsError, Connection, SerialConnection, TcpConnection};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MonitorConfig::load(cli.config.as_deref())?;
    init_logging(if cli.verbose { "debug" } else { &config.log_level });

    info!("=== Comms Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let (device, connection): (String, Arc<dyn Connection>) = match cli.command {
        Commands::List => {
            let ports = SerialConnection::default()
                .get_available_devices()
                .context("listing serial ports")?;
            for port in ports {
                println!("{}", port);
            }
            return Ok(());
        }
        Commands::Serial { port, baud } => {
            let serial = SerialConnection::new(baud).with_timeout(config.comms.default_timeout());
            info!("Serial link at {} baud", serial.baud_rate());
            (port, Arc::new(serial))
        }
        Commands::Tcp { address } => (
            address,
            Arc::new(TcpConnection::new(
                config.comms.connect_timeout(),
                config.comms.default_timeout(),
            )),
        ),
    };

    let comms = Comms::with_config(device, connection, config.comms.clone());
    run(comms, &config).await
}

/// Initialize logging
fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Pump stdin to the device and device lines to stdout until Ctrl-C or EOF
async fn run(mut comms: Comms, config: &MonitorConfig) -> Result<()> {
    let wireless = if comms.is_wireless() { " (wireless)" } else { "" };
    info!("Attaching to {}{}", comms.device(), wireless);
    comms.open()?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut keep_alive = tokio::time::interval(config.keep_alive_interval());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = keep_alive.tick() => comms.keep_alive(),
            line = stdin.next_line() => match line? {
                Some(line) => {
                    let message = format!("{}{}", line, config.line_ending);
                    match comms.write_message(message).await {
                        Ok(()) => {}
                        Err(CommsError::Backpressure(waited)) => {
                            warn!("Device not draining, dropped line after {}ms", waited.as_millis());
                        }
                        Err(e) => warn!("Write failed: {}", e),
                    }
                }
                None => {
                    info!("End of input");
                    break;
                }
            },
            message = comms.read_message() => match message {
                Ok(Some(message)) => println!("{}", message),
                Ok(None) => {}
                Err(CommsError::PortNotOpen) => {
                    let Some(delay) = config.reconnect_delay() else {
                        error!("Link to {} closed", comms.device());
                        break;
                    };
                    warn!("Link to {} closed, reopening in {}ms", comms.device(), delay.as_millis());
                    tokio::time::sleep(delay).await;
                    if let Err(e) = comms.open() {
                        error!("Reopen failed: {}", e);
                    }
                }
                Err(e) => {
                    error!("Read failed: {}", e);
                    break;
                }
            },
        }
    }

    comms.close().await;
    info!("Monitor stopped");
    Ok(())
}
