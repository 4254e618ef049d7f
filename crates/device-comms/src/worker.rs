//! Connection Worker Supervisor
//!
//! The worker is a dedicated OS thread with its own current-thread tokio
//! runtime, so a slow or hung device driver cannot starve the application's
//! scheduler. It owns the connection for one link lifetime:
//!
//! `Opening -> Running -> Stopping -> Stopped`
//!
//! A failed open goes straight to `Stopped`. Once stopped, a worker is never
//! restarted; `Comms::open` builds a new one.

use crate::config::CommsConfig;
use crate::connection::Connection;
use crate::error::CommsError;
use crate::message::{Command, DeviceDescriptor, Message};
use crate::tasks::{on_blocking_pool, run_reader, run_writer, TaskContext, TaskExit};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const WORKER_THREAD_NAME: &str = "device-comms-worker";

/// Lifecycle state of a connection worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Acquiring and flushing the connection
    Opening,
    /// Reader and writer are pumping messages
    Running,
    /// Joining tasks and closing the connection
    Stopping,
    /// Terminal
    Stopped,
}

/// Worker ends of the three link channels
pub(crate) struct WorkerChannels {
    pub inbound: mpsc::UnboundedSender<Message>,
    pub outbound: mpsc::Receiver<Message>,
    pub commands: mpsc::UnboundedReceiver<Command>,
}

/// Facade-side handle to a running worker
pub(crate) struct WorkerHandle {
    thread: JoinHandle<()>,
    state: watch::Receiver<WorkerState>,
}

impl WorkerHandle {
    /// True until the worker reaches `Stopped` or its thread exits
    pub(crate) fn is_alive(&self) -> bool {
        !self.thread.is_finished() && *self.state.borrow() != WorkerState::Stopped
    }

    pub(crate) fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Wait up to `timeout` for the worker to reach `Stopped`
    pub(crate) async fn wait_stopped(&mut self, timeout: Duration) -> bool {
        let stopped = tokio::time::timeout(
            timeout,
            self.state.wait_for(|state| *state == WorkerState::Stopped),
        )
        .await;

        match stopped {
            Ok(Ok(_)) => true,
            // Sender dropped: the thread is gone
            Ok(Err(_)) => true,
            Err(_) => false,
        }
    }
}

/// Spawn a worker thread for `device`
pub(crate) fn spawn(
    connection: Arc<dyn Connection>,
    device: DeviceDescriptor,
    config: CommsConfig,
    channels: WorkerChannels,
) -> Result<WorkerHandle, CommsError> {
    let (state_tx, state_rx) = watch::channel(WorkerState::Opening);

    let thread = std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to build worker runtime: {}", e);
                    state_tx.send_replace(WorkerState::Stopped);
                    return;
                }
            };

            let join_timeout = config.join_timeout();
            let supervisor = Supervisor {
                connection,
                device,
                config,
                channels,
                state: state_tx,
            };
            runtime.block_on(supervisor.run());

            // A reader stuck inside the connection is left behind here
            runtime.shutdown_timeout(join_timeout);
        })
        .map_err(|e| CommsError::WorkerSpawn(e.to_string()))?;

    Ok(WorkerHandle {
        thread,
        state: state_rx,
    })
}

struct Supervisor {
    connection: Arc<dyn Connection>,
    device: DeviceDescriptor,
    config: CommsConfig,
    channels: WorkerChannels,
    state: watch::Sender<WorkerState>,
}

impl Supervisor {
    async fn run(self) {
        let Supervisor {
            connection,
            device,
            config,
            channels,
            state,
        } = self;
        let WorkerChannels {
            inbound,
            outbound,
            mut commands,
        } = channels;

        debug!("Connection worker starting for {}", device);

        let opened = {
            let device = device.clone();
            on_blocking_pool(&connection, move |c| {
                c.open(&device)?;
                c.flush_input()?;
                c.flush_output()
            })
            .await
        };
        if let Err(e) = opened {
            error!("Failed to open connection to {}: {}", device, e);
            state.send_replace(WorkerState::Stopped);
            debug!("Connection worker exited");
            return;
        }

        info!("Connection to {} open", device);
        state.send_replace(WorkerState::Running);

        let ctx = TaskContext {
            connection: Arc::clone(&connection),
            liveness: CancellationToken::new(),
            error_backoff: config.error_backoff(),
        };

        let reader = {
            let ctx = ctx.clone();
            tokio::task::spawn_blocking(move || run_reader(ctx, inbound))
        };
        let writer = tokio::spawn(run_writer(ctx.clone(), outbound, config.writer_poll()));

        supervise(&mut commands, &ctx.liveness, config.keep_alive_timeout()).await;

        state.send_replace(WorkerState::Stopping);
        debug!("Connection worker stopping");

        let join_timeout = config.join_timeout();
        join_task("reader", reader, join_timeout).await;
        join_task("writer", writer, join_timeout).await;

        let closed = tokio::time::timeout(
            join_timeout,
            on_blocking_pool(&connection, |c| c.close()),
        )
        .await;
        match closed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Error closing connection to {}: {}", device, e),
            Err(_) => warn!(
                "Closing {} did not finish within {}ms, detaching",
                device,
                join_timeout.as_millis()
            ),
        }

        info!("Connection to {} closed", device);
        state.send_replace(WorkerState::Stopped);
        debug!("Connection worker exited");
    }
}

/// Block on the command channel until close, keep-alive timeout, or a task fault
async fn supervise(
    commands: &mut mpsc::UnboundedReceiver<Command>,
    liveness: &CancellationToken,
    keep_alive_timeout: Duration,
) {
    loop {
        tokio::select! {
            _ = liveness.cancelled() => {
                debug!("Reader or writer stopped the link");
                break;
            }
            command = tokio::time::timeout(keep_alive_timeout, commands.recv()) => match command {
                Ok(Some(Command::KeepAlive)) => trace!("Keep-alive"),
                Ok(Some(Command::Close)) => {
                    debug!("Got close command");
                    break;
                }
                Ok(None) => {
                    debug!("Command channel closed");
                    break;
                }
                Err(_) => {
                    warn!(
                        "No keep-alive within {}ms, closing link",
                        keep_alive_timeout.as_millis()
                    );
                    break;
                }
            },
        }
    }

    liveness.cancel();
}

async fn join_task(
    name: &str,
    handle: tokio::task::JoinHandle<TaskExit>,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(TaskExit::Stopped)) => debug!("Message {} joined", name),
        Ok(Ok(TaskExit::Failed(e))) => debug!("Message {} joined after failure: {}", name, e),
        Ok(Err(e)) => error!("Message {} task panicked: {}", name, e),
        Err(_) => warn!(
            "Message {} did not stop within {}ms, detaching",
            name,
            timeout.as_millis()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_until, ScriptedConnection};

    fn start(
        connection: Arc<ScriptedConnection>,
        config: CommsConfig,
    ) -> (
        WorkerHandle,
        mpsc::UnboundedReceiver<Message>,
        mpsc::Sender<Message>,
        mpsc::UnboundedSender<Command>,
    ) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = spawn(
            connection,
            DeviceDescriptor::from("mock"),
            config,
            WorkerChannels {
                inbound: inbound_tx,
                outbound: outbound_rx,
                commands: command_rx,
            },
        )
        .unwrap();
        (handle, inbound_rx, outbound_tx, command_tx)
    }

    #[tokio::test]
    async fn test_open_failure_skips_tasks() {
        let connection = Arc::new(ScriptedConnection::new().fail_open());
        let (mut handle, _rx, _tx, _cmd) = start(connection.clone(), CommsConfig::fast());

        assert!(handle.wait_stopped(Duration::from_secs(2)).await);
        assert!(!handle.is_alive());
        assert_eq!(connection.read_calls(), 0);
        assert_eq!(connection.close_count(), 0);
    }

    #[tokio::test]
    async fn test_close_command_walks_states() {
        let connection = Arc::new(ScriptedConnection::new());
        let (mut handle, _rx, _tx, cmd) = start(connection.clone(), CommsConfig::fast());

        assert!(wait_until(Duration::from_secs(2), || handle.state() == WorkerState::Running).await);
        assert_eq!(connection.flush_count(), 2);

        cmd.send(Command::Close).unwrap();
        assert!(handle.wait_stopped(Duration::from_secs(2)).await);
        assert_eq!(connection.close_count(), 1);
    }

    #[tokio::test]
    async fn test_writer_fault_stops_worker() {
        let connection = Arc::new(ScriptedConnection::new().fail_write_at(1));
        let (mut handle, _rx, tx, _cmd) = start(connection.clone(), CommsConfig::fast());

        tx.send(Message::from("boom")).await.unwrap();

        assert!(handle.wait_stopped(Duration::from_secs(3)).await);
        assert!(!handle.is_alive());
        assert_eq!(connection.write_calls(), 1);
        assert!(connection.written().is_empty());
        assert_eq!(connection.close_count(), 1);
    }

    #[tokio::test]
    async fn test_keep_alive_rearms_timeout() {
        let connection = Arc::new(ScriptedConnection::new());
        let config = CommsConfig::fast();
        let keep_alive = config.keep_alive_timeout();
        let (mut handle, _rx, _tx, cmd) = start(connection, config);

        for _ in 0..8 {
            cmd.send(Command::KeepAlive).unwrap();
            tokio::time::sleep(keep_alive / 4).await;
        }
        assert!(handle.is_alive());

        assert!(handle.wait_stopped(keep_alive * 4).await);
    }

    #[tokio::test]
    async fn test_dropped_facade_stops_worker() {
        let connection = Arc::new(ScriptedConnection::new());
        let (mut handle, rx, tx, cmd) = start(connection.clone(), CommsConfig::default());
        drop((rx, tx, cmd));

        assert!(handle.wait_stopped(Duration::from_secs(3)).await);
        assert_eq!(connection.close_count(), 1);
    }
}
