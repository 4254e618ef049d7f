//! Reader and writer tasks
//!
//! Both tasks run until the shared liveness token is cancelled. A fatal I/O
//! error cancels the token itself, which stops the sibling task and drives the
//! supervisor into shutdown. Neither task retries.

use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::message::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// How a reader or writer task ended
#[derive(Debug)]
pub(crate) enum TaskExit {
    /// Liveness was cleared elsewhere, or the peer channel went away
    Stopped,
    /// The task hit an I/O error and cleared liveness
    Failed(ConnectionError),
}

/// Shared inputs for both pump tasks
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub connection: Arc<dyn Connection>,
    pub liveness: CancellationToken,
    pub error_backoff: Duration,
}

/// Run a blocking connection call on the runtime's blocking pool
pub(crate) async fn on_blocking_pool<T, F>(
    connection: &Arc<dyn Connection>,
    op: F,
) -> Result<T, ConnectionError>
where
    F: FnOnce(&dyn Connection) -> Result<T, ConnectionError> + Send + 'static,
    T: Send + 'static,
{
    let connection = Arc::clone(connection);
    tokio::task::spawn_blocking(move || op(connection.as_ref()))
        .await
        .map_err(|e| ConnectionError::Io(format!("Blocking call aborted: {}", e)))?
}

/// Reader loop; blocks inside `read_line`, so it runs on a blocking thread
pub(crate) fn run_reader(ctx: TaskContext, inbound: mpsc::UnboundedSender<Message>) -> TaskExit {
    debug!("Message reader started");

    while !ctx.liveness.is_cancelled() {
        let message = match ctx.connection.read_line() {
            Ok(message) => message,
            Err(e) => {
                error!("Message reader failed: {}", e);
                ctx.liveness.cancel();
                std::thread::sleep(ctx.error_backoff);
                debug!("Message reader exited");
                return TaskExit::Failed(e);
            }
        };

        if message.is_empty() {
            continue;
        }

        trace!("rx: {}", message);
        if inbound.send(message).is_err() {
            debug!("Inbound channel closed");
            ctx.liveness.cancel();
            break;
        }
    }

    debug!("Message reader exited");
    TaskExit::Stopped
}

/// Writer loop; waits at most `poll` for outbound work per iteration
pub(crate) async fn run_writer(
    ctx: TaskContext,
    mut outbound: mpsc::Receiver<Message>,
    poll: Duration,
) -> TaskExit {
    debug!("Message writer started");

    while !ctx.liveness.is_cancelled() {
        let message = tokio::select! {
            _ = ctx.liveness.cancelled() => break,
            next = tokio::time::timeout(poll, outbound.recv()) => match next {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!("Outbound channel closed");
                    break;
                }
                // Idle wake-up
                Err(_) => continue,
            },
        };

        trace!("tx: {}", message);
        if let Err(e) = on_blocking_pool(&ctx.connection, move |c| c.write(&message)).await {
            error!("Message writer failed: {}", e);
            ctx.liveness.cancel();
            tokio::time::sleep(ctx.error_backoff).await;
            debug!("Message writer exited");
            return TaskExit::Failed(e);
        }
    }

    debug!("Message writer exited");
    TaskExit::Stopped
}
