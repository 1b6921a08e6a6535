use futures::{FutureExt, SinkExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{StompCodec, StompItem};
use crate::connection::{ConnectionState, Shared};
use crate::dispatch::Delivery;
use crate::error::{ConnError, ServerError};
use crate::frame::{Command, Frame};

/// Per-session settings decided during the handshake.
pub(crate) struct SessionConfig {
    pub(crate) send_interval: Option<Duration>,
    pub(crate) recv_interval: Option<Duration>,
}

/// Why the session loop stopped.
enum Exit {
    /// `disconnect` or every handle dropped.
    Shutdown,
    /// Peer closed the transport.
    Eof,
    Failed(ConnError),
}

/// Interval that never matters when the direction is disabled; the select
/// arm is guarded off in that case anyway.
fn ticker(period: Option<Duration>) -> tokio::time::Interval {
    let mut t = tokio::time::interval(period.unwrap_or(Duration::from_secs(86400)));
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

/// Start the session task.
///
/// A panic inside the loop (for example in a subscription handler) is caught
/// so the terminal path still runs: the connection fails with
/// [`ConnError::SessionAborted`] and waiters are released.
pub(crate) fn spawn<T>(
    framed: Framed<T, StompCodec>,
    out_rx: mpsc::Receiver<StompItem>,
    shutdown_rx: broadcast::Receiver<()>,
    shared: Arc<Shared>,
    config: SessionConfig,
) where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let session = run(framed, out_rx, shutdown_rx, shared.clone(), config);
        let Err(panic) = AssertUnwindSafe(session).catch_unwind().await else {
            return;
        };
        let reason = if let Some(s) = panic.downcast_ref::<&str>() {
            format!("panic in session task: {s}")
        } else if let Some(s) = panic.downcast_ref::<String>() {
            format!("panic in session task: {s}")
        } else {
            "panic in session task".to_string()
        };
        error!(reason = %reason, "session task aborted");
        let already_terminal = shared.state.borrow().is_terminal();
        if already_terminal {
            shared.dispatch.clear().await;
        } else {
            finish(&shared, Exit::Failed(ConnError::SessionAborted(reason))).await;
        }
    });
}

/// Own the transport for the lifetime of a session.
///
/// One task does all I/O: outbound frames are written in the order they
/// were queued, inbound frames are dispatched in wire order, and heartbeats
/// are sent and checked. When the loop ends the connection state becomes
/// terminal and every pending receipt fails.
async fn run<T>(
    framed: Framed<T, StompCodec>,
    mut out_rx: mpsc::Receiver<StompItem>,
    mut shutdown_rx: broadcast::Receiver<()>,
    shared: Arc<Shared>,
    config: SessionConfig,
) where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut sink, mut stream) = framed.split();
    let SessionConfig {
        send_interval,
        recv_interval,
    } = config;

    let mut last_sent = Instant::now();
    let mut last_received = Instant::now();
    // Checking at half the period keeps the gap between writes under it.
    let mut hb_tick = ticker(send_interval.map(|d| d / 2));
    let mut watchdog = ticker(recv_interval.map(|d| d / 2));

    let exit = loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = sink.close().await;
                break Exit::Shutdown;
            }
            maybe = out_rx.recv() => match maybe {
                Some(item) => {
                    if let Err(e) = sink.send(item).await {
                        break Exit::Failed(e);
                    }
                    last_sent = Instant::now();
                }
                None => {
                    debug!("all connection handles dropped, closing");
                    let _ = sink.close().await;
                    break Exit::Shutdown;
                }
            },
            item = stream.next() => match item {
                Some(Ok(StompItem::Heartbeat)) => {
                    trace!("heartbeat received");
                    last_received = Instant::now();
                }
                Some(Ok(StompItem::Frame(f))) => {
                    last_received = Instant::now();
                    handle_inbound(&shared, f).await;
                }
                Some(Err(e)) => break Exit::Failed(e),
                None => break Exit::Eof,
            },
            _ = hb_tick.tick(), if send_interval.is_some() => {
                let idle = last_sent.elapsed();
                if send_interval.is_some_and(|d| idle >= d / 2) {
                    if let Err(e) = sink.send(StompItem::Heartbeat).await {
                        break Exit::Failed(e);
                    }
                    trace!("heartbeat sent");
                    last_sent = Instant::now();
                }
            }
            _ = watchdog.tick(), if recv_interval.is_some() => {
                if let Some(recv) = recv_interval {
                    if last_received.elapsed() > recv * 2 {
                        let _ = sink.close().await;
                        break Exit::Failed(ConnError::HeartbeatTimeout(recv.as_millis() as u64));
                    }
                }
            }
        }
    };

    out_rx.close();
    finish(&shared, exit).await;
}

async fn handle_inbound(shared: &Shared, frame: Frame) {
    match frame.command {
        Command::Message => {
            let subscription = frame.get_header("subscription").map(str::to_string);
            match shared.dispatch.deliver(frame).await {
                Delivery::Delivered => {}
                Delivery::UnknownSubscription => {
                    debug!(subscription = ?subscription, "MESSAGE for inactive subscription dropped")
                }
                Delivery::NoSubscriptionHeader => warn!("MESSAGE without subscription header dropped"),
            }
        }
        Command::Receipt => match frame.get_header("receipt-id").map(str::to_string) {
            Some(id) => {
                trace!(receipt = %id, "RECEIPT received");
                shared.dispatch.resolve_receipt(&id, Ok(frame)).await;
            }
            None => warn!("RECEIPT without receipt-id ignored"),
        },
        Command::Error => {
            let err = ServerError::from_frame(frame);
            warn!(message = %err.message, receipt = ?err.receipt_id, "ERROR frame received");
            if let Some(id) = err.receipt_id.clone() {
                shared.dispatch.resolve_receipt(&id, Err(err.clone())).await;
            }
            shared.notify_error(&ConnError::Server(err)).await;
        }
        other => warn!(command = %other, "unexpected frame from broker ignored"),
    }
}

async fn finish(shared: &Shared, exit: Exit) {
    let (next, cause) = match exit {
        Exit::Shutdown => (ConnectionState::Closed, None),
        Exit::Eof => (ConnectionState::Closed, Some(ConnError::ConnectionClosed)),
        Exit::Failed(e) => (ConnectionState::Failed, Some(e)),
    };
    let previous = shared.state.send_replace(next);
    shared.dispatch.clear().await;

    let Some(cause) = cause else {
        info!("STOMP session closed");
        return;
    };
    if matches!(cause, ConnError::Malformed(_)) {
        shared.notify_error(&cause).await;
    }
    if previous == ConnectionState::Connected {
        warn!(error = %cause, state = ?next, "connection dropped");
        shared.notify_dropped(&cause).await;
    } else {
        debug!(error = %cause, "transport ended during disconnect");
    }
}
