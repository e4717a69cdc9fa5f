//! Per-connection read and write loops.
//!
//! The write loop is the only task that touches the outbound half of the
//! socket. It drains the connection's queue, sends a Ping every
//! `ping_period`, and bounds every write by `write_wait`.
//!
//! The read loop runs on the session task. Its deadline starts at
//! `pong_wait` and is pushed forward only when a Pong arrives, so a client
//! that keeps sending data but never answers pings still times out.
//!
//! Whichever loop finishes first requests close on the connection; the
//! other observes it and exits. Teardown (unregister, close, join writer)
//! happens exactly once, on the session task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use mediasync_core::constants::DEFAULT_MAX_MESSAGE_SIZE;
use mediasync_core::{Broadcaster, Connection, Payload};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::connection::{ClientConnection, ConnectionState};
use super::router::MessageRouter;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Deadlines and limits applied to one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTiming {
    /// Bound on a single outbound write.
    pub write_wait: Duration,
    /// Read deadline, refreshed on each Pong.
    pub pong_wait: Duration,
    /// Interval between server Pings. Must be shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for SessionTiming {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Shared collaborators a session needs.
#[derive(Clone)]
pub struct SessionContext {
    /// Room registry the connection joins.
    pub hub: Arc<dyn Broadcaster>,
    /// Inbound message dispatcher.
    pub router: Arc<MessageRouter>,
    /// Deadlines and limits.
    pub timing: SessionTiming,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// Client sent a Close frame.
    ClientClosed,
    /// Inbound stream ended without a Close frame.
    StreamEnded,
    /// Transport error while reading.
    ReadError,
    /// No Pong within the read deadline.
    ReadTimeout,
    /// Inbound message exceeded the size limit.
    MessageTooLarge,
    /// Transport error while writing.
    WriteError,
    /// A write did not complete within `write_wait`.
    WriteTimeout,
    /// Close was requested on the connection (for example by eviction).
    CloseRequested,
    /// The server is shutting down.
    Shutdown,
}

impl ExitReason {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::StreamEnded => "stream_ended",
            Self::ReadError => "read_error",
            Self::ReadTimeout => "read_timeout",
            Self::MessageTooLarge => "message_too_large",
            Self::WriteError => "write_error",
            Self::WriteTimeout => "write_timeout",
            Self::CloseRequested => "close_requested",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drive one WebSocket connection from registration to teardown.
///
/// `sink` and `stream` are the two halves of the socket. `outbound` is the
/// receiver returned by [`ClientConnection::new`].
pub async fn run_ws_session<S, R, E>(
    sink: S,
    mut stream: R,
    connection: Arc<ClientConnection>,
    outbound: mpsc::Receiver<Payload>,
    ctx: SessionContext,
) -> ExitReason
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: fmt::Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    ctx.hub.register(connection.clone());
    let _ = connection.advance(ConnectionState::Registered);
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(conn_id = %connection.id(), room = %connection.room(), "client connected");

    let writer = tokio::spawn(write_loop(
        sink,
        outbound,
        Arc::clone(&connection),
        ctx.timing,
    ));
    let _ = connection.advance(ConnectionState::Running);

    let read_exit = read_loop(&mut stream, &connection, &ctx).await;

    let _ = connection.advance(ConnectionState::Closing);
    ctx.hub.unregister(connection.as_ref());
    connection.close();
    let write_exit = writer.await.unwrap_or_else(|e| {
        warn!(conn_id = %connection.id(), error = %e, "write loop aborted");
        ExitReason::WriteError
    });
    let _ = connection.advance(ConnectionState::Closed);

    // A failed write surfaces on the read side as a close request.
    let reason = if read_exit == ExitReason::CloseRequested {
        write_exit
    } else {
        read_exit
    };

    let elapsed = connection.age();
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(elapsed.as_secs_f64());
    info!(
        conn_id = %connection.id(),
        room = %connection.room(),
        %reason,
        duration_secs = elapsed.as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    reason
}

async fn read_loop<R, E>(
    stream: &mut R,
    connection: &ClientConnection,
    ctx: &SessionContext,
) -> ExitReason
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let timing = ctx.timing;
    let mut deadline = Instant::now() + timing.pong_wait;

    loop {
        let next = tokio::select! {
            () = connection.closed() => return ExitReason::CloseRequested,
            () = ctx.shutdown.cancelled() => return ExitReason::Shutdown,
            next = time::timeout_at(deadline, stream.next()) => next,
        };

        let message = match next {
            Err(_elapsed) => {
                debug!(
                    conn_id = %connection.id(),
                    since_pong_ms = connection.last_pong_elapsed().as_millis(),
                    "read deadline expired"
                );
                return ExitReason::ReadTimeout;
            }
            Ok(None) => return ExitReason::StreamEnded,
            Ok(Some(Err(e))) => {
                debug!(conn_id = %connection.id(), error = %e, "read error");
                return ExitReason::ReadError;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                let text = text.as_str();
                if text.len() > timing.max_message_size {
                    warn!(conn_id = %connection.id(), size = text.len(), "inbound message too large");
                    return ExitReason::MessageTooLarge;
                }
                let _ = ctx.router.handle(connection, text);
            }
            Message::Binary(data) => {
                if data.len() > timing.max_message_size {
                    warn!(conn_id = %connection.id(), size = data.len(), "inbound message too large");
                    return ExitReason::MessageTooLarge;
                }
                match std::str::from_utf8(&data) {
                    Ok(text) => {
                        let _ = ctx.router.handle(connection, text);
                    }
                    Err(_) => {
                        debug!(conn_id = %connection.id(), "dropping non-UTF-8 binary frame");
                    }
                }
            }
            Message::Pong(_) => {
                connection.mark_alive();
                deadline = Instant::now() + timing.pong_wait;
                trace!(conn_id = %connection.id(), "pong received");
            }
            // Pong replies are queued by the transport.
            Message::Ping(_) => {}
            Message::Close(_) => return ExitReason::ClientClosed,
        }
    }
}

async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Payload>,
    connection: Arc<ClientConnection>,
    timing: SessionTiming,
) -> ExitReason
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let mut ping = time::interval(timing.ping_period);
    let _ = ping.tick().await; // consume first immediate tick

    let exit = loop {
        tokio::select! {
            () = connection.closed() => break ExitReason::CloseRequested,
            msg = outbound.recv() => {
                let Some(payload) = msg else {
                    break ExitReason::CloseRequested;
                };
                let frame = Message::Text(String::clone(&payload).into());
                if let Err(reason) = write_frame(&mut sink, frame, timing.write_wait).await {
                    break reason;
                }
            }
            _ = ping.tick() => {
                if let Err(reason) = write_frame(&mut sink, Message::Ping(Vec::new().into()), timing.write_wait).await {
                    break reason;
                }
                trace!(conn_id = %connection.id(), "sent ping");
            }
        }
    };

    connection.close();
    if exit == ExitReason::CloseRequested {
        let _ = write_frame(&mut sink, Message::Close(None), timing.write_wait).await;
    } else {
        debug!(conn_id = %connection.id(), reason = %exit, "write loop failed");
    }
    let _ = time::timeout(timing.write_wait, sink.close()).await;
    exit
}

async fn write_frame<S>(sink: &mut S, frame: Message, write_wait: Duration) -> Result<(), ExitReason>
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    match time::timeout(write_wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(error = %e, "write error");
            Err(ExitReason::WriteError)
        }
        Err(_elapsed) => Err(ExitReason::WriteTimeout),
    }
}
