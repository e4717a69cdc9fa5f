//! WebSocket client connection state.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use mediasync_core::{Connection, ConnectionId, Payload, RoomId, SendError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    /// Constructed, not yet in a room.
    Created = 0,
    /// Added to its room.
    Registered = 1,
    /// Read and write loops active.
    Running = 2,
    /// A loop has exited or a close was requested; teardown in progress.
    Closing = 3,
    /// Transport released.
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Registered,
            2 => Self::Running,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A connected WebSocket client.
pub struct ClientConnection {
    id: ConnectionId,
    room: RoomId,
    /// Sender half of the bounded outbound queue drained by the write loop.
    tx: mpsc::Sender<Payload>,
    state: AtomicU8,
    /// Cancelled once, by whichever side closes first.
    close_token: CancellationToken,
    connected_at: Instant,
    /// When the last Pong was received.
    last_pong: Mutex<Instant>,
    /// Count of payloads rejected because the queue was full or closed.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection with an outbound queue of `capacity` payloads.
    ///
    /// Returns the receiver the write loop drains.
    pub fn new(
        id: ConnectionId,
        room: RoomId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let now = Instant::now();
        let conn = Self {
            id,
            room,
            tx,
            state: AtomicU8::new(ConnectionState::Created as u8),
            close_token: CancellationToken::new(),
            connected_at: now,
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        };
        (conn, rx)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` if it is later than the current state.
    ///
    /// Returns `false` when the connection is already at or past `next`.
    pub fn advance(&self, next: ConnectionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (next as u8 > cur).then_some(next as u8)
            })
            .is_ok()
    }

    /// Whether close has been requested.
    pub fn is_closed(&self) -> bool {
        self.close_token.is_cancelled()
    }

    /// Resolves once close has been requested.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close_token.cancelled()
    }

    /// Record a Pong from the client.
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last Pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Total payloads rejected for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl Connection for ClientConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn room(&self) -> &RoomId {
        &self.room
    }

    fn send(&self, payload: Payload) -> Result<(), SendError> {
        if self.is_closed() {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            return Err(SendError::Closed);
        }
        self.tx.try_send(payload).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => SendError::QueueFull,
                TrySendError::Closed(_) => SendError::Closed,
            }
        })
    }

    fn close(&self) {
        let _ = self.advance(ConnectionState::Closing);
        self.close_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Payload>) {
        ClientConnection::new("conn_1".into(), "room_1".into(), capacity)
    }

    fn payload(s: &str) -> Payload {
        Arc::new(s.to_owned())
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection(8);
        assert_eq!(conn.id().as_str(), "conn_1");
        assert_eq!(conn.room().as_str(), "room_1");
        assert_eq!(conn.state(), ConnectionState::Created);
        assert!(!conn.is_closed());
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection(8);
        assert!(conn.send(payload("hello")).is_ok());
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[test]
    fn send_to_full_queue_fails_immediately() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(payload("msg1")).is_ok());
        assert_eq!(conn.send(payload("msg2")), Err(SendError::QueueFull));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_after_receiver_dropped_reports_closed() {
        let (conn, rx) = make_connection(8);
        drop(rx);
        assert_eq!(conn.send(payload("hello")), Err(SendError::Closed));
    }

    #[test]
    fn send_after_close_reports_closed() {
        let (conn, _rx) = make_connection(8);
        conn.close();
        assert_eq!(conn.send(payload("hello")), Err(SendError::Closed));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_preserves_fifo_order() {
        let (conn, mut rx) = make_connection(8);
        for i in 0..5 {
            assert!(conn.send(payload(&format!("msg_{i}"))).is_ok());
        }
        for i in 0..5 {
            assert_eq!(&*rx.recv().await.unwrap(), &format!("msg_{i}"));
        }
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (conn, _rx) = make_connection(0);
        assert!(conn.send(payload("only")).is_ok());
        assert_eq!(conn.send(payload("next")), Err(SendError::QueueFull));
    }

    #[test]
    fn state_advances_forward_only() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.advance(ConnectionState::Registered));
        assert!(conn.advance(ConnectionState::Running));
        assert!(!conn.advance(ConnectionState::Registered));
        assert_eq!(conn.state(), ConnectionState::Running);
        assert!(conn.advance(ConnectionState::Closed));
        assert!(!conn.advance(ConnectionState::Running));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn close_is_idempotent() {
        let (conn, _rx) = make_connection(8);
        let _ = conn.advance(ConnectionState::Running);
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn close_does_not_rewind_closed_state() {
        let (conn, _rx) = make_connection(8);
        let _ = conn.advance(ConnectionState::Closed);
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn closed_future_resolves_after_close() {
        let (conn, _rx) = make_connection(8);
        let conn = Arc::new(conn);
        let waiter = Arc::clone(&conn);
        let handle = tokio::spawn(async move {
            waiter.closed().await;
            true
        });
        conn.close();
        assert!(handle.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn mark_alive_resets_elapsed() {
        let (conn, _rx) = make_connection(8);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(conn.last_pong_elapsed(), Duration::from_secs(5));
        conn.mark_alive();
        assert_eq!(conn.last_pong_elapsed(), Duration::ZERO);
        assert_eq!(conn.age(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn connection_age_increases() {
        let (conn, _rx) = make_connection(8);
        let age1 = conn.age();
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(conn.age() > age1);
    }

    #[test]
    fn state_ordering() {
        assert!(ConnectionState::Created < ConnectionState::Registered);
        assert!(ConnectionState::Running < ConnectionState::Closing);
        assert!(ConnectionState::Closing < ConnectionState::Closed);
    }
}
