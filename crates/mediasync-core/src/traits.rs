//! Seams between the relay components.
//!
//! [`Connection`] is implemented by the WebSocket adapter and by test doubles.
//! [`Broadcaster`] is implemented by the room hub. The router depends only on
//! these traits.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::ids::{ConnectionId, RoomId};

/// Encoded outbound frame, shared between every peer it is fanned out to.
pub type Payload = Arc<String>;

/// Why a payload could not be enqueued on a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SendError {
    /// The bounded outbound queue has no free slot.
    #[error("outbound queue full")]
    QueueFull,
    /// The connection is closing or already closed.
    #[error("connection closed")]
    Closed,
}

/// One client session bound to a single room for its lifetime.
pub trait Connection: Send + Sync {
    /// Unique identity of this connection.
    fn id(&self) -> &ConnectionId;

    /// Room this connection belongs to.
    fn room(&self) -> &RoomId;

    /// Enqueue a payload for delivery.
    ///
    /// Must never block. Returns an error immediately when the payload
    /// cannot be queued.
    fn send(&self, payload: Payload) -> Result<(), SendError>;

    /// Ask the connection to shut down. Safe to call more than once.
    fn close(&self);
}

/// Room membership and fan-out.
pub trait Broadcaster: Send + Sync {
    /// Add a connection to its room, creating the room if needed.
    fn register(&self, conn: Arc<dyn Connection>);

    /// Remove a connection from its room. No-op if it is not a member.
    fn unregister(&self, conn: &dyn Connection);

    /// Deliver `payload` to every member of the sender's room except the sender.
    fn broadcast(&self, sender: &dyn Connection, payload: Payload);

    /// Current room and connection counts.
    fn stats(&self) -> RoomStats;
}

/// Snapshot of registry occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoomStats {
    /// Number of non-empty rooms.
    pub rooms: usize,
    /// Number of connections across all rooms.
    pub clients: usize,
}
