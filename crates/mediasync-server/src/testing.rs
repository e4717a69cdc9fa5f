//! Test doubles shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mediasync_core::{Connection, ConnectionId, Payload, RoomId, SendError};
use parking_lot::Mutex;

/// In-memory connection that records every payload it accepts.
pub(crate) struct MockConnection {
    id: ConnectionId,
    room: RoomId,
    received: Mutex<Vec<String>>,
    fail_with: Mutex<Option<SendError>>,
    closed: AtomicBool,
}

impl MockConnection {
    pub(crate) fn new(id: &str, room: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            room: room.into(),
            received: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// A connection whose every `send` fails with `err`.
    pub(crate) fn failing(id: &str, room: &str, err: SendError) -> Arc<Self> {
        let conn = Self::new(id, room);
        *conn.fail_with.lock() = Some(err);
        conn
    }

    pub(crate) fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    pub(crate) fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Connection for MockConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn room(&self) -> &RoomId {
        &self.room
    }

    fn send(&self, payload: Payload) -> Result<(), SendError> {
        if let Some(err) = *self.fail_with.lock() {
            return Err(err);
        }
        self.received.lock().push(payload.as_str().to_owned());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
