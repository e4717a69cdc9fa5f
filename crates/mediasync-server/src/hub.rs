//! Room registry and fan-out.
//!
//! Two lock levels:
//! - the registry lock guards the room map (create, look up, delete rooms)
//! - each room's lock guards its member set
//!
//! Lock order is always registry then room. Broadcasts hold only the room's
//! read lock while enqueueing, so fan-out in different rooms never contends.

use std::collections::HashMap;
use std::sync::Arc;

use mediasync_core::{Broadcaster, Connection, ConnectionId, Payload, RoomId, RoomStats, SendError};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::metrics::{RELAY_BROADCAST_DROPS_TOTAL, RELAY_EVICTIONS_TOTAL, RELAY_ROOMS_ACTIVE};

/// Members of one room.
#[derive(Default)]
struct Room {
    members: RwLock<HashMap<ConnectionId, Arc<dyn Connection>>>,
}

impl Room {
    fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    fn len(&self) -> usize {
        self.members.read().len()
    }
}

/// In-memory room registry implementing [`Broadcaster`].
#[derive(Default)]
pub struct RoomHub {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
}

impl RoomHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections in `room` (0 if it does not exist).
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.room(room).map_or(0, |r| r.len())
    }

    /// Whether `room` currently exists.
    pub fn has_room(&self, room: &RoomId) -> bool {
        self.rooms.read().contains_key(room)
    }

    fn room(&self, room: &RoomId) -> Option<Arc<Room>> {
        self.rooms.read().get(room).cloned()
    }

    /// Remove a peer that could not accept a broadcast and ask it to close.
    ///
    /// Only a full queue counts as an eviction. A peer that is already
    /// closing is just removed.
    fn evict(&self, peer: &dyn Connection, reason: SendError) {
        match reason {
            SendError::QueueFull => {
                warn!(
                    conn_id = %peer.id(),
                    room = %peer.room(),
                    "evicting slow connection"
                );
                counter!(RELAY_EVICTIONS_TOTAL).increment(1);
            }
            SendError::Closed => {
                debug!(conn_id = %peer.id(), room = %peer.room(), "removing closed connection");
            }
        }
        self.unregister(peer);
        peer.close();
    }
}

impl Broadcaster for RoomHub {
    fn register(&self, conn: Arc<dyn Connection>) {
        let room_id = conn.room().clone();
        let conn_id = conn.id().clone();

        // Fast path: the room exists. Insert while still holding the registry
        // read lock so a concurrent delete cannot strand the new member.
        {
            let rooms = self.rooms.read();
            if let Some(room) = rooms.get(&room_id) {
                let mut members = room.members.write();
                let _ = members.insert(conn_id.clone(), conn);
                info!(conn_id = %conn_id, room = %room_id, members = members.len(), "connection registered");
                return;
            }
        }

        let mut rooms = self.rooms.write();
        let room = rooms.entry(room_id.clone()).or_insert_with(|| {
            gauge!(RELAY_ROOMS_ACTIVE).increment(1.0);
            info!(room = %room_id, "room created");
            Arc::new(Room::default())
        });
        let mut members = room.members.write();
        let _ = members.insert(conn_id.clone(), conn);
        info!(conn_id = %conn_id, room = %room_id, members = members.len(), "connection registered");
    }

    fn unregister(&self, conn: &dyn Connection) {
        let Some(room) = self.room(conn.room()) else {
            return;
        };

        let remaining = {
            let mut members = room.members.write();
            if members.remove(conn.id()).is_none() {
                return;
            }
            members.len()
        };
        info!(conn_id = %conn.id(), room = %conn.room(), members = remaining, "connection unregistered");

        if remaining > 0 {
            return;
        }

        // Re-check under the registry write lock: a register may have joined
        // since the member lock was released.
        let mut rooms = self.rooms.write();
        let still_empty = rooms
            .get(conn.room())
            .is_some_and(|current| Arc::ptr_eq(current, &room) && current.is_empty());
        if still_empty {
            let _ = rooms.remove(conn.room());
            gauge!(RELAY_ROOMS_ACTIVE).decrement(1.0);
            info!(room = %conn.room(), "room removed");
        }
    }

    fn broadcast(&self, sender: &dyn Connection, payload: Payload) {
        let Some(room) = self.room(sender.room()) else {
            return;
        };

        let mut to_evict = Vec::new();
        {
            let members = room.members.read();
            let mut recipients = 0u32;
            for (id, peer) in members.iter() {
                if id == sender.id() {
                    continue;
                }
                recipients += 1;
                if let Err(reason) = peer.send(Arc::clone(&payload)) {
                    counter!(RELAY_BROADCAST_DROPS_TOTAL, "reason" => reason_label(reason)).increment(1);
                    to_evict.push((Arc::clone(peer), reason));
                }
            }
            debug!(conn_id = %sender.id(), room = %sender.room(), recipients, "broadcast");
        }

        for (peer, reason) in to_evict {
            self.evict(peer.as_ref(), reason);
        }
    }

    fn stats(&self) -> RoomStats {
        let rooms = self.rooms.read();
        let clients = rooms.values().map(|r| r.len()).sum();
        RoomStats {
            rooms: rooms.len(),
            clients,
        }
    }
}

fn reason_label(reason: SendError) -> &'static str {
    match reason {
        SendError::QueueFull => "queue_full",
        SendError::Closed => "closed",
    }
}
