//! Inbound message routing.
//!
//! A `"ping"` envelope is answered to the sender only. Anything else is
//! stamped with the sender's identity and fanned out to the rest of the room.
//! Input that does not decode as an envelope is dropped and logged; it never
//! tears the connection down.

use std::sync::Arc;

use mediasync_core::{Broadcaster, Connection, Envelope};
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics::{RELAY_MALFORMED_MESSAGES_TOTAL, RELAY_MESSAGES_TOTAL};

/// Why an inbound payload was not routed.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The payload is not a JSON envelope.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The outgoing envelope could not be encoded.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// What the router did with a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routed {
    /// Answered a liveness ping on the sender's own queue.
    Pong,
    /// Fanned out to the sender's room.
    Broadcast,
}

/// Dispatches decoded envelopes to the sender or its room.
pub struct MessageRouter {
    broadcaster: Arc<dyn Broadcaster>,
}

impl MessageRouter {
    /// Create a router that fans out through `broadcaster`.
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }

    /// Route one inbound text payload from `conn`.
    ///
    /// Errors are already logged; callers only need them for accounting.
    pub fn handle(&self, conn: &dyn Connection, payload: &str) -> Result<Routed, RouteError> {
        let envelope = Envelope::parse(payload).map_err(|e| {
            counter!(RELAY_MALFORMED_MESSAGES_TOTAL).increment(1);
            warn!(conn_id = %conn.id(), error = %e, "dropping malformed message");
            RouteError::Malformed(e)
        })?;

        if envelope.is_ping() {
            let reply = Envelope::pong(envelope.timestamp, conn.id().as_str());
            let encoded = reply.to_json().map_err(|e| {
                warn!(conn_id = %conn.id(), error = %e, "failed to encode pong");
                RouteError::Encode(e)
            })?;
            if let Err(e) = conn.send(Arc::new(encoded)) {
                debug!(conn_id = %conn.id(), error = %e, "pong not queued");
            }
            counter!(RELAY_MESSAGES_TOTAL, "kind" => "ping").increment(1);
            return Ok(Routed::Pong);
        }

        let kind = envelope.kind.clone();
        let encoded = envelope
            .stamped(conn.id().as_str())
            .to_json()
            .map_err(|e| {
                warn!(conn_id = %conn.id(), msg_type = %kind, error = %e, "failed to encode message");
                RouteError::Encode(e)
            })?;
        debug!(conn_id = %conn.id(), room = %conn.room(), msg_type = %kind, "relaying message");
        self.broadcaster.broadcast(conn, Arc::new(encoded));
        counter!(RELAY_MESSAGES_TOTAL, "kind" => "relay").increment(1);
        Ok(Routed::Broadcast)
    }
}
