//! JSON message envelope exchanged between clients and the relay.
//!
//! Wire shape:
//!
//! ```json
//! {"type":"toggle","position":1200,"timestamp":1717000000000,"clientId":"…"}
//! ```
//!
//! `type` is required. `position` is optional and passed through untouched.
//! `timestamp` defaults to `0` when absent. `clientId` is always overwritten
//! by the relay before an envelope leaves the server. Fields the relay does
//! not know about are kept in [`Envelope::extra`] and relayed as-is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{PING_TYPE, PONG_TYPE};

/// A decoded client message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message type tag (`"ping"`, `"pong"`, or application-defined).
    #[serde(rename = "type")]
    pub kind: String,
    /// Playback position carried by sync-state messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    /// Client- or server-assigned timestamp.
    #[serde(default)]
    pub timestamp: i64,
    /// Sender identity, stamped by the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Unrecognized fields, preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Decode an envelope from a JSON text payload.
    pub fn parse(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    /// Build the reply to a liveness ping.
    #[must_use]
    pub fn pong(timestamp: i64, client_id: impl Into<String>) -> Self {
        Self {
            kind: PONG_TYPE.to_owned(),
            position: None,
            timestamp,
            client_id: Some(client_id.into()),
            extra: Map::new(),
        }
    }

    /// Whether this envelope is a client liveness ping.
    ///
    /// Only `"ping"` is special. An inbound `"pong"` is ordinary data.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.kind == PING_TYPE
    }

    /// Replace the sender identity, discarding whatever the client sent.
    #[must_use]
    pub fn stamped(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Encode to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
