//! Protocol-level constants shared by the relay crates.

/// Room joined when the client does not name one.
pub const DEFAULT_ROOM: &str = "default";

/// Envelope type of a client liveness ping.
pub const PING_TYPE: &str = "ping";

/// Envelope type of the reply to a liveness ping.
pub const PONG_TYPE: &str = "pong";

/// Outbound queue capacity per connection.
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 256;

/// Largest inbound frame accepted, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;
