//! WebSocket connection state, message routing, and the per-connection loops.

pub mod connection;
pub mod router;
pub mod session;
