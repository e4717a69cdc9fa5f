//! # mediasync-server
//!
//! Axum HTTP + `WebSocket` relay server.
//!
//! - Room registry with per-room fan-out and slow-consumer eviction
//! - `WebSocket` sessions: bounded outbound queue, ping/pong keepalive, deadlines
//! - Message routing: ping replies, sender identity stamping
//! - HTTP endpoints: `/health`, `/stats`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
mod testing;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use hub::RoomHub;
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;
