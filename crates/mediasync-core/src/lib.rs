//! # mediasync-core
//!
//! Foundation types shared by the relay crates.
//!
//! - [`envelope`]: the JSON message envelope
//! - [`ids`]: branded connection and room identifiers
//! - [`traits`]: the [`Connection`] and [`Broadcaster`] seams
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod constants;
pub mod envelope;
pub mod ids;
pub mod logging;
pub mod traits;

pub use envelope::Envelope;
pub use ids::{ConnectionId, RoomId};
pub use traits::{Broadcaster, Connection, Payload, RoomStats, SendError};
