//! Server configuration.

use std::time::Duration;

use mediasync_core::constants::{DEFAULT_ROOM, DEFAULT_SEND_QUEUE_CAPACITY};
use mediasync_settings::RelaySettings;

use crate::websocket::session::SessionTiming;

/// Runtime configuration for the relay server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Room for clients that do not name one.
    pub default_room: String,
    /// Outbound queue capacity per connection.
    pub send_queue_capacity: usize,
    /// Per-session deadlines and size limit.
    pub timing: SessionTiming,
    /// How long shutdown waits for sessions to drain.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            default_room: DEFAULT_ROOM.into(),
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            timing: SessionTiming::default(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        let conn = &settings.connection;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            default_room: settings.server.default_room.clone(),
            send_queue_capacity: conn.send_queue_capacity,
            timing: SessionTiming {
                write_wait: conn.write_wait(),
                pong_wait: conn.pong_wait(),
                ping_period: conn.ping_period(),
                max_message_size: conn.max_message_size,
            },
            shutdown_timeout: settings.server.shutdown_timeout(),
        }
    }
}
