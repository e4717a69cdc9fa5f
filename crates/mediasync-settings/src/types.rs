//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a partial settings file only
//! needs to name the values it changes.

use std::time::Duration;

use mediasync_core::constants::{
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_ROOM, DEFAULT_SEND_QUEUE_CAPACITY,
};
use mediasync_core::logging::LogLevel;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Shortest read deadline accepted. The ping period must stay non-zero.
pub const MIN_PONG_WAIT_SECS: u64 = 2;

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener and process settings.
    pub server: ServerSettings,
    /// Per-connection protocol settings.
    pub connection: ConnectionSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.connection.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.sendQueueCapacity must be greater than 0".into(),
            ));
        }
        if self.connection.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.maxMessageSize must be greater than 0".into(),
            ));
        }
        if self.connection.pong_wait_secs < MIN_PONG_WAIT_SECS {
            return Err(SettingsError::InvalidValue(format!(
                "connection.pongWaitSecs must be at least {MIN_PONG_WAIT_SECS}"
            )));
        }
        if self.connection.write_wait_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.writeWaitSecs must be greater than 0".into(),
            ));
        }
        if self.server.default_room.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "server.defaultRoom must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Listener and process settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Room used when a client does not request one.
    pub default_room: String,
    /// Grace period for in-flight connections on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            default_room: DEFAULT_ROOM.to_string(),
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerSettings {
    /// Shutdown grace period as a `Duration`.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Per-connection protocol settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Outbound queue capacity. A peer whose queue fills is disconnected.
    pub send_queue_capacity: usize,
    /// Largest inbound frame accepted, in bytes.
    pub max_message_size: usize,
    /// Deadline for a single outbound write.
    pub write_wait_secs: u64,
    /// Read deadline, extended each time the client answers a ping.
    pub pong_wait_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            write_wait_secs: 10,
            pong_wait_secs: 60,
        }
    }
}

impl ConnectionSettings {
    /// Write deadline as a `Duration`.
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    /// Read deadline as a `Duration`.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Interval between server pings: 9/10 of the read deadline, so a ping
    /// always lands before the deadline it is meant to extend.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }
}

/// Logging settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level written to stderr (overridden by `RUST_LOG`).
    pub level: LogLevel,
}
