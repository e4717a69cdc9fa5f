//! # mediasync-settings
//!
//! Layered configuration for the relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `--config`, `$MEDIASYNC_CONFIG`, or `./mediasync.json`
//! 3. **Environment variables**: `PORT`, `LOG_LEVEL` and `MEDIASYNC_*`

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::{ConnectionSettings, LoggingSettings, RelaySettings, ServerSettings};
