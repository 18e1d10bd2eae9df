//! # aircall-settings
//!
//! Configuration for the AirCall signaling server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AirCallSettings::default()`]
//! 2. **User file**: `~/.aircall/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `AIRCALL_*` overrides (highest priority)
//!
//! Command-line flags, when the binary is given any, are applied on top by the caller.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings_from_path,
    settings_path,
};
pub use types::{AirCallSettings, LoggingSettings, ServerSettings};
