//! # devtools-remote-settings
//!
//! Configuration for the DevTools remote relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `$DEVTOOLS_REMOTE_SETTINGS` or `./devtools-remote.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `PORT`, `WEBSOCKET_DOMAIN`, `MIXPANEL_TOKEN`
//!    and `DEVTOOLS_REMOTE_*` overrides
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    load_with_env, settings_path,
};
pub use types::*;
