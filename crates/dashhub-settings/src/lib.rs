//! # dashhub-settings
//!
//! Layered configuration for the dashhub server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`DashSettings::default()`]
//! 2. **Settings file**: `~/.dashhub/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment**: `DASHHUB_*` overrides
//!
//! The loaded value is passed explicitly to whoever needs it; there is no
//! global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_file, load_settings, load_settings_from_path,
    parse_bool, parse_in_range, settings_path,
};
pub use types::{DashSettings, HubSettings, LoggingSettings, ServerSettings};
