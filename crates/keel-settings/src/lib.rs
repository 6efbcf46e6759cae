//! # keel-settings
//!
//! Configuration for the keel context and streaming core.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`KeelSettings::default()`]
//! 2. **User file**: `~/.keel/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `KEEL_*` overrides (highest priority)
//!
//! There is no global instance. Load once at startup and pass the relevant
//! sections into the constructors that need them.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
