//! # wasmrelay-settings
//!
//! Layered configuration for relay processes.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`RelaySettings::default()`]
//! 2. **User file** — `~/.wasmrelay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `WASMRELAY_*` overrides (highest priority)
//!
//! The RPC client never reads settings itself; the binary resolves them and
//! hands the client a plain endpoint.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{LoggingSettings, NodeSettings, RelaySettings};
