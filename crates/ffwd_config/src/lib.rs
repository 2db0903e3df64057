//! Parsing and validation of `ffwd.toml` cache configuration files.
//!
//! This crate reads the build-root configuration file and produces a
//! strongly-typed [`FfwdConfig`], plus per-module resolution that merges
//! reactor-wide settings with module overrides.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{
    load_config, load_config_file, load_config_from_str, load_config_or_default, CONFIG_FILE,
};
pub use resolve::{resolve_module, ModuleSettings};
pub use types::*;
