//! Parsing and validation of `kiln.toml` pipeline configuration.
//!
//! The configuration selects which global passes run and tunes the rewrite
//! engine. Every field has a default, so an empty file is a valid
//! configuration equal to [`PipelineConfig::default`].

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
