// src/config/mod.rs

//! Runtime settings for subprocess supervision.
//!
//! - [`model`] holds the raw TOML mapping and the validated [`Settings`].
//! - [`loader`] reads settings files from disk.

pub mod loader;
pub mod model;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{RawSettings, RunnerSection, Settings};
