// src/config/loader.rs

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawSettings, Settings};
use crate::errors::{ProcwatchError, Result};

/// Load a settings file and return the raw `RawSettings`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] to get
/// usable [`Settings`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawSettings = toml::from_str(&contents)?;

    Ok(raw)
}

/// Load a settings file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Settings> {
    let raw = load_from_path(&path)?;
    Settings::try_from(raw)
}

/// Like [`load_and_validate`], but a missing file yields default settings.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    match load_and_validate(path) {
        Err(ProcwatchError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "settings file not found; using defaults");
            Ok(Settings::default())
        }
        other => other,
    }
}

/// Default settings location: `Procwatch.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Procwatch.toml")
}
