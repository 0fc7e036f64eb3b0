// src/errors.rs

//! Crate-wide error type.
//!
//! Only configuration mistakes are returned synchronously. Launch failures,
//! stream errors and forced termination are reported through the sink and
//! [`RunOutcome`](crate::types::RunOutcome) instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcwatchError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProcwatchError>;
