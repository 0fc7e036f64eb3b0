// src/exec/mod.rs

//! Process execution layer.
//!
//! This module owns the native child process and its output, using
//! `tokio::process::Command`.
//!
//! - [`runner`] spawns the child, waits for exit or cancellation, and tears
//!   down (coordinator registration, stop control, final state).
//! - [`pump`] drains the child's stdout/stderr into the sink until EOF or
//!   the grace deadline.

pub mod pump;
pub mod runner;

pub use pump::{run_pump, PumpControl, PumpReport};
pub use runner::{LaunchSpec, RunnerPhase};
