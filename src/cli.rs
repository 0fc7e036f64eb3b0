// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `procwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procwatch",
    version,
    about = "Run a command, stream its output, and make sure it dies with us.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the settings file (TOML). A missing file means defaults.
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Leave the child running when procwatch itself is interrupted.
    #[arg(long)]
    pub survivor: bool,

    /// Print the exit code notice when the child exits.
    #[arg(long)]
    pub show_exit_code: bool,

    /// Where child output goes: straight to the console, or through the log.
    #[arg(long, value_enum, value_name = "SINK", default_value = "console")]
    pub sink: SinkKind,

    /// Working directory for the child.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<String>,

    /// Command to run, followed by its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Output destination as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    Console,
    Log,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
