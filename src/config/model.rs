// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::errors::ProcwatchError;

/// Settings file as read from TOML.
///
/// ```toml
/// [runner]
/// grace_period_ms = 10000
/// stop_timeout_ms = 10000
/// shutdown_join_timeout_ms = 10000
/// read_buffer_size = 8192
/// ```
///
/// Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSettings {
    #[serde(default)]
    pub runner: RunnerSection,
}

/// `[runner]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    /// How long the output pump keeps flushing after a drain signal.
    #[serde(default = "default_ten_seconds_ms")]
    pub grace_period_ms: u64,

    /// Upper bound on how long `stop()` waits for the runner.
    #[serde(default = "default_ten_seconds_ms")]
    pub stop_timeout_ms: u64,

    /// Upper bound on how long the shutdown sweep waits for each runner.
    #[serde(default = "default_ten_seconds_ms")]
    pub shutdown_join_timeout_ms: u64,

    /// Size of the per-stream read buffer used by the pump.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

fn default_ten_seconds_ms() -> u64 {
    10_000
}

fn default_read_buffer_size() -> usize {
    8 * 1024
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            grace_period_ms: default_ten_seconds_ms(),
            stop_timeout_ms: default_ten_seconds_ms(),
            shutdown_join_timeout_ms: default_ten_seconds_ms(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

/// Validated settings shared by handles, runners and the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub grace_period: Duration,
    pub stop_timeout: Duration,
    pub shutdown_join_timeout: Duration,
    pub read_buffer_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(10),
            shutdown_join_timeout: Duration::from_secs(10),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl Settings {
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn with_shutdown_join_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_join_timeout = timeout;
        self
    }
}

impl TryFrom<RawSettings> for Settings {
    type Error = ProcwatchError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let runner = raw.runner;

        let durations = [
            ("grace_period_ms", runner.grace_period_ms),
            ("stop_timeout_ms", runner.stop_timeout_ms),
            ("shutdown_join_timeout_ms", runner.shutdown_join_timeout_ms),
        ];
        for (key, value) in durations {
            if value == 0 {
                return Err(ProcwatchError::Config(format!(
                    "runner.{key} must be greater than zero"
                )));
            }
        }

        if runner.read_buffer_size == 0 {
            return Err(ProcwatchError::Config(
                "runner.read_buffer_size must be greater than zero".to_string(),
            ));
        }

        Ok(Settings {
            grace_period: Duration::from_millis(runner.grace_period_ms),
            stop_timeout: Duration::from_millis(runner.stop_timeout_ms),
            shutdown_join_timeout: Duration::from_millis(runner.shutdown_join_timeout_ms),
            read_buffer_size: runner.read_buffer_size,
        })
    }
}
