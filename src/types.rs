// src/types.rs

use std::fmt;
use std::process::ExitStatus;

/// Exit code reported while a subprocess has not finished yet.
pub const NOT_FINISHED_EXIT_CODE: i32 = -1;

/// Exit code reported when the process was killed by `stop()` or by the
/// shutdown sweep.
pub const KILLED_EXIT_CODE: i32 = -2;

/// Exit code reported when the native process could not be spawned.
pub const LAUNCH_FAILED_EXIT_CODE: i32 = -3;

/// Lifecycle of a [`SubprocessHandle`](crate::handle::SubprocessHandle).
///
/// Ordered so that `NotStarted < Running < Finished`; transitions only ever
/// move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessState {
    NotStarted,
    Running,
    Finished,
}

impl ProcessState {
    pub fn is_started(self) -> bool {
        self != ProcessState::NotStarted
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited on its own with a code.
    Exited(i32),
    /// The process was terminated by a signal we did not send (unix only).
    Signaled(i32),
    /// The process was killed through `stop()` or the shutdown sweep.
    Killed,
    /// The process never started.
    LaunchFailed,
}

impl RunOutcome {
    /// Build an outcome from a status the child reported on its own.
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return RunOutcome::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return RunOutcome::Signaled(signal);
            }
        }

        RunOutcome::Killed
    }

    /// Integer exit code for this outcome.
    ///
    /// Signals follow the shell convention of `128 + signal`. Forced
    /// termination and launch failure use the negative sentinels.
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Exited(code) => code,
            RunOutcome::Signaled(signal) => 128 + signal,
            RunOutcome::Killed => KILLED_EXIT_CODE,
            RunOutcome::LaunchFailed => LAUNCH_FAILED_EXIT_CODE,
        }
    }

    pub fn is_forced(self) -> bool {
        matches!(self, RunOutcome::Killed)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Exited(code) => write!(f, "exited with code {code}"),
            RunOutcome::Signaled(signal) => write!(f, "terminated by signal {signal}"),
            RunOutcome::Killed => write!(f, "killed"),
            RunOutcome::LaunchFailed => write!(f, "failed to launch"),
        }
    }
}
