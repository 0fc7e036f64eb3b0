// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod errors;
pub mod exec;
pub mod handle;
pub mod logging;
pub mod shutdown;
pub mod sink;
pub mod types;

use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::{CliArgs, SinkKind};
use crate::config::load_or_default;
use crate::errors::Result;
use crate::shutdown::CtrlCExitHooks;
use crate::sink::{ConsoleSink, TracingSink};

pub use crate::config::Settings;
pub use crate::control::StopControl;
pub use crate::errors::ProcwatchError;
pub use crate::handle::SubprocessHandle;
pub use crate::shutdown::{ExitHookRegistry, ShutdownCoordinator, ShutdownReport};
pub use crate::sink::OutputSink;
pub use crate::types::{
    ProcessState, RunOutcome, KILLED_EXIT_CODE, LAUNCH_FAILED_EXIT_CODE, NOT_FINISHED_EXIT_CODE,
};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings loading
/// - the shutdown coordinator, hooked to Ctrl-C
/// - one subprocess handle writing to the console or the log
///
/// Returns the exit code `procwatch` itself should exit with: the child's
/// code for a natural exit, `1` when it was killed or failed to launch.
pub async fn run(args: CliArgs) -> Result<i32> {
    let settings = load_or_default(&args.config)?;
    debug!(?settings, "loaded settings");

    let coordinator = ShutdownCoordinator::with_exit_hooks(settings, Arc::new(CtrlCExitHooks));

    let sink: Arc<dyn OutputSink> = match args.sink {
        SinkKind::Console => Arc::new(ConsoleSink::new()),
        SinkKind::Log => Arc::new(TracingSink::new(args.command.first().cloned().unwrap_or_default())),
    };

    let handle = SubprocessHandle::new(args.command.clone(), sink, Arc::clone(&coordinator))?;
    handle.set_survivor(args.survivor)?;
    handle.set_exit_code_shown(args.show_exit_code)?;
    if let Some(dir) = &args.cwd {
        handle.set_working_dir(dir)?;
    }

    handle.start()?;

    if args.survivor {
        // A survivor is never swept, so Ctrl-C simply detaches from it.
        tokio::select! {
            _ = handle.wait_for() => {}
            _ = tokio::signal::ctrl_c() => {
                info!(pid = ?handle.pid(), "interrupted; leaving survivor subprocess running");
                return Ok(1);
            }
        }
    } else {
        handle.wait_for().await;
    }

    let outcome = handle.outcome();
    info!(?outcome, "subprocess finished");

    Ok(match outcome {
        Some(RunOutcome::Exited(code)) => code,
        Some(other) if other.exit_code() > 0 => other.exit_code(),
        _ => 1,
    })
}
