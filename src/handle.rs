// src/handle.rs

//! Public facade for configuring, starting, stopping and querying a
//! subprocess.
//!
//! A [`SubprocessHandle`] is cheap to clone and safe to use from any thread.
//! Configuration may only change before [`start`](SubprocessHandle::start);
//! after that every setter fails with [`ProcwatchError::IllegalState`].

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::control::StopControl;
use crate::errors::{ProcwatchError, Result};
use crate::exec::runner::{self, LaunchSpec, RunStatus, RunnerContext};
use crate::shutdown::ShutdownCoordinator;
use crate::sink::OutputSink;
use crate::types::{ProcessState, RunOutcome, NOT_FINISHED_EXIT_CODE};

#[derive(Debug, Default)]
struct Options {
    survivor: bool,
    show_exit_code: bool,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    stop_control: Option<Arc<StopControl>>,
}

pub(crate) struct HandleInner {
    command: Vec<String>,
    sink: Arc<dyn OutputSink>,
    coordinator: Arc<ShutdownCoordinator>,
    settings: Settings,
    // Held while checking the state, so setters and `start` cannot race.
    options: Mutex<Options>,
    status: Arc<RunStatus>,
    cancel: Arc<watch::Sender<bool>>,
}

#[derive(Clone)]
pub struct SubprocessHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for SubprocessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubprocessHandle")
            .field("command", &self.inner.command)
            .field("state", &self.state())
            .field("outcome", &self.outcome())
            .finish_non_exhaustive()
    }
}

impl SubprocessHandle {
    /// Create a handle for `command` (argv; the first element is the
    /// executable). Timeouts come from the coordinator's settings.
    pub fn new<I, S>(
        command: I,
        sink: Arc<dyn OutputSink>,
        coordinator: Arc<ShutdownCoordinator>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command: Vec<String> = command.into_iter().map(Into::into).collect();
        if command.is_empty() {
            return Err(ProcwatchError::InvalidArgument(
                "command must contain at least the executable".to_string(),
            ));
        }

        let settings = coordinator.settings();
        let (cancel, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(HandleInner {
                command,
                sink,
                coordinator,
                settings,
                options: Mutex::new(Options::default()),
                status: Arc::new(RunStatus::new()),
                cancel: Arc::new(cancel),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<HandleInner>) -> Self {
        Self { inner }
    }

    /// Exempt (or not) this subprocess from the shutdown sweep.
    pub fn set_survivor(&self, survivor: bool) -> Result<()> {
        self.configure("set_survivor", |o| o.survivor = survivor)
    }

    /// Write "process exited with code N" to the sink on natural exit.
    pub fn set_exit_code_shown(&self, shown: bool) -> Result<()> {
        self.configure("set_exit_code_shown", |o| o.show_exit_code = shown)
    }

    pub fn set_working_dir(&self, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        self.configure("set_working_dir", |o| o.working_dir = Some(dir))
    }

    /// Add an environment variable for the child.
    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let entry = (key.into(), value.into());
        self.configure("set_env", |o| o.env.push(entry))
    }

    pub fn is_survivor(&self) -> bool {
        self.lock_options().survivor
    }

    /// Return the stop control, creating it on first call.
    ///
    /// Later calls return the same control and ignore `label`.
    pub fn create_stop_control(&self, label: impl Into<String>) -> Result<Arc<StopControl>> {
        let mut options = self.lock_options();
        self.ensure_not_started("create_stop_control")?;

        let control = options.stop_control.get_or_insert_with(|| {
            Arc::new(StopControl::new(label.into(), Arc::downgrade(&self.inner)))
        });
        Ok(Arc::clone(control))
    }

    /// Launch the subprocess in the background.
    ///
    /// Returns once the runner task is spawned, not once the child is
    /// running; launch failures surface through the sink and
    /// [`outcome`](Self::outcome). Must be called within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let options = self.lock_options();
        self.ensure_not_started("start")?;

        // Checked before advancing, so a failed start leaves the handle untouched.
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ProcwatchError::IllegalState("start requires a Tokio runtime".to_string())
        })?;

        let spec = LaunchSpec {
            command: self.inner.command.clone(),
            working_dir: options.working_dir.clone(),
            env: options.env.clone(),
            survivor: options.survivor,
            show_exit_code: options.show_exit_code,
        };
        let ctx = RunnerContext {
            spec,
            sink: Arc::clone(&self.inner.sink),
            coordinator: Arc::clone(&self.inner.coordinator),
            settings: self.inner.settings,
            status: Arc::clone(&self.inner.status),
            cancel_tx: Arc::clone(&self.inner.cancel),
            control: options.stop_control.clone(),
        };

        self.inner.status.advance(ProcessState::Running);
        drop(options);

        info!(command = ?self.inner.command, "starting subprocess runner");
        runtime.spawn(runner::run(ctx));
        Ok(())
    }

    /// Request termination and wait for it, up to the stop timeout.
    ///
    /// Does nothing unless the subprocess is running or if a stop was already
    /// requested. Always returns, whether or not the child has exited.
    pub async fn stop(&self) {
        if self.state() != ProcessState::Running {
            return;
        }
        if self.inner.cancel.send_replace(true) {
            debug!(command = ?self.inner.command, "stop already requested");
            return;
        }

        let bound = self.inner.settings.stop_timeout;
        info!(command = ?self.inner.command, ?bound, "stopping subprocess");

        if timeout(bound, self.finished()).await.is_err() {
            warn!(
                command = ?self.inner.command,
                ?bound,
                "subprocess runner did not finish within stop timeout"
            );
        }
    }

    /// Wait until the subprocess has finished. Does nothing unless running.
    pub async fn wait_for(&self) {
        if self.state() != ProcessState::Running {
            return;
        }
        self.finished().await;
    }

    /// Exit code of a finished run, or [`NOT_FINISHED_EXIT_CODE`].
    pub fn exit_code(&self) -> i32 {
        if self.state() != ProcessState::Finished {
            return NOT_FINISHED_EXIT_CODE;
        }
        self.outcome()
            .map(RunOutcome::exit_code)
            .unwrap_or(NOT_FINISHED_EXIT_CODE)
    }

    /// How the run ended; `None` until finished.
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.inner.status.outcome()
    }

    pub fn state(&self) -> ProcessState {
        self.inner.status.state()
    }

    pub fn is_started(&self) -> bool {
        self.state().is_started()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// OS process id while the child is alive.
    pub fn pid(&self) -> Option<u32> {
        self.inner.status.pid()
    }

    async fn finished(&self) {
        let mut rx = self.inner.status.subscribe();
        // The sender lives in `status`, which we hold, so this cannot fail.
        let _ = rx
            .wait_for(|s| *s == ProcessState::Finished)
            .await
            .map(|_| ());
    }

    fn configure(&self, op: &str, apply: impl FnOnce(&mut Options)) -> Result<()> {
        let mut options = self.lock_options();
        self.ensure_not_started(op)?;
        apply(&mut options);
        Ok(())
    }

    fn ensure_not_started(&self, op: &str) -> Result<()> {
        match self.state() {
            ProcessState::NotStarted => Ok(()),
            state => Err(ProcwatchError::IllegalState(format!(
                "{op} called on a subprocess that is {state:?}"
            ))),
        }
    }

    fn lock_options(&self) -> MutexGuard<'_, Options> {
        self.inner.options.lock().unwrap_or_else(|p| p.into_inner())
    }
}
