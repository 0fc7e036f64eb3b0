// src/exec/runner.rs

//! Process runner: owns one native child process for its whole life.
//!
//! Phases: `Created -> Launching -> Running -> Draining -> Terminated`.
//! Nothing escapes the runner task; failures end up in the sink, in the
//! recorded [`RunOutcome`] and in the logs.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::control::StopControl;
use crate::exec::pump::{run_pump, PumpControl};
use crate::shutdown::{RunnerEntry, RunnerId, ShutdownCoordinator};
use crate::sink::OutputSink;
use crate::types::{ProcessState, RunOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    Created,
    Launching,
    Running,
    Draining,
    Terminated,
}

/// Everything needed to spawn the native process, frozen at `start()`.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub survivor: bool,
    pub show_exit_code: bool,
}

impl LaunchSpec {
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(self.command.iter().skip(1));

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Survivors must not die with the runtime.
            .kill_on_drop(!self.survivor);
        cmd
    }
}

/// Run state shared between a handle and its runner.
///
/// The outcome is stored before the state is published as `Finished`, so
/// anyone who observes `Finished` also observes the outcome.
#[derive(Debug)]
pub struct RunStatus {
    state: watch::Sender<ProcessState>,
    outcome: Mutex<Option<RunOutcome>>,
    pid: Mutex<Option<u32>>,
}

impl RunStatus {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ProcessState::NotStarted);
        Self {
            state,
            outcome: Mutex::new(None),
            pid: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    /// Move forward to `next`. Returns `false` if that would not be an advance.
    pub fn advance(&self, next: ProcessState) -> bool {
        self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        *self.outcome.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_pid(&self, pid: Option<u32>) {
        *self.pid.lock().unwrap_or_else(|p| p.into_inner()) = pid;
    }

    /// Record the outcome (first one wins) and publish `Finished`.
    fn finish(&self, outcome: RunOutcome) {
        {
            let mut slot = self.outcome.lock().unwrap_or_else(|p| p.into_inner());
            if slot.is_none() {
                *slot = Some(outcome);
            }
        }
        self.set_pid(None);
        self.advance(ProcessState::Finished);
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Inputs handed to a runner task by `SubprocessHandle::start`.
pub struct RunnerContext {
    pub spec: LaunchSpec,
    pub sink: Arc<dyn OutputSink>,
    pub coordinator: Arc<ShutdownCoordinator>,
    pub settings: Settings,
    pub status: Arc<RunStatus>,
    pub cancel_tx: Arc<watch::Sender<bool>>,
    pub control: Option<Arc<StopControl>>,
}

/// Teardown that must happen however the runner ends, including a panic:
/// unregister, detach the stop control, publish `Finished`.
struct Teardown {
    status: Arc<RunStatus>,
    coordinator: Arc<ShutdownCoordinator>,
    registration: Option<RunnerId>,
    control: Option<Arc<StopControl>>,
    outcome: RunOutcome,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if let Some(id) = self.registration.take() {
            self.coordinator.unregister(id);
        }
        if let Some(control) = self.control.take() {
            control.detach();
        }
        self.status.finish(self.outcome);
    }
}

enum WaitResult {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
}

/// Body of the runner task.
pub async fn run(ctx: RunnerContext) {
    let RunnerContext {
        spec,
        sink,
        coordinator,
        settings,
        status,
        cancel_tx,
        control,
    } = ctx;

    let program = spec.program().to_string();
    let mut phase = RunnerPhase::Created;
    transition(&program, &mut phase, RunnerPhase::Launching);

    // Killed is the fallback if this task is torn down early.
    let mut teardown = Teardown {
        status: Arc::clone(&status),
        coordinator: Arc::clone(&coordinator),
        registration: None,
        control,
        outcome: RunOutcome::Killed,
    };

    // Register before spawning so a crash right after spawn is still swept.
    if !spec.survivor {
        teardown.registration = Some(coordinator.register(RunnerEntry::new(
            program.clone(),
            Arc::clone(&cancel_tx),
            status.subscribe(),
        )));
    }

    let mut child = match spec
        .build_command()
        .spawn()
        .with_context(|| format!("spawning '{}'", program))
    {
        Ok(child) => child,
        Err(err) => {
            let detail = format!("{err:#}");
            error!(program = %program, error = %detail, "failed to launch subprocess");
            sink.notice(&format!("failed to launch '{program}': {detail}"));
            teardown.outcome = RunOutcome::LaunchFailed;
            transition(&program, &mut phase, RunnerPhase::Terminated);
            return;
        }
    };

    status.set_pid(child.id());
    info!(program = %program, pid = ?child.id(), survivor = spec.survivor, "subprocess started");

    let (pump_control, drain_rx) = PumpControl::channel();
    let pump = tokio::spawn(run_pump(
        child.stdout.take(),
        child.stderr.take(),
        Arc::clone(&sink),
        drain_rx,
        settings.read_buffer_size,
    ));
    transition(&program, &mut phase, RunnerPhase::Running);

    let mut cancel_rx = cancel_tx.subscribe();
    let waited = tokio::select! {
        res = child.wait() => WaitResult::Exited(res),
        _ = cancelled(&mut cancel_rx) => WaitResult::Cancelled,
    };

    let outcome = match waited {
        WaitResult::Exited(Ok(exit)) => {
            let outcome = RunOutcome::from_status(exit);
            info!(program = %program, exit_code = outcome.exit_code(), %outcome, "subprocess exited");
            outcome
        }
        WaitResult::Exited(Err(e)) => {
            warn!(program = %program, error = %e, "failed waiting on subprocess; killing it");
            kill_child(&program, &mut child).await;
            RunOutcome::Killed
        }
        WaitResult::Cancelled => {
            info!(program = %program, "stop requested; killing subprocess");
            kill_child(&program, &mut child).await;
            RunOutcome::Killed
        }
    };

    pump_control.begin_drain(settings.grace_period);
    transition(&program, &mut phase, RunnerPhase::Draining);

    match pump.await {
        Ok(report) => debug!(program = %program, ?report, "output pump finished"),
        Err(e) => error!(program = %program, error = %e, "output pump task failed"),
    }

    if outcome.is_forced() {
        if !coordinator.is_shutting_down() {
            sink.notice("process killed");
        }
    } else if spec.show_exit_code {
        sink.notice(&format!("process {outcome}"));
    }

    teardown.outcome = outcome;
    transition(&program, &mut phase, RunnerPhase::Terminated);
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|requested| *requested).await.is_err() {
        // Every canceller is gone: nobody can stop us any more.
        std::future::pending::<()>().await;
    }
}

async fn kill_child(program: &str, child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(program = %program, error = %e, "failed to kill subprocess");
    }
}

fn transition(program: &str, phase: &mut RunnerPhase, next: RunnerPhase) {
    debug!(program = %program, from = ?*phase, to = ?next, "runner phase");
    *phase = next;
}
