// src/shutdown.rs

//! Host-exit coordination for non-survivor subprocesses.
//!
//! A [`ShutdownCoordinator`] is constructed explicitly by the host and
//! shared (as `Arc`) with every [`SubprocessHandle`](crate::SubprocessHandle).
//! Runners of non-survivor subprocesses register with it before spawning and
//! unregister once they terminate. At host exit, [`ShutdownCoordinator::shutdown`]
//! cancels every runner still registered and waits for each one with a
//! bounded timeout so the host never hangs on a misbehaving child.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::types::ProcessState;

pub type RunnerId = u64;

/// Cleanup action handed to the host's exit-hook facility.
pub type ExitHook = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// The host's shutdown-task registry.
///
/// The coordinator registers exactly one hook with it over its lifetime, on
/// the first non-survivor launch.
pub trait ExitHookRegistry: Send + Sync {
    fn register(&self, hook: ExitHook);
}

/// Production exit-hook registry: runs hooks when the host receives Ctrl-C.
///
/// Each registered hook gets its own listener task, so this must be used
/// from within a Tokio runtime.
#[derive(Debug, Default)]
pub struct CtrlCExitHooks;

impl ExitHookRegistry for CtrlCExitHooks {
    fn register(&self, hook: ExitHook) {
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl+C; exit hook will not run");
                return;
            }
            info!("Ctrl+C received; running exit hook");
            hook().await;
        });
    }
}

/// A registered runner: how to cancel it and how to see it finish.
pub struct RunnerEntry {
    label: String,
    cancel: Arc<watch::Sender<bool>>,
    state: watch::Receiver<ProcessState>,
}

impl RunnerEntry {
    pub fn new(
        label: String,
        cancel: Arc<watch::Sender<bool>>,
        state: watch::Receiver<ProcessState>,
    ) -> Self {
        Self { label, cancel, state }
    }
}

impl fmt::Debug for RunnerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerEntry")
            .field("label", &self.label)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Result of a shutdown sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Runners that finished within the join bound.
    pub stopped: usize,
    /// Runners still running when the join bound elapsed.
    pub timed_out: usize,
}

pub struct ShutdownCoordinator {
    settings: Settings,
    registry: Mutex<HashMap<RunnerId, RunnerEntry>>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
    hooks: Option<Arc<dyn ExitHookRegistry>>,
    hook_installed: AtomicBool,
    this: Weak<ShutdownCoordinator>,
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("settings", &self.settings)
            .field("registered", &self.registered_count())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl ShutdownCoordinator {
    /// Coordinator without a host exit hook; the host calls
    /// [`shutdown`](Self::shutdown) itself.
    pub fn new(settings: Settings) -> Arc<Self> {
        Self::build(settings, None)
    }

    /// Coordinator that installs its sweep into `hooks` on first use.
    pub fn with_exit_hooks(settings: Settings, hooks: Arc<dyn ExitHookRegistry>) -> Arc<Self> {
        Self::build(settings, Some(hooks))
    }

    fn build(settings: Settings, hooks: Option<Arc<dyn ExitHookRegistry>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            settings,
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            hooks,
            hook_installed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// `true` once the shutdown sweep has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn registered_count(&self) -> usize {
        self.lock_registry().len()
    }

    /// Add a runner to the registry.
    ///
    /// A runner registering after the sweep has started is cancelled
    /// immediately instead.
    pub fn register(&self, entry: RunnerEntry) -> RunnerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        {
            // The sweep sets the flag before draining under this lock.
            let mut registry = self.lock_registry();
            if self.is_shutting_down() {
                drop(registry);
                warn!(runner = id, label = %entry.label, "registration during shutdown; cancelling runner");
                entry.cancel.send_replace(true);
                return id;
            }

            debug!(runner = id, label = %entry.label, "registering runner");
            registry.insert(id, entry);
        }

        self.install_exit_hook();
        id
    }

    pub fn unregister(&self, id: RunnerId) {
        if self.lock_registry().remove(&id).is_some() {
            debug!(runner = id, "unregistered runner");
        }
    }

    /// Cancel every registered runner and wait for each, concurrently, with
    /// the configured join bound.
    ///
    /// Never fails; problems are logged and the sweep carries on.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutting_down.store(true, Ordering::SeqCst);

        let entries: Vec<(RunnerId, RunnerEntry)> = self.lock_registry().drain().collect();
        let join_timeout = self.settings.shutdown_join_timeout;
        info!(count = entries.len(), ?join_timeout, "shutdown sweep: stopping subprocesses");

        let mut joins = JoinSet::new();
        for (id, entry) in entries {
            joins.spawn(async move {
                let RunnerEntry { label, cancel, mut state } = entry;
                cancel.send_replace(true);

                let finished = async move {
                    // An error means the runner is gone, which is just as final.
                    let _ = state.wait_for(|s| *s == ProcessState::Finished).await.map(|_| ());
                };

                match timeout(join_timeout, finished).await {
                    Ok(()) => {
                        debug!(runner = id, label = %label, "runner stopped");
                        true
                    }
                    Err(_) => {
                        warn!(runner = id, label = %label, "runner did not stop within join bound");
                        false
                    }
                }
            });
        }

        let mut report = ShutdownReport::default();
        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok(true) => report.stopped += 1,
                Ok(false) => report.timed_out += 1,
                Err(e) => {
                    error!(error = %e, "shutdown join task failed");
                    report.timed_out += 1;
                }
            }
        }

        info!(stopped = report.stopped, timed_out = report.timed_out, "shutdown sweep finished");
        report
    }

    fn install_exit_hook(&self) {
        let Some(hooks) = &self.hooks else {
            return;
        };
        if self.hook_installed.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("installing shutdown exit hook");
        let this = self.this.clone();
        hooks.register(Box::new(move || {
            Box::pin(async move {
                if let Some(coordinator) = this.upgrade() {
                    coordinator.shutdown().await;
                }
            })
        }));
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, HashMap<RunnerId, RunnerEntry>> {
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }
}
