use std::sync::Mutex;

use procwatch::shutdown::{ExitHook, ExitHookRegistry};

/// Fake host exit-hook facility: stores hooks so a test can "exit the host".
#[derive(Default)]
pub struct RecordingExitHooks {
    hooks: Mutex<Vec<ExitHook>>,
    registrations: Mutex<usize>,
}

impl RecordingExitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many hooks were ever registered.
    pub fn registrations(&self) -> usize {
        *self.registrations.lock().unwrap()
    }

    /// Run every stored hook, as the host would on exit.
    pub async fn run_all(&self) {
        let hooks: Vec<ExitHook> = self.hooks.lock().unwrap().drain(..).collect();
        for hook in hooks {
            hook().await;
        }
    }
}

impl ExitHookRegistry for RecordingExitHooks {
    fn register(&self, hook: ExitHook) {
        *self.registrations.lock().unwrap() += 1;
        self.hooks.lock().unwrap().push(hook);
    }
}
