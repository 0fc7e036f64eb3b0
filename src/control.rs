// src/control.rs

//! Optional stop affordance for a UI.
//!
//! A [`StopControl`] is inert: it has a label and an activation callback that
//! stops its subprocess and then disables itself. The runner detaches it once
//! the subprocess has finished.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use tracing::debug;

use crate::handle::{HandleInner, SubprocessHandle};

pub struct StopControl {
    label: String,
    enabled: AtomicBool,
    attached: AtomicBool,
    target: Weak<HandleInner>,
}

impl StopControl {
    pub(crate) fn new(label: String, target: Weak<HandleInner>) -> Self {
        Self {
            label,
            enabled: AtomicBool::new(true),
            attached: AtomicBool::new(true),
            target,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// `false` once the subprocess has finished and the control was removed.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Stop the subprocess, then disable the control.
    ///
    /// Returns `false` if the control was already disabled.
    pub async fn activate(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }

        debug!(label = %self.label, "stop control activated");
        if let Some(inner) = self.target.upgrade() {
            SubprocessHandle::from_inner(inner).stop().await;
        }
        self.enabled.store(false, Ordering::SeqCst);
        true
    }

    pub(crate) fn detach(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.attached.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for StopControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopControl")
            .field("label", &self.label)
            .field("enabled", &self.is_enabled())
            .field("attached", &self.is_attached())
            .finish()
    }
}
