//! Opt-in logger for SDK-user-facing messages.
//!
//! Internal lifecycle diagnostics go straight to `tracing::debug!`. Messages
//! an integrator would want to see while wiring the SDK (HTTP responses,
//! dropped reserved keys, refresh failures) go through [`Logger`], which stays
//! silent until logging is enabled.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct Logger {
    enabled: AtomicBool,
}

impl Logger {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn info(&self, message: impl AsRef<str>) {
        if self.is_enabled() {
            tracing::info!(target: "suprsend", "{}", message.as_ref());
        }
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        if self.is_enabled() {
            tracing::warn!(target: "suprsend", "{}", message.as_ref());
        }
    }

    pub fn error(&self, message: impl AsRef<str>) {
        if self.is_enabled() {
            tracing::error!(target: "suprsend", "{}", message.as_ref());
        }
    }
}
