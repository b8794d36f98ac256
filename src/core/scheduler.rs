//! Cancellable background timers.
//!
//! The token refresh timer and the feed expiry sweep are both a
//! [`ScheduledTask`]: a tokio task that sleeps and runs a callback, either
//! once or repeatedly until cancelled. Dropping the task cancels it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Callback run on each tick of a scheduled task.
pub type TaskCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Spawns `future` on the current tokio runtime.
///
/// Returns `false` when called outside a runtime; the future is dropped.
pub fn spawn_detached<F>(future: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
            true
        }
        Err(_) => {
            tracing::warn!("No tokio runtime available, background work skipped");
            false
        }
    }
}

pub struct ScheduledTask {
    name: &'static str,
    is_running: Arc<AtomicBool>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl ScheduledTask {
    /// Runs `callback` a single time after `delay`.
    pub fn once(name: &'static str, delay: Duration, callback: TaskCallback) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let is_running = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&is_running);

        let spawned = spawn_detached(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!("Scheduled task {} cancelled", name);
                }
                _ = tokio::time::sleep(delay) => {
                    if running.load(Ordering::SeqCst) {
                        callback().await;
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        if spawned {
            tracing::debug!("Scheduled task {} armed: single run in {:?}", name, delay);
        } else {
            is_running.store(false, Ordering::SeqCst);
        }

        Self {
            name,
            is_running,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Runs `callback` after `first_delay`, then every `period`.
    pub fn repeating(
        name: &'static str,
        first_delay: Duration,
        period: Duration,
        callback: TaskCallback,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let is_running = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&is_running);
        let period = period.max(Duration::from_millis(1));

        let spawned = spawn_detached(async move {
            let mut ticker = interval_at(Instant::now() + first_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Scheduled task {} cancelled", name);
                        break;
                    }
                    _ = ticker.tick() => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        callback().await;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
        });

        if spawned {
            tracing::debug!(
                "Scheduled task {} armed: first run in {:?}, then every {:?}",
                name,
                first_delay,
                period
            );
        } else {
            is_running.store(false, Ordering::SeqCst);
        }

        Self {
            name,
            is_running,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Stops the task. A callback already running is allowed to finish.
    pub fn cancel(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        // Dropping the sender wakes the select loop.
        if self.shutdown_tx.take().is_some() {
            tracing::debug!("Cancelling scheduled task {}", self.name);
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
