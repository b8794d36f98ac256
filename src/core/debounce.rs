//! Keyed latest-wins coalescing of outgoing sync payloads.
//!
//! The first payload submitted for a key opens a window. Payloads submitted
//! for the same key before the window closes replace the pending one without
//! extending the window. When the window closes the flush handler receives
//! the latest payload, exactly once. Keys are independent of each other.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::scheduler::spawn_detached;

/// Handler invoked with the key and its latest payload when a window closes.
pub type FlushHandler<K, P> =
    Arc<dyn Fn(K, P) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Pending<P> {
    payload: P,
    epoch: u64,
}

struct DebounceState<K, P> {
    pending: HashMap<K, Pending<P>>,
    epoch: u64,
}

pub struct KeyedDebouncer<K, P> {
    window: Duration,
    state: Arc<Mutex<DebounceState<K, P>>>,
    handler: FlushHandler<K, P>,
}

impl<K, P> KeyedDebouncer<K, P>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
    P: Send + 'static,
{
    pub fn new(window: Duration, handler: FlushHandler<K, P>) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(DebounceState {
                pending: HashMap::new(),
                epoch: 0,
            })),
            handler,
        }
    }

    pub fn submit(&self, key: K, payload: P) {
        let epoch = {
            let mut state = self.state.lock();
            if let Some(pending) = state.pending.get_mut(&key) {
                pending.payload = payload;
                tracing::debug!("Debounce: replaced pending payload for {:?}", key);
                return;
            }
            let epoch = state.epoch;
            state
                .pending
                .insert(key.clone(), Pending { payload, epoch });
            epoch
        };

        let state = Arc::clone(&self.state);
        let handler = Arc::clone(&self.handler);
        let window = self.window;
        let timer_key = key.clone();

        let spawned = spawn_detached(async move {
            tokio::time::sleep(window).await;

            let payload = {
                let mut state = state.lock();
                match state.pending.get(&timer_key) {
                    Some(pending) if pending.epoch == epoch => {
                        state.pending.remove(&timer_key).map(|p| p.payload)
                    }
                    _ => None,
                }
            };

            if let Some(payload) = payload {
                tracing::debug!("Debounce: flushing {:?}", timer_key);
                handler(timer_key, payload).await;
            }
        });

        if !spawned {
            self.state.lock().pending.remove(&key);
        }
    }

    /// Drops every pending payload. Timers already armed become no-ops.
    pub fn cancel_all(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.epoch += 1;
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}
