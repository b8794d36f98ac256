//! Durable FIFO for push telemetry (delivered, clicked, dismissed).
//!
//! Items survive restarts under [`PUSH_QUEUE_KEY`]. A drain pops items from
//! the front and sends each through the public event path; an item that
//! fails goes back on the tail. Items being sent are persisted too, so an
//! item leaves storage only after the server accepted it.
//!
//! Every drain request takes a ticket. A pass covers all tickets issued
//! before it started, so requests that pile up while items are in flight
//! share one pass instead of retrying what that pass just requeued.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::EventPipeline;
use crate::context::Context;
use crate::core::spawn_detached;
use crate::storage::PUSH_QUEUE_KEY;
use crate::types::Properties;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineQueueItem {
    pub event: String,
    pub nid: String,
}

impl OfflineQueueItem {
    pub fn new(event: impl Into<String>, nid: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            nid: nid.into(),
        }
    }
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<OfflineQueueItem>,
    in_flight: Vec<OfflineQueueItem>,
}

pub struct OfflineEventQueue {
    ctx: Arc<Context>,
    pipeline: Arc<EventPipeline>,
    state: Mutex<QueueState>,
    drain_lock: tokio::sync::Mutex<()>,
    requested: AtomicU64,
    covered: AtomicU64,
}

impl OfflineEventQueue {
    /// Loads persisted items and starts a drain in the background.
    pub(crate) fn new(ctx: Arc<Context>, pipeline: Arc<EventPipeline>) -> Arc<Self> {
        let items = Self::load(&ctx);
        if !items.is_empty() {
            tracing::debug!("Offline queue restored {} items", items.len());
        }

        let queue = Arc::new(Self {
            ctx,
            pipeline,
            state: Mutex::new(QueueState {
                items,
                in_flight: Vec::new(),
            }),
            drain_lock: tokio::sync::Mutex::new(()),
            requested: AtomicU64::new(0),
            covered: AtomicU64::new(0),
        });
        queue.schedule_flush();
        queue
    }

    fn load(ctx: &Context) -> VecDeque<OfflineQueueItem> {
        let Some(raw) = ctx.storage_get(PUSH_QUEUE_KEY) else {
            return VecDeque::new();
        };
        match serde_json::from_str::<Vec<OfflineQueueItem>>(&raw) {
            Ok(items) => items.into(),
            Err(e) => {
                tracing::warn!("Discarding unreadable offline queue: {}", e);
                VecDeque::new()
            }
        }
    }

    fn persist(&self, state: &QueueState) {
        let all: Vec<&OfflineQueueItem> = state.items.iter().chain(state.in_flight.iter()).collect();
        match serde_json::to_string(&all) {
            Ok(raw) => self.ctx.storage_set(PUSH_QUEUE_KEY, &raw),
            Err(e) => tracing::warn!("Failed to encode offline queue: {}", e),
        }
    }

    /// Appends an item and triggers a drain.
    pub fn push(self: &Arc<Self>, item: OfflineQueueItem) {
        {
            let mut state = self.state.lock();
            state.items.push_back(item);
            self.persist(&state);
        }
        self.schedule_flush();
    }

    /// Number of items not yet confirmed by the server.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.items.len() + state.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn items(&self) -> Vec<OfflineQueueItem> {
        let state = self.state.lock();
        state.items.iter().chain(state.in_flight.iter()).cloned().collect()
    }

    pub(crate) fn schedule_flush(self: &Arc<Self>) {
        let ticket = self.request_drain();
        let queue = Arc::clone(self);
        spawn_detached(async move {
            queue.drain_until(ticket).await;
        });
    }

    /// Drains the queue once. Concurrent callers fold into the running
    /// drain, which makes one more pass for them.
    pub async fn flush(&self) {
        let ticket = self.request_drain();
        self.drain_until(ticket).await;
    }

    fn request_drain(&self) -> u64 {
        self.requested.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Latest ticket no pass has started for yet.
    fn uncovered(&self) -> Option<u64> {
        let requested = self.requested.load(Ordering::SeqCst);
        (requested > self.covered.load(Ordering::SeqCst)).then_some(requested)
    }

    async fn drain_until(&self, ticket: u64) {
        if self.covered.load(Ordering::SeqCst) >= ticket {
            return;
        }

        loop {
            let Ok(guard) = self.drain_lock.try_lock() else {
                return;
            };
            while let Some(target) = self.uncovered() {
                self.covered.store(target, Ordering::SeqCst);
                self.drain_pass().await;
            }
            drop(guard);

            // A ticket may have been issued between the last check and the unlock.
            if self.uncovered().is_none() {
                return;
            }
        }
    }

    async fn drain_pass(&self) {
        let pending = self.state.lock().items.len();
        if pending == 0 {
            return;
        }
        tracing::debug!("Draining {} offline events", pending);

        for _ in 0..pending {
            let Some(item) = self.pop() else {
                break;
            };

            let mut properties = Properties::new();
            properties.insert("id".to_string(), serde_json::Value::String(item.nid.clone()));
            let response = self.pipeline.track_public(&item.event, Some(properties)).await;

            let mut state = self.state.lock();
            if let Some(index) = state.in_flight.iter().position(|i| *i == item) {
                state.in_flight.remove(index);
            }
            if response.is_error() {
                tracing::debug!("Offline event {} for {} failed, requeued", item.event, item.nid);
                state.items.push_back(item);
            }
            self.persist(&state);
        }
    }

    fn pop(&self) -> Option<OfflineQueueItem> {
        let mut state = self.state.lock();
        let item = state.items.pop_front()?;
        state.in_flight.push(item.clone());
        self.persist(&state);
        Some(item)
    }
}
