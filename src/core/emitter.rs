//! Single-writer, multi-subscriber event bus.

use tokio::sync::broadcast;

pub const DEFAULT_EMITTER_CAPACITY: usize = 64;

/// Broadcasts state changes to any number of subscribers.
///
/// Emitting with no subscribers is not an error; slow subscribers that fall
/// more than the channel capacity behind see `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct Emitter<E: Clone> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> Emitter<E> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: E) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for Emitter<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EMITTER_CAPACITY)
    }
}
