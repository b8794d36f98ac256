use parking_lot::Mutex;
use std::sync::Arc;

use super::{Feed, FeedOptions, FeedRegistry};
use crate::context::Context;
use crate::error::Result;

/// Creates feeds and keeps track of the live ones for bulk teardown.
pub struct FeedsFactory {
    ctx: Arc<Context>,
    instances: Arc<FeedRegistry>,
}

impl FeedsFactory {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            instances: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates a new, independent feed. Fails only when the API host is not
    /// a valid URL.
    pub fn initialize(&self, options: Option<FeedOptions>) -> Result<Feed> {
        let feed = Feed::new(
            Arc::clone(&self.ctx),
            options,
            Arc::downgrade(&self.instances),
        )?;
        self.instances.lock().push(feed.clone());
        tracing::debug!("Feed initialized, {} live", self.len());
        Ok(feed)
    }

    /// Stops tracking `feed` without touching its state.
    pub fn remove_instance(&self, feed: &Feed) {
        self.instances
            .lock()
            .retain(|existing| !existing.same_instance(feed));
    }

    /// Resets and detaches every live feed.
    pub fn remove_all(&self) {
        let feeds = std::mem::take(&mut *self.instances.lock());
        for feed in feeds {
            feed.remove();
        }
    }

    pub fn instances(&self) -> Vec<Feed> {
        self.instances.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.lock().is_empty()
    }
}
