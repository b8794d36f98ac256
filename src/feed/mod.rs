//! Inbox feeds.
//!
//! Each [`Feed`] owns one paginated notification list. Fetches are
//! single-flight per feed, item updates are applied locally before the
//! request goes out, and a background sweep drops notifications whose
//! expiry has passed. Every state change is broadcast as
//! [`FeedEvent::StoreUpdate`].

mod factory;
mod model;
mod options;

pub use factory::FeedsFactory;
pub use model::{
    Action, Avatar, FeedCount, FeedData, FeedEvent, FeedMeta, FeedPage, FeedStatus, Notification,
    NotificationMessage, PageInfo, Store, StoreQuery, SubText, BADGE_META_KEY,
};
pub use options::{
    FeedHost, FeedOptions, FeedOptionsBuilder, DEFAULT_FEED_API_HOST, DEFAULT_PAGE_SIZE,
    DEFAULT_STORE_ID, DEFAULT_TENANT_ID, MAX_PAGE_SIZE,
};

use parking_lot::{Mutex, RwLock};
use reqwest::Url;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

use self::options::ResolvedFeedOptions;
use crate::context::Context;
use crate::core::{spawn_detached, Emitter, ScheduledTask, TaskCallback};
use crate::error::{Result, SuprSendError};
use crate::http::{build_url, parse_base_url, Method};
use crate::types::ApiResponse;
use crate::utils::now_millis;

pub(crate) type FeedRegistry = Mutex<Vec<Feed>>;

/// Per-call overrides for [`Feed::fetch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub page_size: Option<u32>,
}

struct FeedState {
    notifications: Vec<Notification>,
    store: Store,
    page_info: PageInfo,
    meta: HashMap<String, String>,
    api_status: FeedStatus,
    is_first_fetch: bool,
    /// Ids archived through this feed since the last reset.
    archived: HashSet<String>,
    /// Bumped on reset so responses to older requests are dropped.
    generation: u64,
}

impl FeedState {
    fn initial(store: Store, page_size: u32, generation: u64) -> Self {
        let mut meta = HashMap::new();
        meta.insert(BADGE_META_KEY.to_string(), "0".to_string());

        Self {
            notifications: Vec::new(),
            store,
            page_info: PageInfo {
                total: 0,
                has_more: false,
                page_size,
            },
            meta,
            api_status: FeedStatus::Initial,
            is_first_fetch: true,
            archived: HashSet::new(),
            generation,
        }
    }

    fn snapshot(&self) -> FeedData {
        FeedData {
            notifications: self.notifications.clone(),
            store: self.store.clone(),
            page_info: self.page_info,
            meta: self.meta.clone(),
            api_status: self.api_status,
        }
    }
}

struct FeedInner {
    ctx: Arc<Context>,
    options: ResolvedFeedOptions,
    api_host: Url,
    state: RwLock<FeedState>,
    expiry_task: Mutex<Option<ScheduledTask>>,
    emitter: Emitter<FeedEvent>,
    registry: Weak<FeedRegistry>,
}

/// Handle to one inbox feed. Clones share the same feed.
#[derive(Clone)]
pub struct Feed {
    inner: Arc<FeedInner>,
}

impl Feed {
    pub(crate) fn new(
        ctx: Arc<Context>,
        options: Option<FeedOptions>,
        registry: Weak<FeedRegistry>,
    ) -> Result<Self> {
        let options = ResolvedFeedOptions::resolve(options, &ctx.logger);
        let api_host = parse_base_url(&options.api_host)?;
        let state = FeedState::initial(options.initial_store(), options.page_size, 0);

        Ok(Self {
            inner: Arc::new(FeedInner {
                ctx,
                options,
                api_host,
                state: RwLock::new(state),
                expiry_task: Mutex::new(None),
                emitter: Emitter::default(),
                registry,
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.emitter.subscribe()
    }

    pub fn data(&self) -> FeedData {
        self.inner.state.read().snapshot()
    }

    pub fn same_instance(&self, other: &Feed) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn has_expiry_sweep(&self) -> bool {
        self.inner
            .expiry_task
            .lock()
            .as_ref()
            .map_or(false, ScheduledTask::is_active)
    }

    fn emit_update(&self) {
        self.inner.emitter.emit(FeedEvent::StoreUpdate(self.data()));
    }

    fn url(&self, segments: &[&str], extra: Vec<(&'static str, String)>) -> Result<Url> {
        let mut path = vec!["v1", "feed"];
        path.extend_from_slice(segments);

        let mut query = vec![
            (
                "distinct_id",
                self.inner.ctx.session.distinct_id().unwrap_or_default(),
            ),
            ("tenant_id", self.inner.options.tenant_id.clone()),
        ];
        query.extend(extra);
        build_url(&self.inner.api_host, &path, &query)
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        extra: Vec<(&'static str, String)>,
    ) -> ApiResponse<T> {
        match self.url(segments, extra) {
            Ok(url) => self.inner.ctx.http.request(Method::Get, url, None).await,
            Err(e) => ApiResponse::from_error(e),
        }
    }

    async fn patch(&self, segments: &[&str], body: Option<Value>) -> ApiResponse<()> {
        match self.url(segments, Vec::new()) {
            Ok(url) => {
                self.inner
                    .ctx
                    .http
                    .request_empty(Method::Patch, url, body)
                    .await
            }
            Err(e) => ApiResponse::from_error(e),
        }
    }

    /// Fetches the unread badge count into `meta`.
    pub async fn fetch_count(&self) -> ApiResponse<FeedCount> {
        let generation = self.inner.state.read().generation;

        let mut extra = Vec::new();
        if let Some(stores) = &self.inner.options.stores {
            let params: Vec<Store> = stores.iter().map(Store::to_query_param).collect();
            match serde_json::to_string(&params) {
                Ok(encoded) => extra.push(("stores", encoded)),
                Err(e) => self
                    .inner
                    .ctx
                    .logger
                    .warn(format!("SuprSend: failed to encode stores: {}", e)),
            }
        }

        let response: ApiResponse<FeedCount> = self.get(&["notifications_count"], extra).await;
        if response.is_success() {
            let badge = response
                .body
                .as_ref()
                .and_then(|count| count.badge)
                .unwrap_or(0);
            {
                let mut state = self.inner.state.write();
                if state.generation != generation {
                    return response;
                }
                state
                    .meta
                    .insert(BADGE_META_KEY.to_string(), badge.to_string());
            }
            self.emit_update();
        }
        response
    }

    /// Fetches the next page after the last known notification. The first
    /// fetch replaces the list and also refreshes the badge count.
    pub async fn fetch(&self, options: Option<FetchOptions>) -> ApiResponse<FeedPage> {
        let (generation, is_first, store, cursor) = {
            let mut state = self.inner.state.write();
            if state.api_status.is_in_flight() {
                return ApiResponse::from_error(SuprSendError::validation("Already fetching data"));
            }
            state.api_status = if state.is_first_fetch {
                FeedStatus::Loading
            } else {
                FeedStatus::FetchingMore
            };
            let cursor = match state.notifications.last() {
                Some(last) => json!([last.is_pinned, last.created_on]),
                None => json!([]),
            };
            (
                state.generation,
                state.is_first_fetch,
                state.store.clone(),
                cursor,
            )
        };
        self.emit_update();

        if is_first {
            let feed = self.clone();
            spawn_detached(async move {
                feed.fetch_count().await;
            });
        }

        let page_size = options
            .and_then(|o| o.page_size)
            .filter(|size| (1..=MAX_PAGE_SIZE).contains(size))
            .unwrap_or(self.inner.options.page_size);

        let mut extra = vec![
            ("page_size", page_size.to_string()),
            ("search_after", cursor.to_string()),
        ];
        if store.store_id != DEFAULT_STORE_ID {
            match serde_json::to_string(&store.to_query_param()) {
                Ok(encoded) => extra.push(("store", encoded)),
                Err(e) => self
                    .inner
                    .ctx
                    .logger
                    .warn(format!("SuprSend: failed to encode store: {}", e)),
            }
        }

        let response: ApiResponse<FeedPage> = self.get(&["notifications"], extra).await;

        {
            let mut state = self.inner.state.write();
            if state.generation != generation {
                tracing::debug!("Feed was reset while fetching, dropping page");
                return response;
            }

            if response.is_error() {
                state.api_status = FeedStatus::Error;
            } else {
                let page = response.body.clone().unwrap_or_default();
                let meta = page.meta.unwrap_or_default();
                if is_first {
                    state.notifications = page.results;
                } else {
                    state.notifications.extend(page.results);
                }
                state.page_info = PageInfo {
                    total: meta.total_count.unwrap_or(0),
                    has_more: meta.has_more(),
                    page_size: state.page_info.page_size,
                };
                state.api_status = FeedStatus::Success;
                state.is_first_fetch = false;
            }
        }
        self.emit_update();

        if response.is_success() {
            self.start_expiry_sweep();
        }
        response
    }

    pub async fn fetch_next_page(&self) -> ApiResponse<FeedPage> {
        if !self.inner.state.read().page_info.has_more {
            return ApiResponse::from_error(SuprSendError::validation("No more pages to fetch"));
        }
        self.fetch(None).await
    }

    pub async fn fetch_details(&self, notification_id: &str) -> ApiResponse<Value> {
        self.get(&["notifications", notification_id], Vec::new())
            .await
    }

    /// Applies `update` to the notification with `id`, if loaded.
    ///
    /// Returns whether the server still needs to hear about it: `false` only
    /// when the notification is loaded and `update` found nothing to change.
    fn update_notification(&self, id: &str, update: impl FnOnce(&mut Notification) -> bool) -> bool {
        let changed = {
            let mut state = self.inner.state.write();
            match state.notifications.iter_mut().find(|n| n.id == id) {
                Some(notification) => update(notification),
                None => return true,
            }
        };
        if changed {
            self.emit_update();
        }
        changed
    }

    pub async fn mark_as_seen(&self, notification_id: &str) -> ApiResponse<()> {
        let now = now_millis();
        let needs_sync = self.update_notification(notification_id, |n| {
            if n.seen_on.is_some() {
                return false;
            }
            n.seen_on = Some(now);
            true
        });
        if !needs_sync {
            return ApiResponse::success(None);
        }
        self.patch(&["notifications", notification_id, "seen"], None)
            .await
    }

    pub async fn mark_as_read(&self, notification_id: &str) -> ApiResponse<()> {
        let now = now_millis();
        let needs_sync = self.update_notification(notification_id, |n| {
            if n.read_on.is_some() {
                return false;
            }
            n.read_on = Some(now);
            true
        });
        if !needs_sync {
            return ApiResponse::success(None);
        }
        self.patch(&["notifications", notification_id, "read"], None)
            .await
    }

    pub async fn mark_as_unread(&self, notification_id: &str) -> ApiResponse<()> {
        let needs_sync = self.update_notification(notification_id, |n| n.read_on.take().is_some());
        if !needs_sync {
            return ApiResponse::success(None);
        }
        self.patch(&["notifications", notification_id, "unread"], None)
            .await
    }

    /// Interacting also marks the notification read. Always reported, since
    /// a notification can be interacted with more than once.
    pub async fn mark_as_interacted(&self, notification_id: &str) -> ApiResponse<()> {
        let now = now_millis();
        self.update_notification(notification_id, |n| {
            let mut changed = false;
            if n.interacted_on.is_none() {
                n.interacted_on = Some(now);
                changed = true;
            }
            if n.read_on.is_none() {
                n.read_on = Some(now);
                changed = true;
            }
            changed
        });
        self.patch(&["notifications", notification_id, "interacted"], None)
            .await
    }

    /// Removes the notification from the list. Repeating the call for the
    /// same id is a local no-op.
    pub async fn mark_as_archived(&self, notification_id: &str) -> ApiResponse<()> {
        let removed = {
            let mut state = self.inner.state.write();
            if !state.archived.insert(notification_id.to_string()) {
                return ApiResponse::success(None);
            }
            let before = state.notifications.len();
            state.notifications.retain(|n| n.id != notification_id);
            before != state.notifications.len()
        };
        if removed {
            self.emit_update();
        }

        let response = self
            .patch(&["notifications", notification_id, "archive"], None)
            .await;
        if response.is_error() {
            // Allow a retry; the list itself is not restored.
            self.inner.state.write().archived.remove(notification_id);
        }
        response
    }

    pub async fn mark_bulk_as_seen(&self, notification_ids: &[String]) -> ApiResponse<()> {
        if notification_ids.is_empty() {
            return ApiResponse::success(None);
        }

        let now = now_millis();
        let changed = {
            let mut state = self.inner.state.write();
            let mut changed = false;
            for notification in state.notifications.iter_mut() {
                if notification.seen_on.is_none() && notification_ids.contains(&notification.id) {
                    notification.seen_on = Some(now);
                    changed = true;
                }
            }
            changed
        };
        if changed {
            self.emit_update();
        }

        self.patch(
            &["bulk", "notifications", "seen"],
            Some(json!({ "notification_ids": notification_ids })),
        )
        .await
    }

    pub async fn mark_all_as_read(&self) -> ApiResponse<()> {
        let now = now_millis();
        {
            let mut state = self.inner.state.write();
            state
                .meta
                .insert(BADGE_META_KEY.to_string(), "0".to_string());
            for notification in state.notifications.iter_mut() {
                if notification.read_on.is_none() {
                    notification.read_on = Some(now);
                }
            }
        }
        self.emit_update();
        self.patch(&["mark_all_read"], None).await
    }

    pub async fn reset_badge_count(&self) -> ApiResponse<()> {
        self.inner
            .state
            .write()
            .meta
            .insert(BADGE_META_KEY.to_string(), "0".to_string());
        self.emit_update();
        self.patch(&["reset_bell_count"], None).await
    }

    fn start_expiry_sweep(&self) {
        let mut task = self.inner.expiry_task.lock();
        if task.as_ref().map_or(false, ScheduledTask::is_active) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let callback: TaskCallback = Arc::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    Feed { inner }.remove_expired().await;
                }
            })
        });
        let interval = self.inner.ctx.options.feed_expiry_sweep_interval;
        *task = Some(ScheduledTask::repeating(
            "feed-expiry-sweep",
            interval,
            interval,
            callback,
        ));
    }

    /// Drops expired notifications and refreshes the badge if any were
    /// dropped. Returns how many were removed.
    pub async fn remove_expired(&self) -> usize {
        let now = now_millis();
        let removed = {
            let mut state = self.inner.state.write();
            let before = state.notifications.len();
            state.notifications.retain(|n| !n.is_expired(now));
            before - state.notifications.len()
        };

        if removed > 0 {
            tracing::debug!("Removed {} expired notifications", removed);
            self.emit_update();
            self.fetch_count().await;
        }
        removed
    }

    /// Back to the initial empty state; stops the expiry sweep.
    pub fn reset(&self) {
        {
            let mut state = self.inner.state.write();
            let generation = state.generation + 1;
            *state = FeedState::initial(
                self.inner.options.initial_store(),
                self.inner.options.page_size,
                generation,
            );
        }
        if let Some(mut task) = self.inner.expiry_task.lock().take() {
            task.cancel();
        }
        self.emit_update();
    }

    /// Resets the feed and detaches it from its factory.
    pub fn remove(&self) {
        self.reset();
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.lock().retain(|feed| !feed.same_instance(self));
        }
    }
}
