//! Subscriber notification preferences.
//!
//! Updates are applied to the local tree first and return the new snapshot
//! immediately. The network sync goes through a per-target debouncer so a
//! burst of changes to one category (or one channel) sends a single request
//! carrying the latest state. After a successful sync the full tree is
//! refetched and broadcast as [`PreferenceEvent::Updated`]; a failed sync
//! broadcasts [`PreferenceEvent::Error`] and consults the [`RollbackPolicy`].

mod model;
pub mod mutation;

pub use model::{
    Category, CategoryChannel, CategoryPayload, ChannelLevelPreference, ChannelPayload,
    ChannelPreference, PreferenceData, PreferenceOption, Section,
};

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

use self::mutation::Mutation;
use crate::context::Context;
use crate::core::{Emitter, FlushHandler, KeyedDebouncer};
use crate::error::{Result, SuprSendError};
use crate::http::Method;
use crate::types::ApiResponse;

/// Query arguments for preference reads and category updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceArgs {
    pub tenant_id: Option<String>,
    pub show_opt_out_channels: bool,
}

impl Default for PreferenceArgs {
    fn default() -> Self {
        Self {
            tenant_id: None,
            show_opt_out_channels: true,
        }
    }
}

impl PreferenceArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn show_opt_out_channels(mut self, show: bool) -> Self {
        self.show_opt_out_channels = show;
        self
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(2);
        if let Some(tenant_id) = &self.tenant_id {
            query.push(("tenant_id", tenant_id.clone()));
        }
        query.push(("show_opt_out_channels", self.show_opt_out_channels.to_string()));
        query
    }
}

/// Arguments for listing categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryArgs {
    pub tenant_id: Option<String>,
    pub show_opt_out_channels: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Default for CategoryArgs {
    fn default() -> Self {
        Self {
            tenant_id: None,
            show_opt_out_channels: true,
            limit: None,
            offset: None,
        }
    }
}

impl CategoryArgs {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = PreferenceArgs {
            tenant_id: self.tenant_id.clone(),
            show_opt_out_channels: self.show_opt_out_channels,
        }
        .query();
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            query.push(("offset", offset.to_string()));
        }
        query
    }
}

/// Independent sync streams. Updates for different keys never coalesce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncKey {
    Category(String),
    Channel(String),
}

pub enum SyncPayload {
    Category {
        body: CategoryPayload,
        args: Option<PreferenceArgs>,
    },
    Channel(ChannelPayload),
}

#[derive(Debug, Clone)]
pub enum PreferenceEvent {
    /// Fresh tree fetched after a successful sync.
    Updated(ApiResponse<PreferenceData>),
    /// A sync request failed.
    Error(ApiResponse<PreferenceData>),
}

/// Decides what the local tree looks like after a sync for `key` failed.
///
/// `before` is the tree as it was before the first unsynced change to `key`;
/// `current` is the optimistic tree.
pub trait RollbackPolicy: Send + Sync {
    fn resolve(&self, key: &SyncKey, before: &PreferenceData, current: &PreferenceData)
        -> PreferenceData;
}

/// Leaves the optimistic state in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepOptimistic;

impl RollbackPolicy for KeepOptimistic {
    fn resolve(&self, _key: &SyncKey, _before: &PreferenceData, current: &PreferenceData) -> PreferenceData {
        current.clone()
    }
}

/// Restores the failed target from the pre-change tree, leaving other
/// targets untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct RestorePrevious;

impl RollbackPolicy for RestorePrevious {
    fn resolve(&self, key: &SyncKey, before: &PreferenceData, current: &PreferenceData) -> PreferenceData {
        match key {
            SyncKey::Category(category) => mutation::restore_category(current, before, category),
            SyncKey::Channel(channel) => mutation::restore_channel(current, before, channel),
        }
    }
}

#[derive(Default)]
struct PreferenceState {
    data: Option<PreferenceData>,
    args: Option<PreferenceArgs>,
    /// Tree before the first unsynced change, per key.
    rollback_base: HashMap<SyncKey, PreferenceData>,
}

struct PreferencesInner {
    ctx: Arc<Context>,
    state: RwLock<PreferenceState>,
    emitter: Emitter<PreferenceEvent>,
    rollback: RwLock<Arc<dyn RollbackPolicy>>,
}

pub struct Preferences {
    inner: Arc<PreferencesInner>,
    debouncer: KeyedDebouncer<SyncKey, SyncPayload>,
}

impl Preferences {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        let window = ctx.options.preference_debounce;
        let inner = Arc::new(PreferencesInner {
            ctx,
            state: RwLock::new(PreferenceState::default()),
            emitter: Emitter::default(),
            rollback: RwLock::new(Arc::new(KeepOptimistic)),
        });

        let weak: Weak<PreferencesInner> = Arc::downgrade(&inner);
        let handler: FlushHandler<SyncKey, SyncPayload> = Arc::new(move |key, payload| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.sync(key, payload).await;
                }
            })
        });

        Self {
            inner,
            debouncer: KeyedDebouncer::new(window, handler),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreferenceEvent> {
        self.inner.emitter.subscribe()
    }

    /// Current local tree, if fetched.
    pub fn data(&self) -> Option<PreferenceData> {
        self.inner.state.read().data.clone()
    }

    pub fn set_rollback_policy(&self, policy: Arc<dyn RollbackPolicy>) {
        *self.inner.rollback.write() = policy;
    }

    /// Number of updates waiting for their debounce window to close.
    pub fn pending_syncs(&self) -> usize {
        self.debouncer.pending_count()
    }

    /// Fetches the full tree, replacing the local copy on success. `args`
    /// are remembered for the refetch that follows every sync.
    pub async fn get_preferences(&self, args: Option<PreferenceArgs>) -> ApiResponse<PreferenceData> {
        self.inner.state.write().args = args.clone();
        self.inner.fetch(args.as_ref()).await
    }

    pub async fn get_categories(&self, args: Option<CategoryArgs>) -> ApiResponse<Value> {
        let query = args.unwrap_or_default().query();
        self.inner.get(&["category"], &query).await
    }

    pub async fn get_category(&self, category: &str, args: Option<PreferenceArgs>) -> ApiResponse<Value> {
        let query = args.unwrap_or_default().query();
        self.inner.get(&["category", category], &query).await
    }

    pub async fn get_overall_channel_preferences(&self) -> ApiResponse<Value> {
        self.inner.get(&["channel_preference"], &[]).await
    }

    pub fn update_category_preference(
        &self,
        category: &str,
        preference: PreferenceOption,
        args: Option<PreferenceArgs>,
    ) -> ApiResponse<PreferenceData> {
        let mut state = self.inner.state.write();
        let Some(data) = state.data.as_ref() else {
            return ApiResponse::from_error(SuprSendError::preferences_not_fetched());
        };
        let show_opt_out_channels = state
            .args
            .as_ref()
            .map_or(true, |a| a.show_opt_out_channels);

        let outcome = mutation::update_category(data, category, preference, show_opt_out_channels);
        let (tree, body) = match outcome {
            Err(e) => return ApiResponse::from_error(e),
            Ok(Mutation::Unchanged) => return ApiResponse::success(state.data.clone()),
            Ok(Mutation::Updated { tree, payload }) => (tree, payload),
        };

        let key = SyncKey::Category(category.to_string());
        Self::commit(&mut state, &key, tree.clone());
        drop(state);

        self.debouncer
            .submit(key, SyncPayload::Category { body, args });
        ApiResponse::success(Some(tree))
    }

    /// Opting the channel in also opts its category in.
    pub fn update_channel_preference_in_category(
        &self,
        channel: &str,
        preference: PreferenceOption,
        category: &str,
        args: Option<PreferenceArgs>,
    ) -> ApiResponse<PreferenceData> {
        let mut state = self.inner.state.write();
        let Some(data) = state.data.as_ref() else {
            return ApiResponse::from_error(SuprSendError::preferences_not_fetched());
        };

        let outcome = mutation::update_channel_in_category(data, channel, preference, category);
        let (tree, body) = match outcome {
            Err(e) => return ApiResponse::from_error(e),
            Ok(Mutation::Unchanged) => return ApiResponse::success(state.data.clone()),
            Ok(Mutation::Updated { tree, payload }) => (tree, payload),
        };

        let key = SyncKey::Category(category.to_string());
        Self::commit(&mut state, &key, tree.clone());
        drop(state);

        self.debouncer
            .submit(key, SyncPayload::Category { body, args });
        ApiResponse::success(Some(tree))
    }

    pub fn update_overall_channel_preference(
        &self,
        channel: &str,
        preference: ChannelLevelPreference,
    ) -> ApiResponse<PreferenceData> {
        let mut state = self.inner.state.write();
        let Some(data) = state.data.as_ref() else {
            return ApiResponse::from_error(SuprSendError::preferences_not_fetched());
        };

        let (tree, body) = match mutation::update_overall_channel(data, channel, preference) {
            Err(e) => return ApiResponse::from_error(e),
            Ok(Mutation::Unchanged) => return ApiResponse::success(state.data.clone()),
            Ok(Mutation::Updated { tree, payload }) => (tree, payload),
        };

        let key = SyncKey::Channel(channel.to_string());
        Self::commit(&mut state, &key, tree.clone());
        drop(state);

        self.debouncer.submit(key, SyncPayload::Channel(body));
        ApiResponse::success(Some(tree))
    }

    /// Drops the local tree, the cached arguments and any unsent updates.
    pub fn clear(&self) {
        self.debouncer.cancel_all();
        *self.inner.state.write() = PreferenceState::default();
        tracing::debug!("Preferences cleared");
    }

    fn commit(state: &mut PreferenceState, key: &SyncKey, tree: PreferenceData) {
        if let Some(previous) = state.data.replace(tree) {
            state
                .rollback_base
                .entry(key.clone())
                .or_insert(previous);
        }
    }
}

impl PreferencesInner {
    fn subscriber_url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<reqwest::Url> {
        let distinct_id = self.ctx.session.distinct_id().unwrap_or_default();
        let mut path = vec!["v2", "subscriber", distinct_id.as_str()];
        path.extend_from_slice(segments);
        self.ctx.http.host_url(&path, query)
    }

    async fn get(&self, segments: &[&str], query: &[(&str, String)]) -> ApiResponse<Value> {
        match self.subscriber_url(segments, query) {
            Ok(url) => self.ctx.http.request(Method::Get, url, None).await,
            Err(e) => ApiResponse::from_error(e),
        }
    }

    async fn fetch(&self, args: Option<&PreferenceArgs>) -> ApiResponse<PreferenceData> {
        let query = args.cloned().unwrap_or_default().query();
        let url = match self.subscriber_url(&["full_preference"], &query) {
            Ok(url) => url,
            Err(e) => return ApiResponse::from_error(e),
        };

        let response: ApiResponse<PreferenceData> =
            self.ctx.http.request(Method::Get, url, None).await;
        if response.is_success() {
            if let Some(body) = &response.body {
                self.state.write().data = Some(body.clone());
            }
        }
        response
    }

    async fn sync(&self, key: SyncKey, payload: SyncPayload) {
        tracing::debug!("Syncing preference {:?}", key);
        let before = self.state.write().rollback_base.remove(&key);

        let request = match (&key, &payload) {
            (SyncKey::Category(category), SyncPayload::Category { body, args }) => {
                let query = args.clone().unwrap_or_default().query();
                self.subscriber_url(&["category", category], &query)
                    .and_then(|url| Ok((url, serde_json::to_value(body)?)))
            }
            (SyncKey::Channel(_), SyncPayload::Channel(body)) => self
                .subscriber_url(&["channel_preference"], &[])
                .and_then(|url| Ok((url, serde_json::to_value(body)?))),
            _ => Err(SuprSendError::validation(format!(
                "Mismatched preference sync for {:?}",
                key
            ))),
        };

        let response: ApiResponse<PreferenceData> = match request {
            Ok((url, body)) => self
                .ctx
                .http
                .request_empty(Method::Patch, url, Some(body))
                .await
                .discard_body(),
            Err(e) => ApiResponse::from_error(e),
        };

        if response.is_error() {
            self.roll_back(&key, before);
            self.emitter.emit(PreferenceEvent::Error(response));
            return;
        }

        let args = self.state.read().args.clone();
        let refreshed = self.fetch(args.as_ref()).await;
        self.emitter.emit(PreferenceEvent::Updated(refreshed));
    }

    fn roll_back(&self, key: &SyncKey, before: Option<PreferenceData>) {
        let Some(before) = before else {
            return;
        };
        let policy = Arc::clone(&*self.rollback.read());
        let mut state = self.state.write();
        if let Some(current) = state.data.as_ref() {
            let resolved = policy.resolve(key, &before, current);
            state.data = Some(resolved);
        }
    }
}
