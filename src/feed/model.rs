use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Meta key holding the unread badge count.
pub const BADGE_META_KEY: &str = "badge";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_in_new_tab: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Avatar {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default)]
    pub schema: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_in_new_tab: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Avatar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtext: Option<SubText>,
}

/// One inbox notification. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "n_id")]
    pub id: String,
    #[serde(rename = "n_category", default)]
    pub category: String,
    pub created_on: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_on: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_on: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interacted_on: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(rename = "expiry", default, skip_serializing_if = "Option::is_none")]
    pub expiry_at: Option<i64>,
    #[serde(default)]
    pub is_expiry_visible: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_user_unpin: Option<bool>,
    pub message: NotificationMessage,
}

impl Notification {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expiry_at.map_or(false, |expiry| expiry < now_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedMeta {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub current_page: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u64>,
}

impl FeedMeta {
    pub fn has_more(&self) -> bool {
        match (self.current_page, self.total_pages) {
            (Some(current), Some(total)) => current < total,
            _ => false,
        }
    }
}

/// Body of `GET /v1/feed/notifications`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub results: Vec<Notification>,
    #[serde(default)]
    pub meta: Option<FeedMeta>,
}

/// Body of `GET /v1/feed/notifications_count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedCount {
    #[serde(default)]
    pub badge: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub total: u64,
    pub has_more: bool,
    pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedStatus {
    /// Nothing requested yet, or reset.
    Initial,
    Loading,
    Success,
    Error,
    FetchingMore,
}

impl FeedStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, FeedStatus::Loading | FeedStatus::FetchingMore)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreQuery {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

/// A filtered view of the inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub store_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<StoreQuery>,
}

impl Store {
    pub fn new(store_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            label: label.into(),
            query: None,
        }
    }

    pub fn with_query(mut self, query: StoreQuery) -> Self {
        self.query = Some(query);
        self
    }

    /// Shape sent in `store`/`stores` query parameters: query always present.
    pub(crate) fn to_query_param(&self) -> Store {
        Store {
            store_id: self.store_id.clone(),
            label: self.label.clone(),
            query: Some(self.query.clone().unwrap_or_default()),
        }
    }
}

/// Snapshot of one feed, handed to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedData {
    pub notifications: Vec<Notification>,
    pub store: Store,
    pub page_info: PageInfo,
    pub meta: HashMap<String, String>,
    pub api_status: FeedStatus,
}

impl FeedData {
    pub fn badge(&self) -> u64 {
        self.meta
            .get(BADGE_META_KEY)
            .and_then(|badge| badge.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub enum FeedEvent {
    StoreUpdate(FeedData),
}
