//! Push notification hooks.
//!
//! The host app forwards its platform notification callbacks here with the
//! notification payload as a JSON map. Delivered, clicked and dismissed
//! notifications are recorded through the offline queue so they reach the
//! server even when they happen before login or while offline.

use reqwest::Url;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Context;
use crate::events::{OfflineEventQueue, OfflineQueueItem};
use crate::types::ApiResponse;
use crate::user::User;

/// Payload of a platform notification (`userInfo`).
pub type NotificationPayload = HashMap<String, Value>;

pub const VIA_SUPRSEND_KEY: &str = "via_suprsend";
pub const NOTIFICATION_ID_KEY: &str = "nid";
pub const GLOBAL_ACTION_URL_KEY: &str = "global_action_url";

pub const NOTIFICATION_DELIVERED_EVENT: &str = "$notification_delivered";
pub const NOTIFICATION_CLICKED_EVENT: &str = "$notification_clicked";
pub const NOTIFICATION_DISMISSED_EVENT: &str = "$notification_dismiss";

pub struct Push {
    ctx: Arc<Context>,
    user: Arc<User>,
    queue: Arc<OfflineEventQueue>,
}

impl Push {
    pub(crate) fn new(ctx: Arc<Context>, user: Arc<User>, queue: Arc<OfflineEventQueue>) -> Self {
        Self { ctx, user, queue }
    }

    pub fn is_suprsend_notification(&self, payload: &NotificationPayload) -> bool {
        payload.contains_key(VIA_SUPRSEND_KEY)
    }

    /// The device token last registered with `add_ios_push`.
    pub fn push_subscription(&self) -> Option<String> {
        self.ctx.device_token.read().clone()
    }

    /// Re-registers the known device token for the current user. Succeeds
    /// without a request when no token is known.
    pub async fn update_push_subscription(&self) -> ApiResponse<()> {
        let Some(token) = self.push_subscription() else {
            return ApiResponse::success(None);
        };
        let response = self.user.add_ios_push(&token).await;
        self.warn_on_error("register", &response);
        response
    }

    pub async fn remove_push_subscription(&self) -> ApiResponse<()> {
        let Some(token) = self.push_subscription() else {
            return ApiResponse::success(None);
        };
        let response = self.user.remove_ios_push(&token).await;
        self.warn_on_error("unregister", &response);
        response
    }

    fn warn_on_error(&self, action: &str, response: &ApiResponse<()>) {
        if let Some(error) = &response.error {
            self.ctx.logger.warn(format!(
                "[SuprSend]: Couldn't {} push token: {}",
                action, error.message
            ));
        }
    }

    /// Notification service extension received a notification.
    pub fn did_receive(&self, payload: &NotificationPayload) {
        self.track(NOTIFICATION_DELIVERED_EVENT, payload);
    }

    /// Notification is about to be shown while the app is in the foreground.
    pub fn will_present(&self, payload: &NotificationPayload) {
        self.track(NOTIFICATION_DELIVERED_EVENT, payload);
    }

    /// Remote notification delivered to the app.
    pub fn did_receive_remote_notification(&self, payload: &NotificationPayload) {
        self.track(NOTIFICATION_DELIVERED_EVENT, payload);
    }

    /// The user acted on a notification. Returns the notification's global
    /// action URL, if it carries a valid one, for the host to open.
    pub fn did_receive_response(&self, payload: &NotificationPayload, dismissed: bool) -> Option<String> {
        let event = if dismissed {
            NOTIFICATION_DISMISSED_EVENT
        } else {
            NOTIFICATION_CLICKED_EVENT
        };
        self.track(event, payload);

        if dismissed {
            return None;
        }
        payload
            .get(GLOBAL_ACTION_URL_KEY)
            .and_then(Value::as_str)
            .filter(|url| Url::parse(url).is_ok())
            .map(str::to_string)
    }

    /// Connectivity came back; retry pending telemetry.
    pub fn on_connectivity_restored(&self) {
        self.queue.schedule_flush();
    }

    pub fn pending_events(&self) -> Vec<OfflineQueueItem> {
        self.queue.items()
    }

    fn track(&self, event: &str, payload: &NotificationPayload) {
        if !self.is_suprsend_notification(payload) {
            return;
        }
        let Some(nid) = payload.get(NOTIFICATION_ID_KEY).and_then(Value::as_str) else {
            return;
        };
        tracing::debug!("Recording {} for notification {}", event, nid);
        self.queue.push(OfflineQueueItem::new(event, nid));
    }
}
