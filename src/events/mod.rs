//! Event construction and delivery.
//!
//! Every outgoing event, whether a tracked action or a user property
//! mutation, shares one envelope: a fresh `$insert_id`, a `$time` stamp in
//! epoch milliseconds and the current `distinct_id`.

mod offline_queue;

pub use offline_queue::{OfflineEventQueue, OfflineQueueItem};

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::context::Context;
use crate::error::{ErrorType, SuprSendError};
use crate::http::Method;
use crate::types::{ApiResponse, Properties};
use crate::utils::{now_millis, validation};

pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SDK_TYPE: &str = "Rust";
pub const IDENTIFY_EVENT: &str = "$identify";

const EVENT_PATH: [&str; 2] = ["v2", "event"];

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub event: String,
    #[serde(rename = "$insert_id")]
    pub insert_id: String,
    #[serde(rename = "$time")]
    pub time: i64,
    pub distinct_id: String,
    pub properties: Properties,
}

impl Event {
    pub fn new(event: impl Into<String>, distinct_id: impl Into<String>, properties: Properties) -> Self {
        Self {
            event: event.into(),
            insert_id: uuid::Uuid::new_v4().to_string(),
            time: now_millis(),
            distinct_id: distinct_id.into(),
            properties,
        }
    }
}

/// Operation keys of a user property event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyOperation {
    Set,
    SetOnce,
    Add,
    Append,
    Remove,
    Unset,
}

impl PropertyOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyOperation::Set => "$set",
            PropertyOperation::SetOnce => "$set_once",
            PropertyOperation::Add => "$add",
            PropertyOperation::Append => "$append",
            PropertyOperation::Remove => "$remove",
            PropertyOperation::Unset => "$unset",
        }
    }
}

/// A user property mutation: the envelope with the operation map flattened
/// alongside it, e.g. `{"$insert_id": .., "$append": {"$email": ..}}`.
#[derive(Debug, Clone, Serialize)]
pub struct UserPropertyEvent {
    #[serde(rename = "$insert_id")]
    pub insert_id: String,
    #[serde(rename = "$time")]
    pub time: i64,
    pub distinct_id: String,
    #[serde(flatten)]
    pub operations: Map<String, Value>,
}

pub struct EventPipeline {
    ctx: Arc<Context>,
}

impl EventPipeline {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Tracks an event for the identified user.
    pub async fn track(&self, event: &str, properties: Option<Properties>) -> ApiResponse<()> {
        let Some(distinct_id) = self.ctx.session.distinct_id() else {
            return ApiResponse::from_error(SuprSendError::not_identified());
        };

        let payload = Event::new(event, distinct_id, self.all_properties(properties));
        self.send(&payload, true).await
    }

    /// Tracks an event without requiring identification or sending the
    /// user token. Used for push telemetry that may arrive before login.
    pub async fn track_public(&self, event: &str, properties: Option<Properties>) -> ApiResponse<()> {
        let distinct_id = self.ctx.session.distinct_id().unwrap_or_default();
        let payload = Event::new(event, distinct_id, self.all_properties(properties));
        self.send(&payload, false).await
    }

    pub(crate) async fn send_identify(&self, distinct_id: &str) -> ApiResponse<()> {
        let mut properties = Properties::new();
        properties.insert(
            "$identified_id".to_string(),
            Value::String(distinct_id.to_string()),
        );
        let payload = Event::new(IDENTIFY_EVENT, distinct_id, properties);
        self.send(&payload, true).await
    }

    /// Sends a user property mutation made of one or more operations.
    pub async fn trigger_user_event(&self, operations: Map<String, Value>) -> ApiResponse<()> {
        let Some(distinct_id) = self.ctx.session.distinct_id() else {
            return ApiResponse::from_error(SuprSendError::not_identified());
        };

        let payload = UserPropertyEvent {
            insert_id: uuid::Uuid::new_v4().to_string(),
            time: now_millis(),
            distinct_id,
            operations,
        };
        self.send(&payload, true).await
    }

    fn default_properties(&self) -> Properties {
        let mut properties = Properties::new();
        properties.insert("$os".to_string(), Value::String(std::env::consts::OS.to_string()));
        properties.insert("$sdk_type".to_string(), Value::String(SDK_TYPE.to_string()));
        properties.insert("$device_id".to_string(), Value::String(self.ctx.device_id()));
        properties.insert("$sdk_version".to_string(), Value::String(SDK_VERSION.to_string()));
        properties
    }

    /// Caller properties minus reserved keys, over the SDK defaults.
    fn all_properties(&self, properties: Option<Properties>) -> Properties {
        let mut merged = self.default_properties();
        if let Some(properties) = properties {
            merged.extend(validation::validate_properties(properties, &self.ctx.logger));
        }
        merged
    }

    async fn send<T: Serialize>(&self, payload: &T, authenticated: bool) -> ApiResponse<()> {
        let body = match serde_json::to_value(payload) {
            Ok(body) => body,
            Err(e) => {
                return ApiResponse::from_error(SuprSendError::with_source(
                    ErrorType::Validation,
                    "Failed to encode event",
                    e,
                ))
            }
        };
        let url = match self.ctx.http.host_url(&EVENT_PATH, &[]) {
            Ok(url) => url,
            Err(e) => return ApiResponse::from_error(e),
        };

        if authenticated {
            self.ctx.http.request_empty(Method::Post, url, Some(body)).await
        } else {
            self.ctx
                .http
                .public_request_empty(Method::Post, url, Some(body))
                .await
        }
    }
}
