//! User property and channel updates.
//!
//! Each method wraps one operation (`$set`, `$append`, ...) into a user
//! property event. Channel methods validate their input first and never
//! reach the network when it is malformed.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Context;
use crate::error::SuprSendError;
use crate::events::{EventPipeline, PropertyOperation};
use crate::types::{ApiResponse, Properties};
use crate::utils::validation;

pub const PUSH_VENDOR: &str = "apns";

/// Channel keys understood by the backend.
pub mod channel {
    pub const IOS_PUSH: &str = "$iospush";
    pub const PUSH_VENDOR: &str = "$pushvendor";
    pub const DEVICE_ID: &str = "$device_id";
    pub const EMAIL: &str = "$email";
    pub const SMS: &str = "$sms";
    pub const WHATSAPP: &str = "$whatsapp";
    pub const SLACK: &str = "$slack";
    pub const MS_TEAMS: &str = "$ms_teams";
    pub const PREFERRED_LANGUAGE: &str = "$preferred_language";
    pub const TIMEZONE: &str = "$timezone";
}

const INVALID_EMAIL: &str = "provided email is invalid";
const INVALID_MOBILE: &str = "provided mobile number is invalid, must be as per E.164 standard";

pub struct User {
    ctx: Arc<Context>,
    pipeline: Arc<EventPipeline>,
}

impl User {
    pub(crate) fn new(ctx: Arc<Context>, pipeline: Arc<EventPipeline>) -> Self {
        Self { ctx, pipeline }
    }

    async fn trigger(&self, operation: PropertyOperation, payload: Value) -> ApiResponse<()> {
        let mut operations = Map::new();
        operations.insert(operation.as_str().to_string(), payload);
        self.pipeline.trigger_user_event(operations).await
    }

    async fn trigger_properties(
        &self,
        operation: PropertyOperation,
        properties: Properties,
    ) -> ApiResponse<()> {
        let validated = validation::validate_properties(properties, &self.ctx.logger);
        self.trigger(operation, Value::Object(validated.into_iter().collect()))
            .await
    }

    async fn trigger_channel(
        &self,
        operation: PropertyOperation,
        fields: Vec<(&str, Value)>,
    ) -> ApiResponse<()> {
        let payload: Map<String, Value> = fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        self.trigger(operation, Value::Object(payload)).await
    }

    // Properties

    pub async fn set(&self, properties: Properties) -> ApiResponse<()> {
        self.trigger_properties(PropertyOperation::Set, properties)
            .await
    }

    pub async fn set_key(&self, key: impl Into<String>, value: impl Into<Value>) -> ApiResponse<()> {
        self.set(single(key, value)).await
    }

    pub async fn set_once(&self, properties: Properties) -> ApiResponse<()> {
        self.trigger_properties(PropertyOperation::SetOnce, properties)
            .await
    }

    pub async fn set_once_key(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> ApiResponse<()> {
        self.set_once(single(key, value)).await
    }

    /// Adds each amount to the numeric property of the same key.
    pub async fn increment(&self, properties: HashMap<String, f64>) -> ApiResponse<()> {
        let properties = properties
            .into_iter()
            .map(|(key, amount)| (key, Value::from(amount)))
            .collect();
        self.trigger_properties(PropertyOperation::Add, properties)
            .await
    }

    pub async fn increment_key(&self, key: impl Into<String>, amount: f64) -> ApiResponse<()> {
        let mut properties = HashMap::new();
        properties.insert(key.into(), amount);
        self.increment(properties).await
    }

    pub async fn append(&self, properties: Properties) -> ApiResponse<()> {
        self.trigger_properties(PropertyOperation::Append, properties)
            .await
    }

    pub async fn append_key(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> ApiResponse<()> {
        self.append(single(key, value)).await
    }

    pub async fn remove(&self, properties: Properties) -> ApiResponse<()> {
        self.trigger_properties(PropertyOperation::Remove, properties)
            .await
    }

    pub async fn remove_key(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> ApiResponse<()> {
        self.remove(single(key, value)).await
    }

    pub async fn unset(&self, keys: Vec<String>) -> ApiResponse<()> {
        let keys = validation::validate_keys(keys, &self.ctx.logger);
        self.trigger(
            PropertyOperation::Unset,
            Value::Array(keys.into_iter().map(Value::String).collect()),
        )
        .await
    }

    pub async fn unset_key(&self, key: impl Into<String>) -> ApiResponse<()> {
        self.unset(vec![key.into()]).await
    }

    // Channels

    /// Registers an APNs token for this device.
    pub async fn add_ios_push(&self, token: &str) -> ApiResponse<()> {
        *self.ctx.device_token.write() = Some(token.to_string());
        self.trigger_channel(PropertyOperation::Append, self.push_fields(token))
            .await
    }

    pub async fn remove_ios_push(&self, token: &str) -> ApiResponse<()> {
        self.trigger_channel(PropertyOperation::Remove, self.push_fields(token))
            .await
    }

    fn push_fields(&self, token: &str) -> Vec<(&'static str, Value)> {
        vec![
            (channel::IOS_PUSH, Value::String(token.to_string())),
            (channel::DEVICE_ID, Value::String(self.ctx.device_id())),
            (channel::PUSH_VENDOR, Value::String(PUSH_VENDOR.to_string())),
        ]
    }

    pub async fn add_email(&self, email: &str) -> ApiResponse<()> {
        self.email_update(PropertyOperation::Append, email).await
    }

    pub async fn remove_email(&self, email: &str) -> ApiResponse<()> {
        self.email_update(PropertyOperation::Remove, email).await
    }

    async fn email_update(&self, operation: PropertyOperation, email: &str) -> ApiResponse<()> {
        if !validation::is_valid_email(email) {
            return ApiResponse::from_error(SuprSendError::validation(INVALID_EMAIL));
        }
        self.trigger_channel(operation, vec![(channel::EMAIL, Value::from(email))])
            .await
    }

    pub async fn add_sms(&self, mobile: &str) -> ApiResponse<()> {
        self.phone_update(PropertyOperation::Append, channel::SMS, mobile)
            .await
    }

    pub async fn remove_sms(&self, mobile: &str) -> ApiResponse<()> {
        self.phone_update(PropertyOperation::Remove, channel::SMS, mobile)
            .await
    }

    pub async fn add_whatsapp(&self, mobile: &str) -> ApiResponse<()> {
        self.phone_update(PropertyOperation::Append, channel::WHATSAPP, mobile)
            .await
    }

    pub async fn remove_whatsapp(&self, mobile: &str) -> ApiResponse<()> {
        self.phone_update(PropertyOperation::Remove, channel::WHATSAPP, mobile)
            .await
    }

    async fn phone_update(
        &self,
        operation: PropertyOperation,
        key: &'static str,
        mobile: &str,
    ) -> ApiResponse<()> {
        if !validation::is_valid_phone(mobile) {
            return ApiResponse::from_error(SuprSendError::validation(INVALID_MOBILE));
        }
        self.trigger_channel(operation, vec![(key, Value::from(mobile))])
            .await
    }

    /// Slack identity, e.g. `{"email": ..., "access_token": ...}`.
    pub async fn add_slack(&self, data: Value) -> ApiResponse<()> {
        self.trigger_channel(PropertyOperation::Append, vec![(channel::SLACK, data)])
            .await
    }

    pub async fn remove_slack(&self, data: Value) -> ApiResponse<()> {
        self.trigger_channel(PropertyOperation::Remove, vec![(channel::SLACK, data)])
            .await
    }

    pub async fn add_ms_teams(&self, data: Value) -> ApiResponse<()> {
        self.trigger_channel(PropertyOperation::Append, vec![(channel::MS_TEAMS, data)])
            .await
    }

    pub async fn remove_ms_teams(&self, data: Value) -> ApiResponse<()> {
        self.trigger_channel(PropertyOperation::Remove, vec![(channel::MS_TEAMS, data)])
            .await
    }

    pub async fn set_preferred_language(&self, language: &str) -> ApiResponse<()> {
        self.trigger_channel(
            PropertyOperation::Set,
            vec![(channel::PREFERRED_LANGUAGE, Value::from(language))],
        )
        .await
    }

    pub async fn set_timezone(&self, timezone: &str) -> ApiResponse<()> {
        self.trigger_channel(
            PropertyOperation::Set,
            vec![(channel::TIMEZONE, Value::from(timezone))],
        )
        .await
    }
}

fn single(key: impl Into<String>, value: impl Into<Value>) -> Properties {
    let mut properties = Properties::new();
    properties.insert(key.into(), value.into());
    properties
}
