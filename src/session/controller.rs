use std::sync::Arc;

use super::AuthenticateOptions;
use crate::context::Context;
use crate::error::SuprSendError;
use crate::events::EventPipeline;
use crate::push::Push;
use crate::storage::AUTHENTICATED_DISTINCT_ID_KEY;
use crate::types::ApiResponse;

/// Owns the identify / reset lifecycle.
///
/// Calls are serialized so two concurrent `identify` calls can't both take
/// the first-login path.
pub struct SessionController {
    ctx: Arc<Context>,
    pipeline: Arc<EventPipeline>,
    push: Arc<Push>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl SessionController {
    pub(crate) fn new(ctx: Arc<Context>, pipeline: Arc<EventPipeline>, push: Arc<Push>) -> Self {
        Self {
            ctx,
            pipeline,
            push,
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn identify(
        &self,
        distinct_id: &str,
        user_token: Option<String>,
        options: Option<AuthenticateOptions>,
    ) -> ApiResponse<()> {
        let _guard = self.lifecycle.lock().await;
        let refresh_callback = options.and_then(|o| o.refresh_user_token);
        let session = self.ctx.session.snapshot();

        if let Some(current) = session.distinct_id {
            if current != distinct_id {
                return ApiResponse::from_error(SuprSendError::already_identified());
            }
            if session.user_token != user_token {
                tracing::debug!("Updating user token for {}", distinct_id);
                self.ctx.session.update_token(user_token, refresh_callback);
            }
            return ApiResponse::success(None);
        }

        self.ctx
            .session
            .begin(distinct_id, user_token, refresh_callback);

        let authenticated = self.ctx.storage_get(AUTHENTICATED_DISTINCT_ID_KEY);
        if authenticated.as_deref() == Some(distinct_id) {
            tracing::debug!("{} already authenticated on this device", distinct_id);
            self.push.update_push_subscription().await;
            return ApiResponse::success(None);
        }

        let response = self.pipeline.send_identify(distinct_id).await;
        if response.is_success() {
            self.ctx
                .storage_set(AUTHENTICATED_DISTINCT_ID_KEY, distinct_id);
            self.push.update_push_subscription().await;
        } else {
            self.ctx
                .logger
                .warn(format!("[SuprSend]: identify failed for {}", distinct_id));
            self.clear(false).await;
        }
        response
    }

    /// Ends the session. Always succeeds.
    pub async fn reset(&self, unsubscribe_push: bool) -> ApiResponse<()> {
        let _guard = self.lifecycle.lock().await;
        self.clear(unsubscribe_push).await;
        ApiResponse::success(None)
    }

    async fn clear(&self, unsubscribe_push: bool) {
        if unsubscribe_push && self.ctx.session.is_identified() {
            self.push.remove_push_subscription().await;
        }
        self.ctx.session.clear();
        self.ctx.storage_remove(AUTHENTICATED_DISTINCT_ID_KEY);
        tracing::debug!("Session cleared");
    }
}
