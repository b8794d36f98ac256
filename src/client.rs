use std::sync::Arc;

use crate::context::Context;
use crate::core::SuprSendOptions;
use crate::error::Result;
use crate::events::{EventPipeline, OfflineEventQueue};
use crate::feed::FeedsFactory;
use crate::http::{ReqwestTransport, Transport};
use crate::preferences::Preferences;
use crate::push::Push;
use crate::session::{AuthenticateOptions, SessionController};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::types::{ApiResponse, Properties};
use crate::user::User;

/// One SDK instance. Instances are independent: each has its own session,
/// storage handle and background tasks.
pub struct SuprSendClient {
    ctx: Arc<Context>,
    session: SessionController,
    pipeline: Arc<EventPipeline>,
    user: Arc<User>,
    push: Arc<Push>,
    preferences: Preferences,
    feeds: FeedsFactory,
}

impl SuprSendClient {
    /// Creates a client over HTTPS, persisting state under
    /// `options.storage_path` when set.
    pub fn new(options: SuprSendOptions) -> Result<Self> {
        options.validate()?;

        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(options.timeout)?);
        let storage: Arc<dyn KeyValueStore> = match &options.storage_path {
            Some(path) => Arc::new(FileStore::new(path)?),
            None => Arc::new(MemoryStore::new()),
        };

        Self::with_transport(options, transport, storage)
    }

    /// Creates a client over a caller-supplied transport and store.
    pub fn with_transport(
        options: SuprSendOptions,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        options.validate()?;

        let ctx = Context::new(options, transport, storage)?;
        let pipeline = Arc::new(EventPipeline::new(Arc::clone(&ctx)));
        let queue = OfflineEventQueue::new(Arc::clone(&ctx), Arc::clone(&pipeline));
        let user = Arc::new(User::new(Arc::clone(&ctx), Arc::clone(&pipeline)));
        let push = Arc::new(Push::new(Arc::clone(&ctx), Arc::clone(&user), queue));
        let session = SessionController::new(
            Arc::clone(&ctx),
            Arc::clone(&pipeline),
            Arc::clone(&push),
        );
        let preferences = Preferences::new(Arc::clone(&ctx));
        let feeds = FeedsFactory::new(Arc::clone(&ctx));

        tracing::debug!("SuprSend client created for {}", ctx.options.host);

        Ok(Self {
            ctx,
            session,
            pipeline,
            user,
            push,
            preferences,
            feeds,
        })
    }

    /// Logs in `distinct_id`. See [`SessionController::identify`].
    pub async fn identify(
        &self,
        distinct_id: &str,
        user_token: Option<String>,
        options: Option<AuthenticateOptions>,
    ) -> ApiResponse<()> {
        self.session
            .identify(distinct_id, user_token, options)
            .await
    }

    /// Logs out. Local preference data is dropped and live feeds are reset.
    pub async fn reset(&self, unsubscribe_push: bool) -> ApiResponse<()> {
        let response = self.session.reset(unsubscribe_push).await;
        self.preferences.clear();
        for feed in self.feeds.instances() {
            feed.reset();
        }
        response
    }

    pub async fn track(&self, event: &str, properties: Option<Properties>) -> ApiResponse<()> {
        self.pipeline.track(event, properties).await
    }

    pub fn enable_logging(&self) {
        self.ctx.logger.enable();
    }

    pub fn distinct_id(&self) -> Option<String> {
        self.ctx.session.distinct_id()
    }

    pub fn is_identified(&self) -> bool {
        self.ctx.session.is_identified()
    }

    pub fn device_id(&self) -> String {
        self.ctx.device_id()
    }

    pub fn options(&self) -> &SuprSendOptions {
        &self.ctx.options
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn push(&self) -> &Push {
        &self.push
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn feeds(&self) -> &FeedsFactory {
        &self.feeds
    }
}
