//! Shared state handed to every component of one client instance.

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::core::SuprSendOptions;
use crate::error::Result;
use crate::http::{HttpClient, Transport};
use crate::session::SessionState;
use crate::storage::{KeyValueStore, DEVICE_ID_KEY};
use crate::utils::Logger;

pub(crate) struct Context {
    pub options: SuprSendOptions,
    pub logger: Arc<Logger>,
    pub storage: Arc<dyn KeyValueStore>,
    pub session: Arc<SessionState>,
    pub http: HttpClient,
    /// Last push token registered through `add_ios_push`.
    pub device_token: RwLock<Option<String>>,
    device_id: OnceCell<String>,
}

impl Context {
    pub fn new(
        options: SuprSendOptions,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Arc<Self>> {
        let logger = Arc::new(Logger::new(options.logging_enabled));
        let session = SessionState::new(options.token_refresh_lead, Arc::clone(&logger));
        let http = HttpClient::new(
            transport,
            options.public_key.clone(),
            &options.host,
            Arc::clone(&session),
            Arc::clone(&logger),
        )?;

        Ok(Arc::new(Self {
            options,
            logger,
            storage,
            session,
            http,
            device_token: RwLock::new(None),
            device_id: OnceCell::new(),
        }))
    }

    /// Stable per-install id, generated on first use.
    pub fn device_id(&self) -> String {
        self.device_id
            .get_or_init(|| {
                if let Some(existing) = self.storage_get(DEVICE_ID_KEY) {
                    return existing;
                }
                let generated = uuid::Uuid::new_v4().to_string();
                self.storage_set(DEVICE_ID_KEY, &generated);
                generated
            })
            .clone()
    }

    /// Storage read that logs and swallows failures.
    pub fn storage_get(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read {} from storage: {}", key, e);
                None
            }
        }
    }

    pub fn storage_set(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            tracing::warn!("Failed to write {} to storage: {}", key, e);
        }
    }

    pub fn storage_remove(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            tracing::warn!("Failed to remove {} from storage: {}", key, e);
        }
    }
}
