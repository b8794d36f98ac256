use super::model::Store;
use crate::utils::Logger;

pub const DEFAULT_FEED_API_HOST: &str = "https://inboxs.live";
pub const DEFAULT_TENANT_ID: &str = "default";
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_STORE_ID: &str = "$suprsend_default_store";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedHost {
    pub api_host: Option<String>,
    /// Kept for parity with other SDKs; realtime updates are not supported.
    pub socket_host: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedOptions {
    pub tenant_id: Option<String>,
    pub page_size: Option<u32>,
    pub stores: Option<Vec<Store>>,
    pub host: Option<FeedHost>,
}

impl FeedOptions {
    pub fn builder() -> FeedOptionsBuilder {
        FeedOptionsBuilder::default()
    }
}

#[derive(Default)]
pub struct FeedOptionsBuilder {
    options: FeedOptions,
}

impl FeedOptionsBuilder {
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.options.tenant_id = Some(tenant_id.into());
        self
    }

    /// Values outside `1..=100` are ignored.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.options.page_size = Some(page_size);
        self
    }

    pub fn stores(mut self, stores: Vec<Store>) -> Self {
        self.options.stores = Some(stores);
        self
    }

    pub fn api_host(mut self, api_host: impl Into<String>) -> Self {
        self.options
            .host
            .get_or_insert_with(FeedHost::default)
            .api_host = Some(api_host.into());
        self
    }

    pub fn socket_host(mut self, socket_host: impl Into<String>) -> Self {
        self.options
            .host
            .get_or_insert_with(FeedHost::default)
            .socket_host = Some(socket_host.into());
        self
    }

    pub fn build(self) -> FeedOptions {
        self.options
    }
}

/// Options with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedFeedOptions {
    pub tenant_id: String,
    pub page_size: u32,
    pub stores: Option<Vec<Store>>,
    pub api_host: String,
}

impl ResolvedFeedOptions {
    pub fn resolve(options: Option<FeedOptions>, logger: &Logger) -> Self {
        let options = options.unwrap_or_default();

        let page_size = match options.page_size {
            Some(size) if (1..=MAX_PAGE_SIZE).contains(&size) => size,
            Some(size) => {
                logger.warn(format!(
                    "SuprSend: page_size {} out of range, using {}",
                    size, DEFAULT_PAGE_SIZE
                ));
                DEFAULT_PAGE_SIZE
            }
            None => DEFAULT_PAGE_SIZE,
        };

        let api_host = options
            .host
            .and_then(|host| host.api_host)
            .unwrap_or_else(|| DEFAULT_FEED_API_HOST.to_string());

        Self {
            tenant_id: options
                .tenant_id
                .unwrap_or_else(|| DEFAULT_TENANT_ID.to_string()),
            page_size,
            stores: options.stores.map(|stores| validate_stores(stores, logger)),
            api_host,
        }
    }

    /// Store shown before anything else is selected.
    pub fn initial_store(&self) -> Store {
        self.stores
            .as_ref()
            .and_then(|stores| stores.first().cloned())
            .unwrap_or_else(|| Store::new(DEFAULT_STORE_ID, ""))
    }
}

/// Drops stores without an id; an empty label defaults to the id.
fn validate_stores(stores: Vec<Store>, logger: &Logger) -> Vec<Store> {
    stores
        .into_iter()
        .filter_map(|store| {
            if store.store_id.trim().is_empty() {
                logger.warn("SuprSend: storeId is mandatory for each store. Ignoring store without storeId");
                return None;
            }
            let label = if store.label.is_empty() {
                store.store_id.clone()
            } else {
                store.label
            };
            Some(Store { label, ..store })
        })
        .collect()
}
