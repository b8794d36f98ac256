use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SuprSendError};

pub const DEFAULT_HOST: &str = "https://hub.suprsend.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TOKEN_REFRESH_LEAD: Duration = Duration::from_secs(30);
pub const DEFAULT_PREFERENCE_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_FEED_EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SuprSendOptions {
    pub public_key: String,
    pub host: String,
    pub timeout: Duration,
    pub logging_enabled: bool,
    /// Directory for durable state. `None` keeps everything in memory.
    pub storage_path: Option<PathBuf>,
    /// How long before JWT expiry the refresh callback fires.
    pub token_refresh_lead: Duration,
    pub preference_debounce: Duration,
    pub feed_expiry_sweep_interval: Duration,
}

impl SuprSendOptions {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            host: DEFAULT_HOST.to_string(),
            timeout: DEFAULT_TIMEOUT,
            logging_enabled: false,
            storage_path: None,
            token_refresh_lead: DEFAULT_TOKEN_REFRESH_LEAD,
            preference_debounce: DEFAULT_PREFERENCE_DEBOUNCE,
            feed_expiry_sweep_interval: DEFAULT_FEED_EXPIRY_SWEEP_INTERVAL,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.public_key.trim().is_empty() {
            return Err(SuprSendError::validation("Public key is required"));
        }

        if reqwest::Url::parse(&self.host).is_err() {
            return Err(SuprSendError::validation(format!(
                "Invalid host URL: {}",
                self.host
            )));
        }

        if self.timeout.is_zero() {
            return Err(SuprSendError::validation("Timeout must be positive"));
        }

        if self.token_refresh_lead.is_zero() {
            return Err(SuprSendError::validation("Token refresh lead must be positive"));
        }

        if self.preference_debounce.is_zero() {
            return Err(SuprSendError::validation(
                "Preference debounce window must be positive",
            ));
        }

        if self.feed_expiry_sweep_interval.is_zero() {
            return Err(SuprSendError::validation(
                "Feed expiry sweep interval must be positive",
            ));
        }

        Ok(())
    }

    pub fn builder(public_key: impl Into<String>) -> SuprSendOptionsBuilder {
        SuprSendOptionsBuilder::new(public_key)
    }
}

pub struct SuprSendOptionsBuilder {
    options: SuprSendOptions,
}

impl SuprSendOptionsBuilder {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            options: SuprSendOptions::new(public_key),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.options.host = host.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn logging_enabled(mut self, enabled: bool) -> Self {
        self.options.logging_enabled = enabled;
        self
    }

    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.storage_path = Some(path.into());
        self
    }

    pub fn token_refresh_lead(mut self, lead: Duration) -> Self {
        self.options.token_refresh_lead = lead;
        self
    }

    pub fn preference_debounce(mut self, window: Duration) -> Self {
        self.options.preference_debounce = window;
        self
    }

    pub fn feed_expiry_sweep_interval(mut self, interval: Duration) -> Self {
        self.options.feed_expiry_sweep_interval = interval;
        self
    }

    pub fn build(self) -> SuprSendOptions {
        self.options
    }
}
