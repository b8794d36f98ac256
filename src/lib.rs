//! SuprSend Rust SDK
//!
//! Client SDK for the SuprSend notification platform: identify users, track
//! events, manage user channels and notification preferences, and read the
//! in-app inbox feed.
//!
//! # Quick Start
//!
//! ```no_run
//! use suprsend::{PreferenceOption, SuprSendClient, SuprSendOptions};
//!
//! #[tokio::main]
//! async fn main() -> suprsend::Result<()> {
//!     let options = SuprSendOptions::builder("your_public_key")
//!         .logging_enabled(true)
//!         .build();
//!     let client = SuprSendClient::new(options)?;
//!
//!     // Log the user in
//!     let response = client
//!         .identify("user-123", Some("signed.jwt.token".to_string()), None)
//!         .await;
//!     assert!(response.is_success());
//!
//!     // Channels and events
//!     client.user().add_email("user@example.com").await;
//!     client.track("product_viewed", None).await;
//!
//!     // Preferences
//!     client.preferences().get_preferences(None).await;
//!     client
//!         .preferences()
//!         .update_category_preference("newsletter", PreferenceOption::OptOut, None);
//!
//!     // Inbox
//!     let feed = client.feeds().initialize(None)?;
//!     feed.fetch(None).await;
//!
//!     client.reset(true).await;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod error;
pub mod events;
pub mod feed;
pub mod http;
pub mod preferences;
pub mod push;
pub mod session;
pub mod storage;
pub mod types;
pub mod user;
pub mod utils;

mod client;
mod context;

pub use client::SuprSendClient;

pub use crate::core::{SuprSendOptions, SuprSendOptionsBuilder};
pub use error::{ErrorType, Result, SuprSendError};
pub use events::{OfflineQueueItem, SDK_VERSION};
pub use feed::{
    Feed, FeedData, FeedEvent, FeedOptions, FeedStatus, FeedsFactory, FetchOptions, Notification,
    Store,
};
pub use preferences::{
    ChannelLevelPreference, KeepOptimistic, PreferenceArgs, PreferenceData, PreferenceEvent,
    PreferenceOption, Preferences, RestorePrevious, RollbackPolicy,
};
pub use push::{NotificationPayload, Push};
pub use session::AuthenticateOptions;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use types::{ApiResponse, Properties, ResponseError, ResponseStatus};
pub use user::User;
