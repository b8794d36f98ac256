mod config;
pub mod debounce;
mod emitter;
pub mod scheduler;

pub use config::{
    SuprSendOptions, SuprSendOptionsBuilder, DEFAULT_FEED_EXPIRY_SWEEP_INTERVAL, DEFAULT_HOST,
    DEFAULT_PREFERENCE_DEBOUNCE, DEFAULT_TIMEOUT, DEFAULT_TOKEN_REFRESH_LEAD,
};
pub use debounce::{FlushHandler, KeyedDebouncer};
pub use emitter::{Emitter, DEFAULT_EMITTER_CAPACITY};
pub use scheduler::{spawn_detached, ScheduledTask, TaskCallback};
