//! Utility modules for the SuprSend SDK.

mod logger;
pub mod validation;

pub use logger::Logger;
pub use validation::{is_reserved_key, is_valid_email, is_valid_phone};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current wall-clock time in epoch seconds.
pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
