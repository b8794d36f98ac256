//! Input checks shared by event tracking and user property updates.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Properties;
use crate::utils::Logger;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+@\S+\.\S+").unwrap());

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").unwrap());

const VENDOR_PREFIX: &str = "ss_";

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

/// E.164 style: leading `+`, non-zero first digit, 2 to 15 digits.
pub fn is_valid_phone(value: &str) -> bool {
    PHONE_PATTERN.is_match(value)
}

/// Keys starting with `$` or `ss_` (any case) belong to the SDK.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with('$') || key.to_lowercase().starts_with(VENDOR_PREFIX)
}

/// Drops reserved keys, warning through the logger for each one removed.
pub fn validate_properties(properties: Properties, logger: &Logger) -> Properties {
    properties
        .into_iter()
        .filter(|(key, _)| {
            if is_reserved_key(key) {
                logger.warn(format!(
                    "key cannot start with $ or ss_, dropping property {}",
                    key
                ));
                false
            } else {
                true
            }
        })
        .collect()
}

pub fn validate_keys(keys: Vec<String>, logger: &Logger) -> Vec<String> {
    keys.into_iter()
        .filter(|key| {
            if is_reserved_key(key) {
                logger.warn(format!("key cannot start with $ or ss_, dropping key {}", key));
                false
            } else {
                true
            }
        })
        .collect()
}
