use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error categories surfaced to callers.
///
/// `Validation` and `Network` are produced locally; the remaining variants are
/// server-reported and passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    #[serde(rename = "PERMISSION_DENIED")]
    PermissionDenied,
    #[serde(rename = "UNSUPPORTED_ACTION")]
    UnsupportedAction,
    #[serde(rename = "token_invalid")]
    TokenInvalid,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Unknown => "UNKNOWN_ERROR",
            ErrorType::Validation => "VALIDATION_ERROR",
            ErrorType::Network => "NETWORK_ERROR",
            ErrorType::PermissionDenied => "PERMISSION_DENIED",
            ErrorType::UnsupportedAction => "UNSUPPORTED_ACTION",
            ErrorType::TokenInvalid => "token_invalid",
        }
    }

    /// Parses a server-reported type string, falling back to `Unknown`.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "VALIDATION_ERROR" => ErrorType::Validation,
            "NETWORK_ERROR" => ErrorType::Network,
            "PERMISSION_DENIED" => ErrorType::PermissionDenied,
            "UNSUPPORTED_ACTION" => ErrorType::UnsupportedAction,
            "token_invalid" | "TOKEN_INVALID" => ErrorType::TokenInvalid,
            _ => ErrorType::Unknown,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ErrorType::Validation | ErrorType::Network)
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("[{kind}] {message}")]
pub struct SuprSendError {
    pub kind: ErrorType,
    pub message: String,
    pub status_code: Option<u16>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SuprSendError {
    pub fn new(kind: ErrorType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorType,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            source: Some(Box::new(source)),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Validation, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Network, message)
    }

    /// An error reported by the server alongside an HTTP status.
    pub fn server(kind: ErrorType, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: Some(status_code),
            source: None,
        }
    }

    pub fn not_identified() -> Self {
        Self::validation(
            "User isn't authenticated. Call identify method before performing any action",
        )
    }

    pub fn already_identified() -> Self {
        Self::validation("User already loggedin, reset current user to login new user")
    }

    pub fn preferences_not_fetched() -> Self {
        Self::validation("Call getPreferences method before performing action")
    }

    pub fn status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorType::Validation
    }

    pub fn is_network(&self) -> bool {
        self.kind == ErrorType::Network
    }
}

impl From<serde_json::Error> for SuprSendError {
    fn from(e: serde_json::Error) -> Self {
        Self::with_source(ErrorType::Validation, format!("Failed to encode payload: {}", e), e)
    }
}

pub type Result<T> = std::result::Result<T, SuprSendError>;
