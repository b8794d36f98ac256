use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ErrorType, Result, SuprSendError};

/// Arbitrary JSON properties attached to events and user updates.
pub type Properties = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub message: String,
}

impl ResponseError {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }
}

/// Structured result of every public SDK call.
///
/// The SDK never returns `Err` across its public boundary; failures are
/// carried in `error` with `status == Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl<T> ApiResponse<T> {
    pub fn success(body: Option<T>) -> Self {
        Self {
            status: ResponseStatus::Success,
            status_code: None,
            body,
            error: None,
        }
    }

    pub fn success_with_status(status_code: u16, body: Option<T>) -> Self {
        Self {
            status: ResponseStatus::Success,
            status_code: Some(status_code),
            body,
            error: None,
        }
    }

    pub fn error(error: ResponseError, status_code: Option<u16>) -> Self {
        Self {
            status: ResponseStatus::Error,
            status_code,
            body: None,
            error: Some(error),
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::error(ResponseError::new(ErrorType::Validation, message), None)
    }

    pub fn from_error(error: SuprSendError) -> Self {
        Self::error(
            ResponseError::new(error.kind, error.message),
            error.status_code,
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        self.error.as_ref().map(|e| e.error_type)
    }

    /// Converts the body type, keeping status and error untouched.
    pub fn map_body<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            status: self.status,
            status_code: self.status_code,
            body: self.body.map(f),
            error: self.error,
        }
    }

    /// Drops the body, keeping only the outcome.
    pub fn discard_body<U>(self) -> ApiResponse<U> {
        ApiResponse {
            status: self.status,
            status_code: self.status_code,
            body: None,
            error: self.error,
        }
    }
}

impl<T> From<Result<T>> for ApiResponse<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(body) => ApiResponse::success(Some(body)),
            Err(error) => ApiResponse::from_error(error),
        }
    }
}
