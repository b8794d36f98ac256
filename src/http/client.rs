use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use super::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::error::{ErrorType, Result, SuprSendError};
use crate::session::SessionState;
use crate::types::ApiResponse;
use crate::utils::Logger;

pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_SIGNATURE: &str = "x-ss-signature";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
const APPLICATION_JSON: &str = "application/json";

/// Parses `host` as a base URL, making sure joined paths append to it.
pub fn parse_base_url(host: &str) -> Result<Url> {
    let normalized = if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{}/", host)
    };
    Url::parse(&normalized).map_err(|e| {
        SuprSendError::with_source(ErrorType::Validation, format!("Invalid host: {}", host), e)
    })
}

/// Appends escaped path segments and query pairs to `base`.
pub fn build_url(base: &Url, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| SuprSendError::validation(format!("Can't create a URL for {}", base)))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Request gateway shared by every component.
///
/// Applies the SDK headers, gates per-user calls on an identified session,
/// refreshes an expired token once before an authenticated call, and turns
/// raw responses into [`ApiResponse`] values.
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    public_key: String,
    host: Url,
    session: Arc<SessionState>,
    logger: Arc<Logger>,
}

impl HttpClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        public_key: impl Into<String>,
        host: &str,
        session: Arc<SessionState>,
        logger: Arc<Logger>,
    ) -> Result<Self> {
        Ok(Self {
            transport,
            public_key: public_key.into(),
            host: parse_base_url(host)?,
            session,
            logger,
        })
    }

    pub fn host(&self) -> &Url {
        &self.host
    }

    /// URL on the main host.
    pub fn host_url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        build_url(&self.host, segments, query)
    }

    /// Authenticated call decoding the body as `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> ApiResponse<T> {
        if let Err(e) = self.authorize().await {
            return ApiResponse::from_error(e);
        }
        self.execute(method, url, body, true).await.into_api_response()
    }

    /// Authenticated call whose success body is ignored.
    pub async fn request_empty(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> ApiResponse<()> {
        if let Err(e) = self.authorize().await {
            return ApiResponse::from_error(e);
        }
        self.execute::<Value>(method, url, body, false)
            .await
            .into_api_response()
            .discard_body()
    }

    /// Unauthenticated call whose success body is ignored.
    pub async fn public_request_empty(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> ApiResponse<()> {
        self.execute::<Value>(method, url, body, false)
            .await
            .into_api_response()
            .discard_body()
    }

    async fn authorize(&self) -> Result<()> {
        if !self.session.is_identified() {
            return Err(SuprSendError::not_identified());
        }
        if self.session.user_token().is_none() {
            return Err(SuprSendError::validation("User token is missing"));
        }
        self.session.refresh_if_expired().await;
        Ok(())
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            (HEADER_CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string()),
            (HEADER_AUTHORIZATION.to_string(), self.public_key.clone()),
        ];
        if let Some(token) = self.session.user_token() {
            headers.push((HEADER_SIGNATURE.to_string(), token));
        }
        headers
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        decode: bool,
    ) -> Outcome<T> {
        let request = HttpRequest {
            method,
            url,
            headers: self.headers(),
            body,
        };
        tracing::debug!("{} {}", request.method, request.url);

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                self.logger
                    .error(format!("Error while calling API: {}", e));
                return Outcome::Failed(e);
            }
        };

        self.handle_response(response, decode)
    }

    fn handle_response<T: DeserializeOwned>(&self, response: HttpResponse, decode: bool) -> Outcome<T> {
        let status = response.status;

        if response.body.is_empty() {
            self.logger.info(format!("SuprSend: {}", status));
        } else {
            self.logger
                .info(format!("SuprSend: {} {}", status, response.body));
        }

        if !response.is_success() {
            let error = status_to_error(status, &response.body);
            self.logger.error(&error.message);
            return Outcome::Failed(error);
        }

        if !decode || response.body.trim().is_empty() {
            return Outcome::Success(status, None);
        }

        match serde_json::from_str::<T>(&response.body) {
            Ok(body) => Outcome::Success(status, Some(body)),
            Err(e) => {
                let error = SuprSendError::with_source(
                    ErrorType::Network,
                    format!("Failed to parse response: {}", e),
                    e,
                )
                .status_code(status);
                self.logger.error(&error.message);
                Outcome::Failed(error)
            }
        }
    }
}

enum Outcome<T> {
    Success(u16, Option<T>),
    Failed(SuprSendError),
}

impl<T> Outcome<T> {
    fn into_api_response(self) -> ApiResponse<T> {
        match self {
            Outcome::Success(status, body) => ApiResponse::success_with_status(status, body),
            Outcome::Failed(error) => ApiResponse::from_error(error),
        }
    }
}

/// Builds an error from a non-2xx response, keeping the server's type and
/// message when the body carries them.
pub fn status_to_error(status: u16, body: &str) -> SuprSendError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let object = parsed.as_ref().map(|value| match value.get("error") {
        Some(inner) if inner.is_object() => inner,
        _ => value,
    });

    let kind = object
        .and_then(|o| o.get("type"))
        .and_then(Value::as_str)
        .map(ErrorType::from_wire)
        .unwrap_or(ErrorType::Unknown);

    let message = object
        .and_then(|o| o.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("Request failed with status {}", status)
            } else {
                body.to_string()
            }
        });

    SuprSendError::server(kind, message, status)
}
