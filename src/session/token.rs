//! JWT inspection and the refresh-token callback contract.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ErrorType, Result, SuprSendError};
use crate::utils::Logger;

const EXPIRY_CLAIM: &str = "exp";

/// Decoded JWT payload.
pub type JwtClaims = serde_json::Map<String, serde_json::Value>;

/// Produces a fresh user token from the current one and its claims.
///
/// `Ok(None)` means no new token is available; the current one stays.
pub type RefreshTokenCallback = Arc<
    dyn Fn(String, JwtClaims) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send>>
        + Send
        + Sync,
>;

/// Options accepted by `identify`.
#[derive(Clone, Default)]
pub struct AuthenticateOptions {
    pub refresh_user_token: Option<RefreshTokenCallback>,
}

impl AuthenticateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_user_token<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(String, JwtClaims) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>>> + Send + 'static,
    {
        self.refresh_user_token = Some(Arc::new(move |token, claims| {
            Box::pin(callback(token, claims))
        }));
        self
    }
}

impl std::fmt::Debug for AuthenticateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateOptions")
            .field("refresh_user_token", &self.refresh_user_token.is_some())
            .finish()
    }
}

/// Decodes the payload segment of a JWT. The signature is not verified.
pub fn decode_jwt(token: &str) -> Result<JwtClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() <= 2 {
        return Err(SuprSendError::validation("Malformed JWT"));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| {
            SuprSendError::with_source(
                ErrorType::Validation,
                "Invalid JWT payload encoding",
                e,
            )
        })?;

    match serde_json::from_slice::<serde_json::Value>(&payload) {
        Ok(serde_json::Value::Object(claims)) => Ok(claims),
        Ok(_) => Err(SuprSendError::validation("JWT payload is not an object")),
        Err(e) => Err(SuprSendError::with_source(
            ErrorType::Validation,
            "Invalid JWT payload",
            e,
        )),
    }
}

/// The `exp` claim in epoch seconds, if present and numeric.
pub fn expiry_secs(claims: &JwtClaims) -> Option<f64> {
    claims.get(EXPIRY_CLAIM).and_then(|value| value.as_f64())
}

/// A token whose `exp` cannot be read counts as expired.
pub fn is_expired(token: &str, now_secs: f64) -> bool {
    match decode_jwt(token).ok().as_ref().and_then(expiry_secs) {
        Some(exp) => exp <= now_secs,
        None => true,
    }
}

/// Delay until the refresh callback should fire, `lead` ahead of expiry.
///
/// `None` when the token is already expired.
pub fn refresh_delay(exp_secs: f64, now_millis: i64, lead: Duration) -> Option<Duration> {
    let exp_millis = (exp_secs * 1000.0) as i64;
    if exp_millis <= now_millis {
        return None;
    }

    let remaining = (exp_millis - now_millis) as u64;
    let delay = remaining.saturating_sub(lead.as_millis() as u64);
    Some(Duration::from_millis(delay))
}

/// Invokes the callback, retrying once immediately on failure.
pub async fn refresh_with_retry(
    callback: &RefreshTokenCallback,
    token: &str,
    claims: &JwtClaims,
    logger: &Logger,
) -> Option<String> {
    match callback(token.to_string(), claims.clone()).await {
        Ok(new_token) => new_token,
        Err(first) => {
            tracing::debug!("Token refresh failed, retrying once: {}", first);
            match callback(token.to_string(), claims.clone()).await {
                Ok(new_token) => new_token,
                Err(e) => {
                    logger.warn(format!("[SuprSend]: Couldn't fetch new userToken: {}", e));
                    None
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_test_jwt(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}
