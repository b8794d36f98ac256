#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use suprsend::http::{HttpRequest, HttpResponse, Method, Transport};
use suprsend::{MemoryStore, Result, SuprSendClient, SuprSendError, SuprSendOptions};

#[derive(Clone)]
pub enum Reply {
    Respond(HttpResponse),
    Delayed(Duration, HttpResponse),
    Fail(String),
}

struct Route {
    method: Method,
    path_suffix: String,
    replies: VecDeque<Reply>,
}

/// Transport that records every request and answers from canned replies.
///
/// Routes match on method and URL path suffix. Each route plays its replies
/// in order and repeats the last one. Unmatched requests get `200 {}`.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, method: Method, path_suffix: &str, reply: Reply) {
        let mut routes = self.routes.lock();
        if let Some(route) = routes
            .iter_mut()
            .find(|r| r.method == method && r.path_suffix == path_suffix)
        {
            route.replies.push_back(reply);
            return;
        }
        routes.push(Route {
            method,
            path_suffix: path_suffix.to_string(),
            replies: VecDeque::from([reply]),
        });
    }

    pub fn on(&self, method: Method, path_suffix: &str, status: u16, body: Value) {
        let body = if body.is_null() {
            String::new()
        } else {
            body.to_string()
        };
        self.reply(method, path_suffix, Reply::Respond(HttpResponse::new(status, body)));
    }

    pub fn on_delayed(&self, method: Method, path_suffix: &str, delay: Duration, body: Value) {
        self.reply(
            method,
            path_suffix,
            Reply::Delayed(delay, HttpResponse::new(200, body.to_string())),
        );
    }

    pub fn fail(&self, method: Method, path_suffix: &str, message: &str) {
        self.reply(method, path_suffix, Reply::Fail(message.to_string()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, method: Method, path_suffix: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.url.path().ends_with(path_suffix))
            .cloned()
            .collect()
    }

    pub fn count(&self, method: Method, path_suffix: &str) -> usize {
        self.requests_to(method, path_suffix).len()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn next_reply(&self, request: &HttpRequest) -> Reply {
        let mut routes = self.routes.lock();
        let route = routes
            .iter_mut()
            .filter(|r| r.method == request.method && request.url.path().ends_with(&r.path_suffix))
            .max_by_key(|r| r.path_suffix.len());

        match route {
            Some(route) if route.replies.len() > 1 => route.replies.pop_front().unwrap(),
            Some(route) => route.replies.front().cloned().unwrap(),
            None => Reply::Respond(HttpResponse::new(200, "{}")),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().push(request.clone());
        match self.next_reply(&request) {
            Reply::Respond(response) => Ok(response),
            Reply::Delayed(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Reply::Fail(message) => Err(SuprSendError::network(message)),
        }
    }
}

pub fn test_options() -> SuprSendOptions {
    SuprSendOptions::builder("pk_test")
        .host("https://hub.test")
        .build()
}

pub fn client_with(transport: Arc<MockTransport>) -> SuprSendClient {
    SuprSendClient::with_transport(test_options(), transport, Arc::new(MemoryStore::new()))
        .unwrap()
}

/// Unsigned JWT carrying `claims`.
pub fn jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}

/// JWT expiring `secs_from_now` seconds from now.
pub fn jwt_expiring_in(secs_from_now: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + secs_from_now;
    jwt(serde_json::json!({ "exp": exp, "sub": "user-1" }))
}

/// Client already identified as `user-1` with a long-lived token.
pub async fn identified_client(transport: Arc<MockTransport>) -> SuprSendClient {
    let client = client_with(transport);
    let response = client
        .identify("user-1", Some(jwt_expiring_in(3600)), None)
        .await;
    assert!(response.is_success(), "identify failed: {:?}", response);
    client
}

pub fn query_param(request: &HttpRequest, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Lets spawned tasks run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
