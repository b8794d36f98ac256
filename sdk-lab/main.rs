//! SuprSend Rust SDK Lab
//!
//! Internal verification script for SDK functionality. Runs against an
//! in-process fake backend, so no network or credentials are needed.
//! Run with: cargo run --example sdk-lab

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use suprsend::http::{HttpRequest, HttpResponse, Method, Transport};
use suprsend::{
    FeedOptions, FeedStatus, MemoryStore, PreferenceOption, SuprSendClient, SuprSendOptions,
};

const PASS: &str = "\x1b[32m[PASS]\x1b[0m";
const FAIL: &str = "\x1b[31m[FAIL]\x1b[0m";

/// Answers every request the SDK makes with a plausible body and records
/// what it saw.
#[derive(Default)]
struct LabBackend {
    seen: Mutex<Vec<(Method, String)>>,
}

#[async_trait]
impl Transport for LabBackend {
    async fn send(&self, request: HttpRequest) -> suprsend::Result<HttpResponse> {
        let path = request.url.path().to_string();
        self.seen.lock().push((request.method, path.clone()));

        let body = match (request.method, path.as_str()) {
            (Method::Get, p) if p.ends_with("/full_preference") => json!({
                "sections": [{
                    "name": "Updates",
                    "subcategories": [{
                        "name": "Newsletter",
                        "category": "newsletter",
                        "preference": "opt_in",
                        "is_editable": true,
                        "channels": [{"channel": "email", "preference": "opt_in", "is_editable": true}]
                    }]
                }],
                "channel_preferences": [{"channel": "email", "is_restricted": false}]
            }),
            (Method::Get, p) if p.ends_with("/notifications_count") => json!({"badge": 1}),
            (Method::Get, p) if p.ends_with("/notifications") => json!({
                "results": [{
                    "n_id": "lab-1",
                    "n_category": "lab",
                    "created_on": 1_700_000_000_000i64,
                    "message": {"schema": "1", "text": "Hello from the lab"}
                }],
                "meta": {"total_count": 1, "current_page": 1, "total_pages": 1}
            }),
            _ => json!({}),
        };
        Ok(HttpResponse::new(200, body.to_string()))
    }
}

#[tokio::main]
async fn main() {
    println!("=== SuprSend Rust SDK Lab ===\n");

    let mut passed = 0;
    let mut failed = 0;

    macro_rules! pass {
        ($test:expr) => {{
            println!("{} {}", PASS, $test);
            passed += 1;
        }};
    }

    macro_rules! fail {
        ($test:expr) => {{
            println!("{} {}", FAIL, $test);
            failed += 1;
        }};
    }

    // Test 1: Initialization
    println!("Testing initialization...");
    let options = SuprSendOptions::builder("sdk_lab_public_key")
        .host("https://hub.lab")
        .logging_enabled(true)
        .build();
    let backend = Arc::new(LabBackend::default());

    let client = match SuprSendClient::with_transport(
        options,
        backend.clone(),
        Arc::new(MemoryStore::new()),
    ) {
        Ok(c) => c,
        Err(e) => {
            fail!(format!("Initialization - {}", e));
            print_summary(passed, failed);
            std::process::exit(1);
        }
    };
    pass!("Initialization");

    // Test 2: Calls before identify are rejected locally
    if client.track("too_early", None).await.is_error() {
        pass!("track() before identify rejected");
    } else {
        fail!("track() before identify - expected an error");
    }

    // Test 3: Identify
    println!("\nTesting session...");
    let token = lab_token();
    let response = client.identify("lab-user", Some(token.clone()), None).await;
    if response.is_success() && client.is_identified() {
        pass!("identify()");
    } else {
        fail!(format!("identify() - {:?}", response.error));
    }

    let again = client.identify("lab-user", Some(token), None).await;
    if again.is_success() {
        pass!("identify() is idempotent");
    } else {
        fail!("identify() - repeat call failed");
    }

    // Test 4: Events and user properties
    println!("\nTesting events and user...");
    let mut properties = HashMap::new();
    properties.insert("source".to_string(), json!("lab"));
    properties.insert("$reserved".to_string(), json!("dropped"));
    if client.track("lab_verification", Some(properties)).await.is_success() {
        pass!("track()");
    } else {
        fail!("track()");
    }

    if client.user().add_email("lab@example.com").await.is_success() {
        pass!("add_email()");
    } else {
        fail!("add_email()");
    }

    if client.user().add_sms("12345").await.is_error() {
        pass!("add_sms() rejects non E.164 numbers");
    } else {
        fail!("add_sms() - invalid number accepted");
    }

    // Test 5: Preferences
    println!("\nTesting preferences...");
    let fetched = client.preferences().get_preferences(None).await;
    if fetched.is_success() && client.preferences().data().is_some() {
        pass!("get_preferences()");
    } else {
        fail!("get_preferences()");
    }

    let updated = client.preferences().update_category_preference(
        "newsletter",
        PreferenceOption::OptOut,
        None,
    );
    let opted_out = updated
        .body
        .as_ref()
        .and_then(|data| data.find_category("newsletter"))
        .map(|category| category.preference == PreferenceOption::OptOut)
        .unwrap_or(false);
    if opted_out {
        pass!("update_category_preference()");
    } else {
        fail!("update_category_preference() - local tree not updated");
    }

    // Test 6: Inbox feed
    println!("\nTesting inbox feed...");
    let feed = match client
        .feeds()
        .initialize(Some(FeedOptions::builder().api_host("https://inbox.lab").build()))
    {
        Ok(feed) => feed,
        Err(e) => {
            fail!(format!("feeds().initialize() - {}", e));
            print_summary(passed, failed);
            std::process::exit(1);
        }
    };

    let page = feed.fetch(None).await;
    if page.is_success() && feed.data().api_status == FeedStatus::Success {
        pass!(format!("fetch() - {} notifications", feed.data().notifications.len()));
    } else {
        fail!("fetch()");
    }

    if feed.mark_as_read("lab-1").await.is_success() {
        pass!("mark_as_read()");
    } else {
        fail!("mark_as_read()");
    }

    // Test 7: Cleanup
    println!("\nTesting cleanup...");
    client.reset(true).await;
    if !client.is_identified() && feed.data().notifications.is_empty() {
        pass!("reset()");
    } else {
        fail!("reset() - state not cleared");
    }

    println!("\nBackend saw {} requests", backend.seen.lock().len());
    print_summary(passed, failed);

    if failed > 0 {
        println!("\n\x1b[31mSome verifications failed!\x1b[0m");
        std::process::exit(1);
    } else {
        println!("\n\x1b[32mAll verifications passed!\x1b[0m");
        std::process::exit(0);
    }
}

/// Unsigned token valid for an hour; the fake backend does not verify it.
fn lab_token() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let exp = chrono::Utc::now().timestamp() + 3600;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "exp": exp }).to_string());
    format!("{}.{}.", header, payload)
}

fn print_summary(passed: i32, failed: i32) {
    println!("\n{}", "=".repeat(40));
    println!("Results: {} passed, {} failed", passed, failed);
    println!("{}", "=".repeat(40));
}
