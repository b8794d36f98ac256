mod common;

use common::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use suprsend::http::Method;
use suprsend::{
    AuthenticateOptions, ErrorType, MemoryStore, SuprSendClient, SuprSendError,
};

mod auth_gating_tests {
    use super::*;

    #[tokio::test]
    async fn test_calls_before_identify_fail_without_network() {
        let transport = MockTransport::new();
        let client = client_with(transport.clone());

        let track = client.track("clicked", None).await;
        assert_eq!(track.error_type(), Some(ErrorType::Validation));

        let email = client.user().add_email("hello@example.com").await;
        assert_eq!(email.error_type(), Some(ErrorType::Validation));

        let preferences = client.preferences().get_preferences(None).await;
        assert_eq!(preferences.error_type(), Some(ErrorType::Validation));

        let feed = client.feeds().initialize(None).unwrap();
        let fetch = feed.fetch(None).await;
        assert_eq!(fetch.error_type(), Some(ErrorType::Validation));
        settle().await;

        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_user_token_fails_without_network() {
        let transport = MockTransport::new();
        let client = client_with(transport.clone());

        // The $identify event itself needs a token.
        let response = client.identify("user-1", None, None).await;
        assert!(response.is_error());
        assert_eq!(
            response.error.unwrap().message,
            "User token is missing"
        );
        assert!(transport.requests().is_empty());
        assert!(!client.is_identified());
    }

    #[tokio::test]
    async fn test_headers_applied() {
        let transport = MockTransport::new();
        let token = jwt_expiring_in(3600);
        let client = client_with(transport.clone());
        client.identify("user-1", Some(token.clone()), None).await;

        let request = &transport.requests_to(Method::Post, "/v2/event")[0];
        assert_eq!(request.header("Authorization"), Some("pk_test"));
        assert_eq!(request.header("x-ss-signature"), Some(token.as_str()));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
    }
}

mod identify_tests {
    use super::*;

    #[tokio::test]
    async fn test_identify_is_idempotent() {
        let transport = MockTransport::new();
        let client = client_with(transport.clone());
        let token = jwt_expiring_in(3600);

        let first = client.identify("user-1", Some(token.clone()), None).await;
        let second = client.identify("user-1", Some(token), None).await;

        assert!(first.is_success());
        assert!(second.is_success());
        assert_eq!(transport.count(Method::Post, "/v2/event"), 1);

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body["event"], "$identify");
        assert_eq!(body["distinct_id"], "user-1");
        assert_eq!(body["properties"]["$identified_id"], "user-1");
    }

    #[tokio::test]
    async fn test_identify_different_user_rejected() {
        let transport = MockTransport::new();
        let client = identified_client(transport.clone()).await;

        let response = client
            .identify("user-2", Some(jwt_expiring_in(3600)), None)
            .await;

        assert_eq!(response.error_type(), Some(ErrorType::Validation));
        assert_eq!(client.distinct_id().as_deref(), Some("user-1"));
        assert_eq!(transport.count(Method::Post, "/v2/event"), 1);
    }

    #[tokio::test]
    async fn test_identify_same_user_new_token_updates_in_place() {
        let transport = MockTransport::new();
        let client = identified_client(transport.clone()).await;
        let new_token = jwt_expiring_in(7200);

        let response = client
            .identify("user-1", Some(new_token.clone()), None)
            .await;
        assert!(response.is_success());
        assert_eq!(transport.count(Method::Post, "/v2/event"), 1);

        client.track("opened", None).await;
        let requests = transport.requests_to(Method::Post, "/v2/event");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].header("x-ss-signature"), Some(new_token.as_str()));
    }

    #[tokio::test]
    async fn test_failed_identify_resets_session() {
        let transport = MockTransport::new();
        transport.on(
            Method::Post,
            "/v2/event",
            403,
            json!({"type": "PERMISSION_DENIED", "message": "bad key"}),
        );
        let client = client_with(transport.clone());

        let response = client
            .identify("user-1", Some(jwt_expiring_in(3600)), None)
            .await;

        assert_eq!(response.error_type(), Some(ErrorType::PermissionDenied));
        assert_eq!(response.status_code, Some(403));
        assert!(!client.is_identified());
    }

    #[tokio::test]
    async fn test_authenticated_marker_skips_identify_event() {
        let transport = MockTransport::new();
        let store = Arc::new(MemoryStore::new());

        let first = SuprSendClient::with_transport(test_options(), transport.clone(), store.clone())
            .unwrap();
        first
            .identify("user-1", Some(jwt_expiring_in(3600)), None)
            .await;
        assert_eq!(transport.count(Method::Post, "/v2/event"), 1);

        // Same device, new process.
        let second = SuprSendClient::with_transport(test_options(), transport.clone(), store)
            .unwrap();
        let response = second
            .identify("user-1", Some(jwt_expiring_in(3600)), None)
            .await;

        assert!(response.is_success());
        assert!(second.is_identified());
        assert_eq!(transport.count(Method::Post, "/v2/event"), 1);
    }

    #[tokio::test]
    async fn test_identify_registers_known_push_token() {
        let transport = MockTransport::new();
        let client = identified_client(transport.clone()).await;
        client.user().add_ios_push("apns-token").await;
        client.reset(false).await;
        transport.clear_requests();

        client
            .identify("user-1", Some(jwt_expiring_in(3600)), None)
            .await;

        let bodies: Vec<_> = transport
            .requests_to(Method::Post, "/v2/event")
            .into_iter()
            .filter_map(|r| r.body)
            .collect();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["event"], "$identify");
        assert_eq!(bodies[1]["$append"]["$iospush"], "apns-token");
        assert_eq!(bodies[1]["$append"]["$pushvendor"], "apns");
    }

    #[tokio::test]
    async fn test_reset_clears_session() {
        let transport = MockTransport::new();
        let client = identified_client(transport.clone()).await;

        let response = client.reset(true).await;
        assert!(response.is_success());
        assert!(!client.is_identified());

        let track = client.track("after-reset", None).await;
        assert_eq!(track.error_type(), Some(ErrorType::Validation));

        // A different user can log in now.
        let response = client
            .identify("user-2", Some(jwt_expiring_in(3600)), None)
            .await;
        assert!(response.is_success());
        assert_eq!(client.distinct_id().as_deref(), Some("user-2"));
    }

    #[tokio::test]
    async fn test_reset_unsubscribes_push() {
        let transport = MockTransport::new();
        let client = identified_client(transport.clone()).await;
        client.user().add_ios_push("apns-token").await;
        transport.clear_requests();

        client.reset(true).await;

        let events = transport.requests_to(Method::Post, "/v2/event");
        assert_eq!(events.len(), 1);
        let body = events[0].body.clone().unwrap();
        assert_eq!(body["$remove"]["$iospush"], "apns-token");
        assert_eq!(body["$remove"]["$pushvendor"], "apns");
    }
}

mod token_refresh_tests {
    use super::*;

    fn refresh_options(calls: Arc<AtomicUsize>, next: String) -> AuthenticateOptions {
        AuthenticateOptions::new().refresh_user_token(move |_token, _claims| {
            let calls = Arc::clone(&calls);
            let next = next.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(next))
            }
        })
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_before_request() {
        let transport = MockTransport::new();
        let client = client_with(transport.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let fresh = jwt_expiring_in(3600);

        let response = client
            .identify(
                "user-1",
                Some(jwt_expiring_in(-10)),
                Some(refresh_options(Arc::clone(&calls), fresh.clone())),
            )
            .await;

        assert!(response.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let request = &transport.requests_to(Method::Post, "/v2/event")[0];
        assert_eq!(request.header("x-ss-signature"), Some(fresh.as_str()));
    }

    #[tokio::test]
    async fn test_refresh_error_swallowed() {
        let transport = MockTransport::new();
        let client = client_with(transport.clone());
        let stale = jwt_expiring_in(-10);

        let options = AuthenticateOptions::new().refresh_user_token(|_token, _claims| async {
            Err(SuprSendError::network("refresh endpoint down"))
        });
        let response = client
            .identify("user-1", Some(stale.clone()), Some(options))
            .await;

        assert!(response.is_success());
        let request = &transport.requests_to(Method::Post, "/v2/event")[0];
        assert_eq!(request.header("x-ss-signature"), Some(stale.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_refresh_before_expiry() {
        let transport = MockTransport::new();
        let client = client_with(transport.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let fresh = jwt_expiring_in(7200);

        client
            .identify(
                "user-1",
                Some(jwt_expiring_in(60)),
                Some(refresh_options(Arc::clone(&calls), fresh.clone())),
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Fires 30s before the 60s expiry.
        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        client.track("after-refresh", None).await;
        let requests = transport.requests_to(Method::Post, "/v2/event");
        let last = requests.last().unwrap();
        assert_eq!(last.header("x-ss-signature"), Some(fresh.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_refresh_timer() {
        let transport = MockTransport::new();
        let client = client_with(transport.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        client
            .identify(
                "user-1",
                Some(jwt_expiring_in(60)),
                Some(refresh_options(Arc::clone(&calls), jwt_expiring_in(7200))),
            )
            .await;
        client.reset(false).await;

        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
