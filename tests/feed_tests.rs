mod common;

use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use suprsend::feed::{StoreQuery, BADGE_META_KEY};
use suprsend::http::Method;
use suprsend::{
    ErrorType, Feed, FeedEvent, FeedOptions, FeedStatus, FetchOptions, Store, SuprSendClient,
};

const NOTIFICATIONS: &str = "/v1/feed/notifications";
const COUNT: &str = "/v1/feed/notifications_count";

fn notification(id: &str, created_on: i64) -> Value {
    json!({
        "n_id": id,
        "n_category": "transactional",
        "created_on": created_on,
        "is_pinned": false,
        "message": {"schema": "1", "text": format!("Order {} shipped", id)}
    })
}

fn expiring_notification(id: &str, expiry: i64) -> Value {
    let mut value = notification(id, 1_700_000_000_000);
    value["expiry"] = json!(expiry);
    value["is_expiry_visible"] = json!(true);
    value
}

fn page(results: Vec<Value>, current_page: u64, total_pages: u64, total: u64) -> Value {
    json!({
        "results": results,
        "meta": {
            "total_count": total,
            "current_page": current_page,
            "total_pages": total_pages
        }
    })
}

fn feed_options() -> FeedOptions {
    FeedOptions::builder()
        .api_host("https://inbox.test")
        .tenant_id("acme")
        .build()
}

async fn feed_client(transport: Arc<MockTransport>) -> (SuprSendClient, Feed) {
    transport.on(Method::Get, COUNT, 200, json!({"badge": 3}));
    let client = identified_client(transport.clone()).await;
    transport.clear_requests();
    let feed = client.feeds().initialize(Some(feed_options())).unwrap();
    (client, feed)
}

fn ids(feed: &Feed) -> Vec<String> {
    feed.data()
        .notifications
        .into_iter()
        .map(|n| n.id)
        .collect()
}

mod fetch_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_fetch_loads_page_and_badge() {
        let transport = MockTransport::new();
        transport.on(
            Method::Get,
            NOTIFICATIONS,
            200,
            page(vec![notification("n-1", 2), notification("n-2", 1)], 1, 2, 4),
        );
        let (_client, feed) = feed_client(transport.clone()).await;
        assert_eq!(feed.data().api_status, FeedStatus::Initial);
        assert_eq!(feed.data().badge(), 0);

        let response = feed.fetch(None).await;
        settle().await;

        assert!(response.is_success());
        let data = feed.data();
        assert_eq!(ids(&feed), vec!["n-1", "n-2"]);
        assert_eq!(data.api_status, FeedStatus::Success);
        assert_eq!(data.page_info.total, 4);
        assert!(data.page_info.has_more);
        assert_eq!(data.meta.get(BADGE_META_KEY).map(String::as_str), Some("3"));

        let request = &transport.requests_to(Method::Get, NOTIFICATIONS)[0];
        assert!(request.url.as_str().starts_with("https://inbox.test/v1/feed/notifications?"));
        assert_eq!(query_param(request, "distinct_id").as_deref(), Some("user-1"));
        assert_eq!(query_param(request, "tenant_id").as_deref(), Some("acme"));
        assert_eq!(query_param(request, "page_size").as_deref(), Some("20"));
        assert_eq!(query_param(request, "search_after").as_deref(), Some("[]"));
        assert_eq!(query_param(request, "store"), None);
        assert_eq!(transport.count(Method::Get, COUNT), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetch_rejected() {
        let transport = MockTransport::new();
        transport.on_delayed(
            Method::Get,
            NOTIFICATIONS,
            Duration::from_millis(200),
            page(vec![notification("n-1", 1)], 1, 1, 1),
        );
        let (_client, feed) = feed_client(transport.clone()).await;

        let (first, second) = tokio::join!(feed.fetch(None), feed.fetch(None));

        assert!(first.is_success());
        assert_eq!(second.error_type(), Some(ErrorType::Validation));
        assert_eq!(second.error.unwrap().message, "Already fetching data");
        assert_eq!(transport.count(Method::Get, NOTIFICATIONS), 1);
    }

    #[tokio::test]
    async fn test_next_page_appends_and_uses_cursor() {
        let transport = MockTransport::new();
        transport.on(
            Method::Get,
            NOTIFICATIONS,
            200,
            page(vec![notification("n-1", 20), notification("n-2", 10)], 1, 2, 3),
        );
        transport.on(
            Method::Get,
            NOTIFICATIONS,
            200,
            page(vec![notification("n-3", 5)], 2, 2, 3),
        );
        let (_client, feed) = feed_client(transport.clone()).await;

        feed.fetch(None).await;
        let response = feed.fetch_next_page().await;

        assert!(response.is_success());
        assert_eq!(ids(&feed), vec!["n-1", "n-2", "n-3"]);
        assert_eq!(feed.data().page_info.total, 3);
        assert!(!feed.data().page_info.has_more);

        let requests = transport.requests_to(Method::Get, NOTIFICATIONS);
        assert_eq!(
            query_param(&requests[1], "search_after").as_deref(),
            Some("[false,10]")
        );
        // Badge is only refreshed on the first fetch.
        settle().await;
        assert_eq!(transport.count(Method::Get, COUNT), 1);

        let exhausted = feed.fetch_next_page().await;
        assert_eq!(exhausted.error.unwrap().message, "No more pages to fetch");
        assert_eq!(transport.count(Method::Get, NOTIFICATIONS), 2);
    }

    #[tokio::test]
    async fn test_page_size_override() {
        let transport = MockTransport::new();
        let (_client, feed) = feed_client(transport.clone()).await;

        feed.fetch(Some(FetchOptions { page_size: Some(5) })).await;
        feed.fetch(Some(FetchOptions { page_size: Some(500) })).await;

        let requests = transport.requests_to(Method::Get, NOTIFICATIONS);
        assert_eq!(query_param(&requests[0], "page_size").as_deref(), Some("5"));
        assert_eq!(query_param(&requests[1], "page_size").as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn test_failed_fetch_sets_error_status() {
        let transport = MockTransport::new();
        transport.on(Method::Get, NOTIFICATIONS, 500, json!({"message": "down"}));
        let (_client, feed) = feed_client(transport).await;

        let response = feed.fetch(None).await;
        assert!(response.is_error());
        assert_eq!(feed.data().api_status, FeedStatus::Error);
        assert!(!feed.has_expiry_sweep());

        // Still the first fetch; a retry replaces rather than appends.
        assert_eq!(feed.data().notifications.len(), 0);
    }

    #[tokio::test]
    async fn test_store_params() {
        let transport = MockTransport::new();
        let client = identified_client(transport.clone()).await;
        transport.clear_requests();

        let unread = Store::new("unread", "Unread").with_query(StoreQuery {
            read: Some(false),
            ..StoreQuery::default()
        });
        let options = FeedOptions::builder()
            .api_host("https://inbox.test")
            .stores(vec![unread, Store::new("all", "All")])
            .build();
        let feed = client.feeds().initialize(Some(options)).unwrap();
        assert_eq!(feed.data().store.store_id, "unread");

        feed.fetch(None).await;
        settle().await;

        let fetch = &transport.requests_to(Method::Get, NOTIFICATIONS)[0];
        let store: Value = serde_json::from_str(&query_param(fetch, "store").unwrap()).unwrap();
        assert_eq!(store["storeId"], "unread");
        assert_eq!(store["query"]["read"], false);
        assert_eq!(query_param(fetch, "tenant_id").as_deref(), Some("default"));

        let count = &transport.requests_to(Method::Get, COUNT)[0];
        let stores: Value = serde_json::from_str(&query_param(count, "stores").unwrap()).unwrap();
        assert_eq!(stores.as_array().unwrap().len(), 2);
        assert_eq!(stores[1]["query"], json!({"tags": [], "categories": []}));
    }

    #[tokio::test]
    async fn test_updates_broadcast() {
        let transport = MockTransport::new();
        transport.on(
            Method::Get,
            NOTIFICATIONS,
            200,
            page(vec![notification("n-1", 1)], 1, 1, 1),
        );
        let (_client, feed) = feed_client(transport).await;
        let mut events = feed.subscribe();

        feed.fetch(None).await;

        let FeedEvent::StoreUpdate(loading) = events.recv().await.unwrap();
        assert_eq!(loading.api_status, FeedStatus::Loading);

        // The badge refresh may land in between.
        loop {
            let FeedEvent::StoreUpdate(update) = events.recv().await.unwrap();
            if update.api_status == FeedStatus::Success {
                assert_eq!(update.notifications.len(), 1);
                break;
            }
        }
    }
}

mod mark_tests {
    use super::*;

    async fn loaded_feed(transport: Arc<MockTransport>) -> (SuprSendClient, Feed) {
        transport.on(
            Method::Get,
            NOTIFICATIONS,
            200,
            page(vec![notification("n-1", 2), notification("n-2", 1)], 1, 1, 2),
        );
        let (client, feed) = feed_client(transport.clone()).await;
        feed.fetch(None).await;
        settle().await;
        transport.clear_requests();
        (client, feed)
    }

    #[tokio::test]
    async fn test_mark_as_seen_is_idempotent() {
        let transport = MockTransport::new();
        let (_client, feed) = loaded_feed(transport.clone()).await;

        assert!(feed.mark_as_seen("n-1").await.is_success());
        assert!(feed.mark_as_seen("n-1").await.is_success());

        assert_eq!(transport.count(Method::Patch, "/notifications/n-1/seen"), 1);
        assert!(feed.data().notifications[0].seen_on.is_some());
    }

    #[tokio::test]
    async fn test_read_unread_cycle() {
        let transport = MockTransport::new();
        let (_client, feed) = loaded_feed(transport.clone()).await;

        feed.mark_as_unread("n-1").await;
        assert!(transport.requests().is_empty());

        feed.mark_as_read("n-1").await;
        assert!(feed.data().notifications[0].read_on.is_some());
        feed.mark_as_unread("n-1").await;
        assert!(feed.data().notifications[0].read_on.is_none());

        assert_eq!(transport.count(Method::Patch, "/notifications/n-1/read"), 1);
        assert_eq!(transport.count(Method::Patch, "/notifications/n-1/unread"), 1);
    }

    #[tokio::test]
    async fn test_unknown_notification_still_synced() {
        let transport = MockTransport::new();
        let (_client, feed) = loaded_feed(transport.clone()).await;

        assert!(feed.mark_as_read("n-99").await.is_success());
        assert_eq!(transport.count(Method::Patch, "/notifications/n-99/read"), 1);
    }

    #[tokio::test]
    async fn test_interacted_marks_read_and_always_syncs() {
        let transport = MockTransport::new();
        let (_client, feed) = loaded_feed(transport.clone()).await;

        feed.mark_as_interacted("n-2").await;
        feed.mark_as_interacted("n-2").await;

        let second = &feed.data().notifications[1];
        assert!(second.interacted_on.is_some());
        assert!(second.read_on.is_some());
        assert_eq!(
            transport.count(Method::Patch, "/notifications/n-2/interacted"),
            2
        );
    }

    #[tokio::test]
    async fn test_archive_twice_is_noop() {
        let transport = MockTransport::new();
        let (_client, feed) = loaded_feed(transport.clone()).await;

        assert!(feed.mark_as_archived("n-1").await.is_success());
        assert!(feed.mark_as_archived("n-1").await.is_success());

        assert_eq!(ids(&feed), vec!["n-2"]);
        assert_eq!(
            transport.count(Method::Patch, "/notifications/n-1/archive"),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_archive_can_be_retried() {
        let transport = MockTransport::new();
        transport.on(
            Method::Patch,
            "/notifications/n-1/archive",
            500,
            json!({"message": "down"}),
        );
        transport.on(Method::Patch, "/notifications/n-1/archive", 202, Value::Null);
        let (_client, feed) = loaded_feed(transport.clone()).await;

        assert!(feed.mark_as_archived("n-1").await.is_error());
        assert!(feed.mark_as_archived("n-1").await.is_success());
        assert_eq!(
            transport.count(Method::Patch, "/notifications/n-1/archive"),
            2
        );
    }

    #[tokio::test]
    async fn test_bulk_seen() {
        let transport = MockTransport::new();
        let (_client, feed) = loaded_feed(transport.clone()).await;

        assert!(feed.mark_bulk_as_seen(&[]).await.is_success());
        assert!(transport.requests().is_empty());

        let ids = vec!["n-1".to_string(), "n-2".to_string()];
        feed.mark_bulk_as_seen(&ids).await;

        let requests = transport.requests_to(Method::Patch, "/bulk/notifications/seen");
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].body.clone().unwrap(),
            json!({"notification_ids": ["n-1", "n-2"]})
        );
        assert!(feed.data().notifications.iter().all(|n| n.seen_on.is_some()));
    }

    #[tokio::test]
    async fn test_mark_all_read_and_badge_reset() {
        let transport = MockTransport::new();
        let (_client, feed) = loaded_feed(transport.clone()).await;
        assert_eq!(feed.data().badge(), 3);

        feed.mark_all_as_read().await;
        assert_eq!(feed.data().badge(), 0);
        assert!(feed.data().notifications.iter().all(|n| n.read_on.is_some()));
        assert_eq!(transport.count(Method::Patch, "/v1/feed/mark_all_read"), 1);

        feed.reset_badge_count().await;
        assert_eq!(transport.count(Method::Patch, "/v1/feed/reset_bell_count"), 1);
    }
}

mod expiry_tests {
    use super::*;

    fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    #[tokio::test]
    async fn test_remove_expired_refreshes_badge_once() {
        let transport = MockTransport::new();
        transport.on(
            Method::Get,
            NOTIFICATIONS,
            200,
            page(
                vec![
                    expiring_notification("old-1", now() - 1_000),
                    expiring_notification("old-2", now() - 2_000),
                    expiring_notification("fresh", now() + 3_600_000),
                    notification("forever", 1),
                ],
                1,
                1,
                4,
            ),
        );
        let (_client, feed) = feed_client(transport.clone()).await;
        feed.fetch(None).await;
        settle().await;
        transport.clear_requests();

        assert_eq!(feed.remove_expired().await, 2);
        assert_eq!(ids(&feed), vec!["fresh", "forever"]);
        assert_eq!(transport.count(Method::Get, COUNT), 1);

        assert_eq!(feed.remove_expired().await, 0);
        assert_eq!(transport.count(Method::Get, COUNT), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_runs_after_fetch() {
        let transport = MockTransport::new();
        transport.on(
            Method::Get,
            NOTIFICATIONS,
            200,
            page(vec![expiring_notification("old", now() - 1_000)], 1, 1, 1),
        );
        let (_client, feed) = feed_client(transport.clone()).await;
        assert!(!feed.has_expiry_sweep());

        feed.fetch(None).await;
        assert!(feed.has_expiry_sweep());
        assert_eq!(ids(&feed), vec!["old"]);

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;
        assert!(feed.data().notifications.is_empty());
    }

    #[tokio::test]
    async fn test_reset_stops_sweep() {
        let transport = MockTransport::new();
        let (_client, feed) = feed_client(transport).await;
        feed.fetch(None).await;
        assert!(feed.has_expiry_sweep());

        feed.reset();
        assert!(!feed.has_expiry_sweep());
        assert_eq!(feed.data().api_status, FeedStatus::Initial);
    }
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reset_drops_in_flight_page() {
        let transport = MockTransport::new();
        transport.on_delayed(
            Method::Get,
            NOTIFICATIONS,
            Duration::from_millis(200),
            page(vec![notification("n-1", 1)], 1, 1, 1),
        );
        let (_client, feed) = feed_client(transport).await;

        let fetching = feed.clone();
        let handle = tokio::spawn(async move { fetching.fetch(None).await });
        settle().await;
        assert_eq!(feed.data().api_status, FeedStatus::Loading);

        feed.reset();
        handle.await.unwrap();

        let data = feed.data();
        assert!(data.notifications.is_empty());
        assert_eq!(data.api_status, FeedStatus::Initial);
        assert_eq!(data.badge(), 0);
    }

    #[tokio::test]
    async fn test_factory_tracks_instances() {
        let transport = MockTransport::new();
        let client = identified_client(transport).await;
        let feeds = client.feeds();

        let first = feeds.initialize(None).unwrap();
        let second = feeds.initialize(None).unwrap();
        assert_eq!(feeds.len(), 2);
        assert!(!first.same_instance(&second));

        feeds.remove_instance(&first);
        assert_eq!(feeds.len(), 1);

        second.remove();
        assert!(feeds.is_empty());

        feeds.initialize(None).unwrap();
        feeds.remove_all();
        assert!(feeds.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_api_host_rejected() {
        let transport = MockTransport::new();
        let client = client_with(transport);

        let options = FeedOptions::builder().api_host("not a url").build();
        assert!(client.feeds().initialize(Some(options)).is_err());
        assert!(client.feeds().is_empty());
    }

    #[tokio::test]
    async fn test_client_reset_resets_feeds() {
        let transport = MockTransport::new();
        transport.on(
            Method::Get,
            NOTIFICATIONS,
            200,
            page(vec![notification("n-1", 1)], 1, 1, 1),
        );
        let (client, feed) = feed_client(transport).await;
        feed.fetch(None).await;
        assert_eq!(feed.data().notifications.len(), 1);

        client.reset(false).await;
        assert!(feed.data().notifications.is_empty());
        assert_eq!(feed.data().api_status, FeedStatus::Initial);
    }
}
