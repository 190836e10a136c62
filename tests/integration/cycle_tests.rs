use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use restock_watcher::config::DetectorConfig;
use restock_watcher::models::EventKind;
use restock_watcher::storage::{JsonFileStore, MemoryStore, SqliteStore, StateStore};

use super::{harness, jacket, page_body, serve_pages, FEED_PATH};

#[tokio::test]
async fn test_restock_sends_exactly_one_notification() {
    let server = MockServer::start().await;
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let h = harness(&server, store, DetectorConfig::default(), true).await;

    // Known, sold-out jacket.
    h.watcher.state().write().await.mark_seen("42");

    serve_pages(&server, vec![json!([jacket(0)])]).await;
    let first = h.watcher.run_cycle().await;
    assert_eq!(first.total_events(), 0);
    assert!(h.notifier.messages().is_empty());

    serve_pages(&server, vec![json!([jacket(3)])]).await;
    let second = h.watcher.run_cycle().await;
    assert_eq!(second.events.get(&EventKind::RestockedSinceOutOfStock), Some(&1));
    assert_eq!(second.sent, 1);

    // Still in stock: nothing new.
    let third = h.watcher.run_cycle().await;
    assert_eq!(third.total_events(), 0);

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].text.contains("Jacket"));
    assert!(messages[0].text.contains("₹799.00 (was ₹999.00)"));
    assert!(messages[0].text.contains("https://www.sheinindia.in/sn-jacket-p-42.html"));
}

#[tokio::test]
async fn test_new_listing_is_announced_once() {
    let server = MockServer::start().await;
    let h = harness(&server, Arc::new(MemoryStore::new()), DetectorConfig::default(), true).await;

    serve_pages(&server, vec![json!([{ "goods_id": 7, "goods_name": "Hoodie", "stock": 0 }])]).await;
    let first = h.watcher.run_cycle().await;
    let second = h.watcher.run_cycle().await;

    assert_eq!(first.events.get(&EventKind::Unseen), Some(&1));
    assert_eq!(second.total_events(), 0);

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, EventKind::Unseen);
    assert_eq!(messages[0].product_id, "7");
}

#[tokio::test]
async fn test_sold_out_and_back_is_a_second_restock() {
    let server = MockServer::start().await;
    let detector = DetectorConfig {
        notify_new_listings: false,
        ..DetectorConfig::default()
    };
    let h = harness(&server, Arc::new(MemoryStore::new()), detector, true).await;

    for stock in [0, 2, 0, 5] {
        serve_pages(&server, vec![json!([jacket(stock)])]).await;
        h.watcher.run_cycle().await;
    }

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.kind == EventKind::RestockedSinceOutOfStock));
    assert_eq!(h.watcher.state().read().await.restock_episode("42"), 2);
}

#[tokio::test]
async fn test_failed_page_does_not_lose_other_pages() {
    let server = MockServer::start().await;
    let h = harness(&server, Arc::new(MemoryStore::new()), DetectorConfig::default(), true).await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .and(query_param("currentPage", "0"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .and(query_param("currentPage", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(json!([jacket(1)]))))
        .mount(&server)
        .await;

    let report = h.watcher.run_cycle().await;

    assert_eq!(report.pages_failed, 1);
    assert_eq!(report.pages_ok, 1);
    assert_eq!(report.fetch_errors.len(), 1);
    assert_eq!(report.products, 1);
    assert!(h.watcher.state().read().await.is_seen("42"));
}

#[tokio::test]
async fn test_records_without_id_are_skipped() {
    let server = MockServer::start().await;
    let h = harness(&server, Arc::new(MemoryStore::new()), DetectorConfig::default(), true).await;

    serve_pages(
        &server,
        vec![json!([
            { "goods_name": "No id", "stock": 4 },
            "not a record",
            { "goods_id": "", "stock": 1 },
            jacket(1)
        ])],
    )
    .await;

    let report = h.watcher.run_cycle().await;

    assert_eq!(report.products, 1);
    assert_eq!(report.skipped.get("missing_id"), Some(&2));
    assert_eq!(report.skipped.get("not_an_object"), Some(&1));
    assert_eq!(h.watcher.state().read().await.tracked_count(), 1);
}

#[tokio::test]
async fn test_disabled_alerts_absorb_changes_without_backlog() {
    let server = MockServer::start().await;
    let h = harness(&server, Arc::new(MemoryStore::new()), DetectorConfig::default(), false).await;

    serve_pages(&server, vec![json!([jacket(0)])]).await;
    h.watcher.run_cycle().await;
    serve_pages(&server, vec![json!([jacket(4)])]).await;
    let quiet = h.watcher.run_cycle().await;
    assert_eq!(quiet.absorbed, 1);
    assert!(h.notifier.messages().is_empty());

    h.watcher.state().set_alerts_enabled(true).await;
    let after = h.watcher.run_cycle().await;

    assert_eq!(after.total_events(), 0);
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_json_store_carries_state_across_restarts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("state").join("seen_products.json");

    serve_pages(&server, vec![json!([jacket(0)])]).await;
    {
        let h = harness(&server, Arc::new(JsonFileStore::new(&file)), DetectorConfig::default(), true).await;
        let report = h.watcher.run_cycle().await;
        assert!(report.persist_error.is_none());
        assert_eq!(h.notifier.messages().len(), 1);
    }

    // Restart: the jacket is known, so only its restock is announced.
    serve_pages(&server, vec![json!([jacket(2)])]).await;
    let h = harness(&server, Arc::new(JsonFileStore::new(&file)), DetectorConfig::default(), false).await;
    assert!(h.watcher.state().alerts_enabled().await);

    h.watcher.run_cycle().await;
    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, EventKind::RestockedSinceOutOfStock);
}

#[tokio::test]
async fn test_sqlite_store_carries_state_across_restarts() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("watcher.db").display());

    serve_pages(&server, vec![json!([jacket(3)])]).await;
    {
        let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
        let h = harness(&server, store.clone(), DetectorConfig::default(), true).await;
        h.watcher.run_cycle().await;
        assert_eq!(h.notifier.messages().len(), 2);
        store.close().await;
    }

    let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
    let h = harness(&server, store, DetectorConfig::default(), true).await;
    let report = h.watcher.run_cycle().await;

    assert_eq!(report.total_events(), 0);
    assert!(h.notifier.messages().is_empty());
    assert!(h.watcher.state().read().await.is_in_stock("42"));
}

#[tokio::test]
async fn test_coupon_alerts_follow_price_changes() {
    let server = MockServer::start().await;
    let detector = DetectorConfig {
        notify_new_listings: false,
        coupon_alerts: true,
    };
    let h = harness(&server, Arc::new(MemoryStore::new()), detector, true).await;
    h.watcher.state().write().await.mark_seen("42");
    h.watcher.state().write().await.mark_in_stock("42");

    serve_pages(&server, vec![json!([jacket(3)])]).await;
    h.watcher.run_cycle().await;
    h.watcher.run_cycle().await;

    let mut cheaper = jacket(3);
    cheaper["salePrice"] = json!({ "amount": "699" });
    serve_pages(&server, vec![json!([cheaper])]).await;
    h.watcher.run_cycle().await;

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.kind == EventKind::CouponQualifying));
    assert!(messages[1].text.contains("₹699.00"));
}
