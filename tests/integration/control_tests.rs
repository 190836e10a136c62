use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use restock_watcher::config::{ControlConfig, DetectorConfig};
use restock_watcher::control::{Command, ControlSurface, TelegramControl};
use restock_watcher::feed::FeedClient;
use restock_watcher::normalizer::Normalizer;
use restock_watcher::plugins::notifiers::{TelegramApi, TelegramNotifier};
use restock_watcher::plugins::{Dispatcher, MessageFormatter};
use restock_watcher::storage::{JsonFileStore, MemoryStore, StateStore};
use restock_watcher::watcher::load_initial_state;
use restock_watcher::{ChangeDetector, InventoryWatcher, StateHandle};

use super::{feed_config, harness, jacket, serve_pages, ORIGIN};

const TOKEN: &str = "123:abc";
const CHAT: &str = "555";

#[tokio::test]
async fn test_toggle_survives_restart() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("seen_products.json");

    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(&file));
    let state = StateHandle::new(load_initial_state(store.as_ref(), false).await.unwrap());
    let surface = ControlSurface::new(state, store);

    surface.handle(Command::Enable).await;

    // Persisted flag wins over the startup default.
    let reloaded = load_initial_state(&JsonFileStore::new(&file), false).await.unwrap();
    assert!(reloaded.alerts_enabled());

    let surface = ControlSurface::new(StateHandle::new(reloaded), Arc::new(JsonFileStore::new(&file)));
    surface.handle(Command::Disable).await;

    let reloaded = load_initial_state(&JsonFileStore::new(&file), true).await.unwrap();
    assert!(!reloaded.alerts_enabled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_toggle_during_cycle_saves_cleanly() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("seen_products.json");

    let products: Vec<_> = (0..200)
        .map(|id| json!({ "goods_id": id, "goods_name": format!("Item {}", id), "stock": 1 }))
        .collect();
    serve_pages(&server, vec![json!(products)]).await;

    let h = harness(&server, Arc::new(JsonFileStore::new(&file)), DetectorConfig::default(), false).await;
    let surface = ControlSurface::new(h.watcher.state().clone(), h.watcher.store());

    for round in 0..20 {
        let command = if round % 2 == 0 { Command::Enable } else { Command::Disable };
        let (report, reply) = tokio::join!(h.watcher.run_cycle(), surface.handle(command));
        assert!(report.persist_error.is_none(), "{:?}", report.persist_error);
        assert!(!reply.text.contains("could not be saved"), "{}", reply.text);
    }

    // Last command was Disable; the file holds the final flag and every id.
    let saved = JsonFileStore::new(&file).load().await.unwrap().unwrap();
    assert!(!saved.alerts_enabled());
    assert_eq!(saved.tracked_count(), 200);
}

#[tokio::test]
async fn test_enabling_after_quiet_period_does_not_replay() {
    let server = MockServer::start().await;
    let h = harness(&server, Arc::new(MemoryStore::new()), DetectorConfig::default(), false).await;
    let surface = ControlSurface::new(h.watcher.state().clone(), h.watcher.store());

    serve_pages(&server, vec![json!([jacket(0), { "goods_id": "43", "goods_name": "Scarf", "stock": 2 }])]).await;
    h.watcher.run_cycle().await;

    surface.handle(Command::Enable).await;
    h.watcher.run_cycle().await;
    assert!(h.notifier.messages().is_empty());

    // Only changes after the toggle are announced.
    serve_pages(&server, vec![json!([jacket(1), { "goods_id": "43", "goods_name": "Scarf", "stock": 2 }])]).await;
    h.watcher.run_cycle().await;

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].product_id, "42");

    let status = surface.status().await;
    assert!(status.alerts_enabled);
    assert_eq!(status.tracked, 2);
    assert_eq!(status.in_stock, 2);
    assert!(status.last_cycle.is_some());
}

#[tokio::test]
async fn test_chat_command_then_cycle_sends_to_telegram() {
    let feed = MockServer::start().await;
    serve_pages(&feed, vec![json!([jacket(0)])]).await;

    let bot = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{}/getUpdates", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [{ "update_id": 10, "message": { "message_id": 1, "chat": { "id": 555 }, "text": "/on" } }]
        })))
        .mount(&bot)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", TOKEN)))
        .and(body_string_contains("Alerts enabled"))
        .respond_with(sent_message())
        .expect(1)
        .mount(&bot)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", TOKEN)))
        .and(body_partial_json(json!({ "chat_id": CHAT })))
        .and(body_string_contains("IN STOCK ALERT"))
        .respond_with(sent_message())
        .expect(1)
        .mount(&bot)
        .await;

    let api = || TelegramApi::new(&bot.uri(), TOKEN, Duration::from_secs(2)).unwrap();
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    let state = StateHandle::new(load_initial_state(store.as_ref(), false).await.unwrap());

    let watcher = InventoryWatcher::new(
        Arc::new(FeedClient::new(feed_config(&feed)).unwrap()),
        Normalizer::new(ORIGIN),
        ChangeDetector::new(DetectorConfig::default()),
        Arc::new(Dispatcher::new(
            Box::new(TelegramNotifier::new(api(), CHAT)),
            MessageFormatter::default(),
        )),
        store.clone(),
        state.clone(),
        2,
    );

    // First sighting while alerts are off: absorbed.
    let quiet = watcher.run_cycle().await;
    assert_eq!(quiet.absorbed, 1);

    let config = ControlConfig {
        poll_timeout_secs: 0,
        ..ControlConfig::default()
    };
    let mut control = TelegramControl::new(api(), CHAT, ControlSurface::new(state.clone(), store), &config);
    assert_eq!(control.poll_once().await.unwrap(), 1);
    assert!(state.alerts_enabled().await);

    serve_pages(&feed, vec![json!([jacket(3)])]).await;
    let report = watcher.run_cycle().await;

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);
}

fn sent_message() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "ok": true,
        "result": { "message_id": 900, "chat": { "id": 555 } }
    }))
}
