// Shared fixtures for the integration suites: a wiremock catalog feed, a
// notifier that records what it was asked to send, and watcher wiring.

pub mod control_tests;
pub mod cycle_tests;
pub mod scheduler_tests;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use restock_watcher::config::{DetectorConfig, FeedConfig};
use restock_watcher::feed::FeedClient;
use restock_watcher::normalizer::Normalizer;
use restock_watcher::plugins::{Dispatcher, MessageFormatter, NotificationMessage, NotificationResult, NotifierPlugin};
use restock_watcher::storage::StateStore;
use restock_watcher::utils::error::DispatchError;
use restock_watcher::watcher::load_initial_state;
use restock_watcher::{ChangeDetector, InventoryWatcher, StateHandle};

pub const FEED_PATH: &str = "/api/category/sverse-5939-37961";
pub const ORIGIN: &str = "https://www.sheinindia.in";

#[derive(Default, Clone)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<NotificationMessage>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<NotificationMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifierPlugin for RecordingNotifier {
    fn name(&self) -> &str {
        "Recording Notifier"
    }

    fn plugin_type(&self) -> &str {
        "recording"
    }

    async fn notify(&self, message: &NotificationMessage) -> Result<NotificationResult, DispatchError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(NotificationResult::delivered(None))
    }
}

pub fn feed_config(server: &MockServer) -> FeedConfig {
    FeedConfig {
        endpoint: format!("{}{}", server.uri(), FEED_PATH),
        origin: ORIGIN.to_string(),
        max_pages: 2,
        request_timeout: 2,
        ..FeedConfig::default()
    }
}

pub fn page_body(products: Value) -> Value {
    json!({ "info": { "products": products } })
}

/// Replace whatever the feed currently serves with the given pages. Pages past
/// the end come back empty.
pub async fn serve_pages(server: &MockServer, pages: Vec<Value>) {
    server.reset().await;

    let count = pages.len();
    for (page, products) in pages.into_iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(FEED_PATH))
            .and(query_param("currentPage", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(products)))
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .and(query_param("currentPage", count.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(json!([]))))
        .mount(server)
        .await;
}

pub fn jacket(stock: u64) -> Value {
    json!({
        "goods_id": "42",
        "goods_name": "Jacket",
        "goods_sn": "sn-jacket",
        "stock": stock,
        "salePrice": { "amount": "799" },
        "retailPrice": { "amount": "999" }
    })
}

pub struct Harness {
    pub watcher: Arc<InventoryWatcher>,
    pub notifier: RecordingNotifier,
}

/// Wire a watcher against the wiremock feed, restoring state from `store`.
pub async fn harness(
    server: &MockServer,
    store: Arc<dyn StateStore>,
    detector: DetectorConfig,
    alerts_enabled_on_start: bool,
) -> Harness {
    let notifier = RecordingNotifier::default();
    let dispatcher = Dispatcher::new(Box::new(notifier.clone()), MessageFormatter::default());
    let initial = load_initial_state(store.as_ref(), alerts_enabled_on_start).await.unwrap();

    let config = feed_config(server);
    let max_pages = config.max_pages;
    let watcher = InventoryWatcher::new(
        Arc::new(FeedClient::new(config).unwrap()),
        Normalizer::new(ORIGIN),
        ChangeDetector::new(detector),
        Arc::new(dispatcher),
        store,
        StateHandle::new(initial),
        max_pages,
    );

    Harness {
        watcher: Arc::new(watcher),
        notifier,
    }
}
