use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use restock_watcher::config::{DetectorConfig, SchedulerConfig};
use restock_watcher::scheduler::CycleScheduler;
use restock_watcher::storage::MemoryStore;

use super::{harness, jacket, page_body, serve_pages, FEED_PATH};

fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        interval_secs: 1,
        initial_delay_secs: 0,
    }
}

#[tokio::test]
async fn test_overlapping_trigger_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(json!([])))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let h = harness(&server, Arc::new(MemoryStore::new()), DetectorConfig::default(), true).await;
    let scheduler = CycleScheduler::new(h.watcher.clone(), scheduler_config()).await.unwrap();

    let (first, second) = tokio::join!(scheduler.try_run_cycle(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.try_run_cycle().await
    });

    assert!(first.is_some());
    assert!(second.is_none());

    let stats = scheduler.stats().await;
    assert_eq!(stats.completed_cycles, 1);
    assert_eq!(stats.skipped_triggers, 1);
    assert!(stats.last_run.is_some());
}

#[tokio::test]
async fn test_run_now_reports_cycle() {
    let server = MockServer::start().await;
    serve_pages(&server, vec![json!([jacket(1)])]).await;

    let h = harness(&server, Arc::new(MemoryStore::new()), DetectorConfig::default(), true).await;
    let scheduler = CycleScheduler::new(h.watcher.clone(), scheduler_config()).await.unwrap();

    let report = scheduler.run_now().await.unwrap();
    assert_eq!(report.products, 1);
    assert!(!scheduler.runner().is_running());
    assert_eq!(h.watcher.state().last_cycle().await.unwrap().cycle_id, report.cycle_id);
}

#[tokio::test]
async fn test_started_scheduler_polls_until_shutdown() {
    let server = MockServer::start().await;
    serve_pages(&server, vec![json!([jacket(1)])]).await;

    let h = harness(&server, Arc::new(MemoryStore::new()), DetectorConfig::default(), true).await;
    let mut scheduler = CycleScheduler::new(h.watcher.clone(), scheduler_config()).await.unwrap();
    scheduler.start().await.unwrap();

    let mut waited = Duration::ZERO;
    while scheduler.stats().await.completed_cycles == 0 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    scheduler.shutdown().await.unwrap();

    assert!(scheduler.stats().await.completed_cycles >= 1);
    assert!(h.watcher.state().read().await.is_seen("42"));
    // New listing plus first stock, announced once however many cycles ran.
    assert_eq!(h.notifier.messages().len(), 2);
}
