use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::detector::ChangeDetector;
use crate::feed::{FeedClient, FeedSource};
use crate::models::{EventKind, ProductSnapshot, TrackingState};
use crate::normalizer::Normalizer;
use crate::plugins::Dispatcher;
use crate::storage::{open_store, MemoryStore, StateStore};
use crate::utils::error::{AppError, StorageError};

/// Condensed outcome of the last cycle, kept for status replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub pages_ok: u32,
    pub pages_failed: u32,
    pub products: usize,
    pub skipped: usize,
    pub events: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub pages_ok: u32,
    pub pages_failed: u32,
    pub fetch_errors: Vec<String>,
    pub products: usize,
    pub skipped: BTreeMap<String, usize>,
    pub events: BTreeMap<EventKind, usize>,
    pub absorbed: usize,
    pub suppressed: usize,
    pub sent: usize,
    pub failed: usize,
    pub persist_error: Option<String>,
}

impl CycleReport {
    fn begin() -> Self {
        let now = Utc::now();
        Self {
            cycle_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            pages_ok: 0,
            pages_failed: 0,
            fetch_errors: Vec::new(),
            products: 0,
            skipped: BTreeMap::new(),
            events: BTreeMap::new(),
            absorbed: 0,
            suppressed: 0,
            sent: 0,
            failed: 0,
            persist_error: None,
        }
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn total_events(&self) -> usize {
        self.events.values().sum()
    }

    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            cycle_id: self.cycle_id,
            finished_at: self.finished_at,
            pages_ok: self.pages_ok,
            pages_failed: self.pages_failed,
            products: self.products,
            skipped: self.total_skipped(),
            events: self.total_events(),
            sent: self.sent,
            failed: self.failed,
        }
    }
}

/// Shared handle on the tracking state and the last cycle summary.
///
/// Cycles take the write lock only while the detector runs; control commands
/// take short locks of their own, so the two interleave safely. Saves go
/// through [`StateHandle::persist`] so the newest snapshot always lands last.
#[derive(Clone, Default)]
pub struct StateHandle {
    state: Arc<RwLock<TrackingState>>,
    last_cycle: Arc<RwLock<Option<CycleSummary>>>,
    persist_lock: Arc<Mutex<()>>,
}

impl StateHandle {
    pub fn new(state: TrackingState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            last_cycle: Arc::new(RwLock::new(None)),
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, TrackingState> {
        self.state.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, TrackingState> {
        self.state.write().await
    }

    /// Clone of the current state, for persistence outside the lock.
    pub async fn snapshot(&self) -> TrackingState {
        self.state.read().await.clone()
    }

    /// Snapshot and save while holding the persist lock. A save that queued
    /// behind another one re-reads the state, so it never writes older data.
    pub async fn persist(&self, store: &dyn StateStore) -> Result<(), StorageError> {
        let _persisting = self.persist_lock.lock().await;
        let snapshot = self.snapshot().await;
        store.save(&snapshot).await
    }

    pub async fn alerts_enabled(&self) -> bool {
        self.state.read().await.alerts_enabled()
    }

    /// Returns the previous value.
    pub async fn set_alerts_enabled(&self, enabled: bool) -> bool {
        let mut state = self.state.write().await;
        let previous = state.alerts_enabled();
        state.set_alerts_enabled(enabled);
        previous
    }

    pub async fn last_cycle(&self) -> Option<CycleSummary> {
        self.last_cycle.read().await.clone()
    }

    pub async fn record_cycle(&self, summary: CycleSummary) {
        *self.last_cycle.write().await = Some(summary);
    }
}

/// Restore the persisted state, or start fresh with the configured alert flag.
pub async fn load_initial_state(
    store: &dyn StateStore,
    alerts_enabled_on_start: bool,
) -> Result<TrackingState, StorageError> {
    match store.load().await? {
        Some(state) => {
            tracing::info!(
                store = %store.describe(),
                tracked = state.tracked_count(),
                in_stock = state.in_stock_count(),
                alerts_enabled = state.alerts_enabled(),
                "Restored tracking state"
            );
            Ok(state)
        }
        None => {
            tracing::info!(store = %store.describe(), alerts_enabled = alerts_enabled_on_start, "Starting with empty tracking state");
            Ok(TrackingState::new(alerts_enabled_on_start))
        }
    }
}

pub struct InventoryWatcher {
    feed: Arc<dyn FeedSource>,
    normalizer: Normalizer,
    detector: ChangeDetector,
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn StateStore>,
    state: StateHandle,
    max_pages: u32,
}

impl InventoryWatcher {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        normalizer: Normalizer,
        detector: ChangeDetector,
        dispatcher: Arc<Dispatcher>,
        store: Arc<dyn StateStore>,
        state: StateHandle,
        max_pages: u32,
    ) -> Self {
        Self {
            feed,
            normalizer,
            detector,
            dispatcher,
            store,
            state,
            max_pages,
        }
    }

    /// Wire the production components from configuration. A dry run logs
    /// notifications and keeps state changes in memory only.
    pub async fn from_config(config: &AppConfig, dry_run: bool) -> Result<Self, AppError> {
        let feed = Arc::new(FeedClient::new(config.feed.clone())?);
        let dispatcher = Arc::new(Dispatcher::from_config(&config.notifications, dry_run)?);

        let persistent: Arc<dyn StateStore> = Arc::from(open_store(&config.storage).await?);
        let initial = load_initial_state(persistent.as_ref(), config.control.alerts_enabled_on_start).await?;

        let store: Arc<dyn StateStore> = if dry_run {
            tracing::info!("Dry run: state changes will not be persisted");
            Arc::new(MemoryStore::new())
        } else {
            persistent
        };

        Ok(Self::new(
            feed,
            Normalizer::new(&config.feed.origin),
            ChangeDetector::new(config.detector.clone()),
            dispatcher,
            store,
            StateHandle::new(initial),
            config.feed.max_pages,
        ))
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        self.store.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// One full poll: fetch, normalize, detect, dispatch, persist.
    pub async fn run_cycle(&self) -> CycleReport {
        let report = CycleReport::begin();
        let span = tracing::info_span!("cycle", cycle_id = %report.cycle_id);
        self.execute(report).instrument(span).await
    }

    async fn execute(&self, mut report: CycleReport) -> CycleReport {
        let start_time = Instant::now();

        let records = self.fetch_pages(&mut report).await;
        let snapshots = self.normalize(&records, &mut report);
        report.products = snapshots.len();

        let detection = {
            let mut state = self.state.write().await;
            let detection = self.detector.detect(&mut state, &snapshots);
            gauge!("restock_tracked_products").set(state.tracked_count() as f64);
            gauge!("restock_in_stock_products").set(state.in_stock_count() as f64);
            detection
        };
        report.absorbed = detection.absorbed;
        report.suppressed = detection.suppressed;

        for event in &detection.events {
            *report.events.entry(event.kind).or_default() += 1;
            counter!("restock_events_total", "kind" => event.kind.as_str()).increment(1);

            match self.dispatcher.dispatch(event).await {
                Ok(_) => {
                    report.sent += 1;
                    counter!("restock_notifications_sent_total").increment(1);
                }
                Err(_) => {
                    // The key stays recorded; a failed send is not retried.
                    report.failed += 1;
                    counter!("restock_notifications_failed_total").increment(1);
                }
            }
        }

        if let Err(e) = self.state.persist(self.store.as_ref()).await {
            tracing::error!(store = %self.store.describe(), "Failed to persist tracking state: {}", e);
            counter!("restock_persist_failures_total").increment(1);
            report.persist_error = Some(e.to_string());
        }

        report.finished_at = Utc::now();
        report.duration_ms = start_time.elapsed().as_millis() as u64;
        self.state.record_cycle(report.summary()).await;

        counter!("restock_cycles_total").increment(1);
        histogram!("restock_cycle_duration_seconds").record(start_time.elapsed().as_secs_f64());

        tracing::info!(
            pages_ok = report.pages_ok,
            pages_failed = report.pages_failed,
            products = report.products,
            skipped = report.total_skipped(),
            events = report.total_events(),
            sent = report.sent,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Cycle complete"
        );

        report
    }

    async fn fetch_pages(&self, report: &mut CycleReport) -> Vec<Value> {
        let mut records = Vec::new();

        for page in 0..self.max_pages {
            match self.feed.fetch(page).await {
                Ok(products) if products.is_empty() => {
                    report.pages_ok += 1;
                    tracing::debug!(page, "Empty page, stopping pagination");
                    break;
                }
                Ok(products) => {
                    report.pages_ok += 1;
                    tracing::debug!(page, count = products.len(), "Fetched page");
                    records.extend(products);
                }
                Err(e) => {
                    tracing::warn!(page, kind = %e.kind, "{}", e);
                    counter!("restock_fetch_failures_total", "kind" => e.kind.to_string()).increment(1);
                    report.pages_failed += 1;
                    report.fetch_errors.push(e.to_string());
                }
            }
        }

        records
    }

    fn normalize(&self, records: &[Value], report: &mut CycleReport) -> Vec<ProductSnapshot> {
        let mut snapshots = Vec::with_capacity(records.len());

        for record in records {
            match self.normalizer.normalize(record) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(reason) => {
                    tracing::debug!(reason = reason.label(), "Skipping feed record: {}", reason);
                    counter!("restock_records_skipped_total", "reason" => reason.label()).increment(1);
                    *report.skipped.entry(reason.label().to_string()).or_default() += 1;
                }
            }
        }

        snapshots
    }
}
