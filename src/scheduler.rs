use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::utils::error::AppError;
use crate::watcher::{CycleReport, InventoryWatcher};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerStats {
    pub completed_cycles: u64,
    pub skipped_triggers: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
}

/// Runs cycles one at a time. A trigger that arrives while a cycle is in
/// flight is dropped and counted, never queued. Once stopped, no new cycle
/// starts.
#[derive(Clone)]
pub struct CycleRunner {
    watcher: Arc<InventoryWatcher>,
    guard: Arc<Mutex<()>>,
    stopped: Arc<AtomicBool>,
    completed_cycles: Arc<AtomicU64>,
    skipped_triggers: Arc<AtomicU64>,
    last_run: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl CycleRunner {
    pub fn new(watcher: Arc<InventoryWatcher>) -> Self {
        Self {
            watcher,
            guard: Arc::new(Mutex::new(())),
            stopped: Arc::new(AtomicBool::new(false)),
            completed_cycles: Arc::new(AtomicU64::new(0)),
            skipped_triggers: Arc::new(AtomicU64::new(0)),
            last_run: Arc::new(RwLock::new(None)),
        }
    }

    /// Run a cycle unless one is already running; `None` means skipped.
    pub async fn try_run_cycle(&self) -> Option<CycleReport> {
        let Ok(_running) = self.guard.try_lock() else {
            self.skipped_triggers.fetch_add(1, Ordering::Relaxed);
            counter!("restock_skipped_triggers_total").increment(1);
            tracing::warn!("Previous cycle still running, skipping this trigger");
            return None;
        };
        if self.stopped.load(Ordering::SeqCst) {
            tracing::debug!("Runner stopped, ignoring trigger");
            return None;
        }

        let report = self.watcher.run_cycle().await;
        self.completed_cycles.fetch_add(1, Ordering::Relaxed);
        *self.last_run.write().await = Some(report.finished_at);
        Some(report)
    }

    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    /// Refuse further cycles and wait for the one in flight, if any, to
    /// finish persisting.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _idle = self.guard.lock().await;
    }
}

pub struct CycleScheduler {
    scheduler: JobScheduler,
    runner: CycleRunner,
    config: SchedulerConfig,
    job_id: Option<Uuid>,
    initial_run: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
    start_time: DateTime<Utc>,
}

impl CycleScheduler {
    pub async fn new(watcher: Arc<InventoryWatcher>, config: SchedulerConfig) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            runner: CycleRunner::new(watcher),
            config,
            job_id: None,
            initial_run: None,
            start_time: Utc::now(),
        })
    }

    pub fn runner(&self) -> CycleRunner {
        self.runner.clone()
    }

    /// Register the repeated poll job and start ticking. The first cycle runs
    /// after the configured initial delay.
    pub async fn start(&mut self) -> Result<(), AppError> {
        let runner = self.runner.clone();
        let job = Job::new_repeated_async(self.config.interval(), move |_uuid, _l| {
            let runner = runner.clone();
            Box::pin(async move {
                // Detached so the cycle outlives the job future if the
                // scheduler drops it on shutdown.
                let cycle = tokio::spawn(async move {
                    runner.try_run_cycle().await;
                });
                if let Err(e) = cycle.await {
                    tracing::error!("Scheduled cycle task failed: {}", e);
                }
            })
        })?;

        self.job_id = Some(self.scheduler.add(job).await?);
        self.scheduler.start().await?;

        let runner = self.runner.clone();
        let delay = self.config.initial_delay();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            // Only the delay is cancellable; a started cycle runs to completion.
            tokio::select! {
                _ = cancel_rx => return,
                _ = tokio::time::sleep(delay) => {}
            }
            runner.try_run_cycle().await;
        });
        self.initial_run = Some((cancel_tx, handle));

        tracing::info!(
            interval_secs = self.config.interval_secs,
            initial_delay_secs = self.config.initial_delay_secs,
            "Cycle scheduler started"
        );
        Ok(())
    }

    /// Stop triggering cycles and wait for a running one to finish, so its
    /// state is saved before the process exits.
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.runner.stop().await;

        if let Some((cancel, handle)) = self.initial_run.take() {
            let _ = cancel.send(());
            if let Err(e) = handle.await {
                tracing::error!("Initial cycle task failed: {}", e);
            }
        }

        if let Some(job_id) = self.job_id.take() {
            self.scheduler.remove(&job_id).await?;
        }

        self.scheduler.shutdown().await?;
        tracing::info!("Cycle scheduler shutdown");
        Ok(())
    }

    /// Run a cycle immediately, outside the schedule.
    pub async fn run_now(&self) -> Option<CycleReport> {
        tracing::info!("Running immediate cycle");
        self.runner.try_run_cycle().await
    }

    pub async fn try_run_cycle(&self) -> Option<CycleReport> {
        self.runner.try_run_cycle().await
    }

    pub async fn stats(&self) -> SchedulerStats {
        let uptime = Utc::now().signed_duration_since(self.start_time);

        SchedulerStats {
            completed_cycles: self.runner.completed_cycles.load(Ordering::Relaxed),
            skipped_triggers: self.runner.skipped_triggers.load(Ordering::Relaxed),
            last_run: *self.runner.last_run.read().await,
            uptime_seconds: uptime.num_seconds().max(0) as u64,
        }
    }
}
