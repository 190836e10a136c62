//! Persistence of the tracking state between runs.
//!
//! Stores hold exactly one [`TrackingState`]. A store that has never been
//! written loads as `None`, which lets the caller seed the alert flag from
//! configuration instead of a persisted value.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::{StorageBackend, StorageConfig};
use crate::models::TrackingState;
use crate::utils::error::StorageError;

pub mod json_file;
pub mod sqlite;

pub use json_file::JsonFileStore;
pub use sqlite::SqliteStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<Option<TrackingState>, StorageError>;
    async fn save(&self, state: &TrackingState) -> Result<(), StorageError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Keeps the state in memory only; everything is lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<TrackingState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<TrackingState>, StorageError> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &TrackingState) -> Result<(), StorageError> {
        *self.state.lock().await = Some(state.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

pub async fn open_store(config: &StorageConfig) -> Result<Box<dyn StateStore>, StorageError> {
    let store: Box<dyn StateStore> = match config.backend {
        StorageBackend::Json => Box::new(JsonFileStore::new(&config.path)),
        StorageBackend::Sqlite => Box::new(SqliteStore::connect(&config.url).await?),
        StorageBackend::Memory => Box::new(MemoryStore::new()),
    };

    tracing::info!(store = %store.describe(), "State store opened");
    Ok(store)
}
