use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::StateStore;
use crate::models::TrackingState;
use crate::utils::error::StorageError;

/// Stores the state as one JSON document.
///
/// Writes go to a sibling temp file which is then renamed over the target, so
/// a crash mid-write leaves the previous document intact. Older deployments
/// kept a bare array of seen ids; such a file loads as a state with only the
/// seen set populated and alerts disabled.
///
/// Saves are serialized; concurrent writers would otherwise race on the
/// shared temp file.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<Option<TrackingState>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Array(ids) => {
                tracing::info!(path = %self.path.display(), count = ids.len(), "Loaded legacy seen-id list");
                Ok(Some(legacy_state(ids)))
            }
            document => Ok(Some(serde_json::from_value(document)?)),
        }
    }

    async fn save(&self, state: &TrackingState) -> Result<(), StorageError> {
        let _writing = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(state)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

fn legacy_state(ids: Vec<Value>) -> TrackingState {
    let seen_ids: BTreeSet<String> = ids
        .into_iter()
        .filter_map(|id| match id {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();

    TrackingState::from_parts(seen_ids, BTreeSet::new(), BTreeMap::new(), BTreeSet::new(), false)
}
