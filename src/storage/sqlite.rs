use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use super::StateStore;
use crate::models::{EventKind, NotificationKey, TrackingState};
use crate::utils::error::StorageError;

const ALERTS_ENABLED_KEY: &str = "alerts_enabled";

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS seen_ids (product_id TEXT PRIMARY KEY NOT NULL)",
    "CREATE TABLE IF NOT EXISTS in_stock_ids (product_id TEXT PRIMARY KEY NOT NULL)",
    "CREATE TABLE IF NOT EXISTS restock_episodes (product_id TEXT PRIMARY KEY NOT NULL, episode INTEGER NOT NULL)",
    "CREATE TABLE IF NOT EXISTS notified_keys (
        product_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        tag TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (product_id, kind, tag)
    )",
    "CREATE TABLE IF NOT EXISTS settings (key TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)",
];

/// State store backed by a SQLite database.
///
/// Seen ids and notified keys are insert-only; the in-stock table is replaced
/// on every save. A database without the alerts setting row has never been
/// saved and loads as `None`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    url: String,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let in_memory = url.contains(":memory:");
        if !in_memory {
            ensure_parent_dir(url)?;
        }

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // An in-memory database lives and dies with its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options.connect_with(options).await?;

        let store = Self {
            pool,
            url: url.to_string(),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load(&self) -> Result<Option<TrackingState>, StorageError> {
        let alerts: Option<String> = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(ALERTS_ENABLED_KEY)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get("value"));

        let Some(alerts) = alerts else {
            return Ok(None);
        };

        let seen_ids: BTreeSet<String> = sqlx::query("SELECT product_id FROM seen_ids")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.get("product_id"))
            .collect();

        let in_stock_ids: BTreeSet<String> = sqlx::query("SELECT product_id FROM in_stock_ids")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.get("product_id"))
            .collect();

        let restock_episodes: BTreeMap<String, u32> =
            sqlx::query("SELECT product_id, episode FROM restock_episodes")
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(|row| {
                    let episode: i64 = row.get("episode");
                    (row.get("product_id"), u32::try_from(episode).unwrap_or(0))
                })
                .collect();

        let mut notified_keys = BTreeSet::new();
        for row in sqlx::query("SELECT product_id, kind, tag FROM notified_keys")
            .fetch_all(&self.pool)
            .await?
        {
            let product_id: String = row.get("product_id");
            let kind: String = row.get("kind");
            let tag: String = row.get("tag");
            let kind: EventKind = serde_json::from_value(serde_json::Value::String(kind))?;
            notified_keys.insert(NotificationKey::new(&product_id, kind, tag));
        }

        Ok(Some(TrackingState::from_parts(
            seen_ids,
            in_stock_ids,
            restock_episodes,
            notified_keys,
            alerts == "1",
        )))
    }

    async fn save(&self, state: &TrackingState) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        for id in state.seen_ids() {
            sqlx::query("INSERT OR IGNORE INTO seen_ids (product_id) VALUES (?)")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM in_stock_ids").execute(&mut *tx).await?;
        for id in state.in_stock_ids() {
            sqlx::query("INSERT INTO in_stock_ids (product_id) VALUES (?)")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        for (id, episode) in state.restock_episodes() {
            sqlx::query("INSERT OR REPLACE INTO restock_episodes (product_id, episode) VALUES (?, ?)")
                .bind(id)
                .bind(i64::from(*episode))
                .execute(&mut *tx)
                .await?;
        }

        for key in state.notified_keys() {
            sqlx::query("INSERT OR IGNORE INTO notified_keys (product_id, kind, tag) VALUES (?, ?, ?)")
                .bind(&key.product_id)
                .bind(key.kind.as_str())
                .bind(&key.tag)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
            .bind(ALERTS_ENABLED_KEY)
            .bind(if state.alerts_enabled() { "1" } else { "0" })
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.url.trim_start_matches("sqlite:").trim_start_matches("//"))
    }
}

fn ensure_parent_dir(url: &str) -> Result<(), StorageError> {
    let path = url
        .trim_start_matches("sqlite:")
        .trim_start_matches("//")
        .split('?')
        .next()
        .unwrap_or_default();

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
