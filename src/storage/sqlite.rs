// src/storage/sqlite.rs

//! Embedded SQLite cache.
//!
//! Two tables:
//! - `snapshot(id, guid, timestamp, data)`: append-only.
//! - `last_run_state(guid, name, location, last_checked, last_id, tries, etag)`:
//!   one row per guid, `last_id` pointing at the current snapshot.
//!
//! The pool is capped at a single connection, which serialises writes from
//! concurrent workers.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use super::{
    extend_collapsed, LastRunState, LoadedCache, Snapshot, SnapshotReader, SnapshotWriter,
    StateUpdate,
};
use crate::errors::Result;
use crate::types::{Guid, Timestamp};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS snapshot (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        guid TEXT NOT NULL,
        timestamp REAL NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snapshot_guid_timestamp ON snapshot(guid, timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS last_run_state (
        guid TEXT PRIMARY KEY,
        name TEXT,
        location TEXT,
        last_checked REAL,
        last_id INTEGER REFERENCES snapshot(id) ON DELETE SET NULL,
        tries INTEGER NOT NULL DEFAULT 0,
        etag TEXT
    )
    "#,
];

#[derive(Debug, FromRow)]
struct StateRow {
    name: Option<String>,
    location: Option<String>,
    last_checked: Option<f64>,
    last_id: Option<i64>,
    tries: i64,
    etag: Option<String>,
}

impl StateRow {
    fn into_state(self) -> LastRunState {
        LastRunState {
            name: self.name,
            location: self.location,
            last_checked: self.last_checked,
            tries: u32::try_from(self.tries).unwrap_or_default(),
            etag: self.etag,
        }
    }
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    data: String,
    timestamp: f64,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Snapshot {
        Snapshot::new(self.data, self.timestamp)
    }
}

/// Rows fetched per query when walking a guid's history.
const PAGE_SIZE: i64 = 64;

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if missing) the cache file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);
        let store = Self::connect(options).await?;
        info!(path = ?path.as_ref(), "opened sqlite cache");
        Ok(store)
    }

    /// Ephemeral database, used in tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // One connection: serialises writers, and keeps `:memory:` databases
        // alive for the lifetime of the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn state_row(&self, guid: &str) -> Result<Option<StateRow>> {
        let row = sqlx::query_as::<_, StateRow>(
            "SELECT name, location, last_checked, last_id, tries, etag \
             FROM last_run_state WHERE guid = ?",
        )
        .bind(guid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Id of the current snapshot: `last_id` when it still exists, otherwise
    /// the newest row.
    async fn current_id(&self, guid: &str, last_id: Option<i64>) -> Result<Option<i64>> {
        if let Some(id) = last_id {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT id FROM snapshot WHERE id = ? AND guid = ?")
                    .bind(id)
                    .bind(guid)
                    .fetch_optional(&self.pool)
                    .await?;
            if exists.is_some() {
                return Ok(exists);
            }
        }

        let newest: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM snapshot WHERE guid = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .bind(guid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(newest)
    }
}

#[async_trait]
impl SnapshotReader for SqliteStorage {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn get_guids(&self) -> Result<BTreeSet<Guid>> {
        let guids: Vec<String> = sqlx::query_scalar(
            "SELECT guid FROM snapshot UNION SELECT guid FROM last_run_state",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(guids.into_iter().collect())
    }

    async fn load(&self, guid: &str, count: Option<usize>) -> Result<LoadedCache> {
        let state_row = self.state_row(guid).await?;
        let last_id = state_row.as_ref().and_then(|r| r.last_id);
        let state = state_row.map(StateRow::into_state).unwrap_or_default();

        if count == Some(0) {
            return Ok(LoadedCache {
                state,
                snapshots: Vec::new(),
            });
        }

        let Some(current) = self.current_id(guid, last_id).await? else {
            return Ok(LoadedCache {
                state,
                snapshots: Vec::new(),
            });
        };

        let head = sqlx::query_as::<_, SnapshotRow>(
            "SELECT data, timestamp FROM snapshot WHERE id = ?",
        )
        .bind(current)
        .fetch_one(&self.pool)
        .await?;

        // Older rows are paged so that a bounded load never reads the whole
        // history of a guid.
        let limit = count.unwrap_or(usize::MAX);
        let mut snapshots = Vec::new();
        let mut full = extend_collapsed(&mut snapshots, [head.into_snapshot()], limit);
        let mut offset: i64 = 0;
        while !full {
            let page = sqlx::query_as::<_, SnapshotRow>(
                "SELECT data, timestamp FROM snapshot \
                 WHERE guid = ? AND id != ? ORDER BY timestamp DESC, id DESC \
                 LIMIT ? OFFSET ?",
            )
            .bind(guid)
            .bind(current)
            .bind(PAGE_SIZE)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

            let fetched = page.len() as i64;
            full = extend_collapsed(&mut snapshots, page.into_iter().map(SnapshotRow::into_snapshot), limit);
            if fetched < PAGE_SIZE {
                break;
            }
            offset += fetched;
        }

        Ok(LoadedCache { state, snapshots })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        debug!("closed sqlite cache");
        Ok(())
    }
}

#[async_trait]
impl SnapshotWriter for SqliteStorage {
    async fn save(&self, guid: &str, data: &str, timestamp: Timestamp) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query("INSERT INTO snapshot (guid, timestamp, data) VALUES (?, ?, ?)")
            .bind(guid)
            .bind(timestamp)
            .bind(data)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        sqlx::query(
            "INSERT INTO last_run_state (guid, last_id) VALUES (?, ?) \
             ON CONFLICT(guid) DO UPDATE SET last_id = excluded.last_id",
        )
        .bind(guid)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(guid = %guid, id, "stored snapshot (sqlite)");
        Ok(())
    }

    async fn update(&self, guid: &str, update: StateUpdate) -> Result<()> {
        sqlx::query(
            "INSERT INTO last_run_state (guid, name, location, last_checked, last_id, tries, etag) \
             VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, 0), ?7) \
             ON CONFLICT(guid) DO UPDATE SET \
                 name = COALESCE(?2, name), \
                 location = COALESCE(?3, location), \
                 last_checked = COALESCE(?4, last_checked), \
                 last_id = COALESCE(?5, last_id), \
                 tries = COALESCE(?6, tries), \
                 etag = CASE WHEN ?8 THEN ?7 ELSE etag END",
        )
        .bind(guid)
        .bind(update.name)
        .bind(update.location)
        .bind(update.last_checked)
        .bind(update.last_id)
        .bind(update.tries.map(i64::from))
        .bind(update.etag.clone().flatten())
        .bind(update.etag.is_some())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, guid: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM last_run_state WHERE guid = ?")
            .bind(guid)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM snapshot WHERE guid = ?")
            .bind(guid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clean_retaining(&self, guid: &str, retain_limit: usize) -> Result<usize> {
        let last_id = self.state_row(guid).await?.and_then(|r| r.last_id);
        let Some(keep_id) = self.current_id(guid, last_id).await? else {
            return Ok(0);
        };
        let extra = i64::try_from(retain_limit.saturating_sub(1)).unwrap_or(i64::MAX);

        let result = sqlx::query(
            "DELETE FROM snapshot WHERE guid = ?1 AND id != ?2 AND id NOT IN ( \
                 SELECT id FROM snapshot WHERE guid = ?1 AND id != ?2 \
                 ORDER BY timestamp DESC, id DESC LIMIT ?3)",
        )
        .bind(guid)
        .bind(keep_id)
        .bind(extra)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_points_last_id_at_new_row() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.save("g", "first", 1.0).await.unwrap();
        store.save("g", "second", 2.0).await.unwrap();

        let loaded = store.load("g", Some(1)).await.unwrap();
        assert_eq!(loaded.snapshots, vec![Snapshot::new("second", 2.0)]);
        assert_eq!(loaded.state.tries, 0);
    }

    #[tokio::test]
    async fn update_keeps_untouched_fields() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store
            .update(
                "g",
                StateUpdate::new()
                    .name("job")
                    .tries(2)
                    .etag(Some("\"abc\"".into())),
            )
            .await
            .unwrap();
        store.update("g", StateUpdate::new().tries(0)).await.unwrap();

        let state = store.load("g", None).await.unwrap().state;
        assert_eq!(state.name.as_deref(), Some("job"));
        assert_eq!(state.tries, 0);
        assert_eq!(state.etag.as_deref(), Some("\"abc\""));

        store.update("g", StateUpdate::new().etag(None)).await.unwrap();
        assert_eq!(store.load("g", Some(0)).await.unwrap().state.etag, None);
    }

    #[tokio::test]
    async fn bounded_load_pages_through_duplicates() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.save("g", "oldest", 0.0).await.unwrap();
        for i in 1..=150 {
            store.save("g", "same", f64::from(i)).await.unwrap();
        }

        let loaded = store.load("g", Some(2)).await.unwrap();
        assert_eq!(
            loaded.snapshots,
            vec![Snapshot::new("same", 150.0), Snapshot::new("oldest", 0.0)]
        );
        let history = store.history("g", 3).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn clean_keeps_row_referenced_by_last_id() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.save("g", "newest-by-time", 10.0).await.unwrap();
        store.save("g", "current", 5.0).await.unwrap();
        store.save("g", "old", 1.0).await.unwrap();
        // Point back at the middle row explicitly.
        store.update("g", StateUpdate::new().last_id(2)).await.unwrap();

        assert_eq!(store.clean("g").await.unwrap(), 2);
        let loaded = store.load("g", None).await.unwrap();
        assert_eq!(loaded.snapshots, vec![Snapshot::new("current", 5.0)]);
    }

    #[tokio::test]
    async fn delete_removes_guid_entirely() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.save("g", "x", 1.0).await.unwrap();
        store.update("g", StateUpdate::new().tries(1)).await.unwrap();
        store.delete("g").await.unwrap();

        assert!(store.get_guids().await.unwrap().is_empty());
        assert_eq!(store.load("g", None).await.unwrap(), LoadedCache::default());
    }
}
