// src/storage/memory.rs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::{
    collapse_consecutive, LastRunState, LoadedCache, Snapshot, SnapshotReader, SnapshotWriter,
    StateUpdate,
};
use crate::errors::{ChangewatchError, Result};
use crate::types::{Guid, Timestamp};

#[derive(Debug, Clone)]
struct Row {
    id: i64,
    snapshot: Snapshot,
}

#[derive(Debug, Default)]
struct Entry {
    rows: Vec<Row>,
    state: Option<LastRunState>,
    last_id: Option<i64>,
}

impl Entry {
    fn current_id(&self) -> Option<i64> {
        self.last_id
            .filter(|id| self.rows.iter().any(|r| r.id == *id))
            .or_else(|| newest_first(&self.rows).first().map(|r| r.id))
    }

    /// Current row first, then the others by timestamp descending.
    fn ordered(&self) -> Vec<Snapshot> {
        let current = self.current_id();
        let mut out = Vec::with_capacity(self.rows.len());
        if let Some(row) = current.and_then(|id| self.rows.iter().find(|r| r.id == id)) {
            out.push(row.snapshot.clone());
        }
        out.extend(
            newest_first(&self.rows)
                .into_iter()
                .filter(|r| Some(r.id) != current)
                .map(|r| r.snapshot.clone()),
        );
        out
    }
}

fn newest_first(rows: &[Row]) -> Vec<&Row> {
    let mut sorted: Vec<&Row> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        b.snapshot
            .timestamp
            .total_cmp(&a.snapshot.timestamp)
            .then(b.id.cmp(&a.id))
    });
    sorted
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    entries: BTreeMap<Guid, Entry>,
}

/// Stores snapshots in memory only (lost when dropped).
///
/// Mirrors the SQLite backend row for row: snapshots get increasing ids and
/// the last-run state points at the current one.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| ChangewatchError::Storage("memory cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl SnapshotReader for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_guids(&self) -> Result<BTreeSet<Guid>> {
        Ok(self.lock()?.entries.keys().cloned().collect())
    }

    async fn load(&self, guid: &str, count: Option<usize>) -> Result<LoadedCache> {
        let inner = self.lock()?;
        let Some(entry) = inner.entries.get(guid) else {
            return Ok(LoadedCache::default());
        };
        Ok(LoadedCache {
            state: entry.state.clone().unwrap_or_default(),
            snapshots: collapse_consecutive(entry.ordered(), count),
        })
    }
}

#[async_trait]
impl SnapshotWriter for MemoryStorage {
    async fn save(&self, guid: &str, data: &str, timestamp: Timestamp) -> Result<()> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;

        let entry = inner.entries.entry(guid.to_string()).or_default();
        entry.rows.push(Row {
            id,
            snapshot: Snapshot::new(data, timestamp),
        });
        entry.last_id = Some(id);
        entry.state.get_or_insert_with(LastRunState::default);

        debug!(guid = %guid, id, "stored snapshot (memory)");
        Ok(())
    }

    async fn update(&self, guid: &str, update: StateUpdate) -> Result<()> {
        let mut inner = self.lock()?;
        let entry = inner.entries.entry(guid.to_string()).or_default();
        update.apply_to(entry.state.get_or_insert_with(LastRunState::default));
        if let Some(id) = update.last_id {
            entry.last_id = Some(id);
        }
        Ok(())
    }

    async fn delete(&self, guid: &str) -> Result<()> {
        self.lock()?.entries.remove(guid);
        Ok(())
    }

    async fn clean_retaining(&self, guid: &str, retain_limit: usize) -> Result<usize> {
        let mut inner = self.lock()?;
        let Some(entry) = inner.entries.get_mut(guid) else {
            return Ok(0);
        };
        let Some(keep_current) = entry.current_id() else {
            return Ok(0);
        };

        let mut keep: BTreeSet<i64> = newest_first(&entry.rows)
            .into_iter()
            .filter(|r| r.id != keep_current)
            .take(retain_limit.saturating_sub(1))
            .map(|r| r.id)
            .collect();
        keep.insert(keep_current);

        let before = entry.rows.len();
        entry.rows.retain(|r| keep.contains(&r.id));
        Ok(before - entry.rows.len())
    }
}
