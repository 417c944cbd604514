// src/storage/mod.rs

//! Versioned snapshot cache.
//!
//! Every backend can be read ([`SnapshotReader`]); only the backends that
//! keep history can be written ([`SnapshotWriter`]). The directory backend
//! is a legacy migration source and implements the reader side only.
//!
//! - [`dir`]: one flat file per guid, latest payload only.
//! - [`sqlite`]: embedded file with a snapshot table and a last-run table.
//! - [`redis`]: remote key-value store, one push-to-front list per guid.
//! - [`memory`]: in-process store with the same semantics as [`sqlite`].
//! - [`location`]: parses a cache location string and opens the backend.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::Result;
use crate::types::{Guid, Timestamp};

pub mod dir;
pub mod location;
pub mod memory;
pub mod redis;
pub mod sqlite;

pub use dir::DirStorage;
pub use location::{CacheBackend, CacheLocation};
pub use memory::MemoryStorage;
pub use redis::RedisStorage;
pub use sqlite::SqliteStorage;

/// One successful capture of a job's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub data: String,
    pub timestamp: Timestamp,
}

impl Snapshot {
    pub fn new(data: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            data: data.into(),
            timestamp,
        }
    }
}

/// Per-guid bookkeeping that changes on every run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastRunState {
    pub name: Option<String>,
    pub location: Option<String>,
    pub last_checked: Option<Timestamp>,
    /// Consecutive failures since the last successful classification.
    pub tries: u32,
    pub etag: Option<String>,
}

/// Result of [`SnapshotReader::load`]. Unknown guids load as the default
/// (empty) value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedCache {
    pub state: LastRunState,
    /// Newest first; the current snapshot is always at index 0.
    pub snapshots: Vec<Snapshot>,
}

impl LoadedCache {
    pub fn current(&self) -> Option<&Snapshot> {
        self.snapshots.first()
    }
}

/// Partial upsert of a [`LastRunState`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub last_checked: Option<Timestamp>,
    pub tries: Option<u32>,
    /// `Some(None)` clears a stored etag.
    pub etag: Option<Option<String>>,
    /// Row id of the snapshot considered current. Only meaningful for
    /// backends that address snapshots by id.
    pub last_id: Option<i64>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn last_checked(mut self, ts: Timestamp) -> Self {
        self.last_checked = Some(ts);
        self
    }

    pub fn tries(mut self, tries: u32) -> Self {
        self.tries = Some(tries);
        self
    }

    /// Set the etag; `None` clears it.
    pub fn etag(mut self, etag: Option<String>) -> Self {
        self.etag = Some(etag);
        self
    }

    pub fn last_id(mut self, id: i64) -> Self {
        self.last_id = Some(id);
        self
    }

    /// Apply the set fields onto an in-memory state.
    pub fn apply_to(&self, state: &mut LastRunState) {
        if let Some(ref name) = self.name {
            state.name = Some(name.clone());
        }
        if let Some(ref location) = self.location {
            state.location = Some(location.clone());
        }
        if let Some(ts) = self.last_checked {
            state.last_checked = Some(ts);
        }
        if let Some(tries) = self.tries {
            state.tries = tries;
        }
        if let Some(ref etag) = self.etag {
            state.etag = etag.clone();
        }
    }

    /// Update that reproduces `state` exactly on an empty guid.
    pub fn from_state(state: &LastRunState) -> Self {
        Self {
            name: state.name.clone(),
            location: state.location.clone(),
            last_checked: state.last_checked,
            tries: Some(state.tries),
            etag: Some(state.etag.clone()),
            last_id: None,
        }
    }
}

/// Full-fidelity export of one guid.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupEntry {
    pub guid: Guid,
    pub state: LastRunState,
    /// Newest first, as returned by `load(guid, None)`.
    pub snapshots: Vec<Snapshot>,
}

/// What a [`SnapshotWriter::gc`] pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Guids deleted because they are no longer configured.
    pub removed: Vec<Guid>,
    /// Guids that lost old snapshots, with the number of rows removed.
    pub cleaned: Vec<(Guid, usize)>,
}

/// Read access, implemented by every backend.
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    /// Backend identifier for logs and errors.
    fn backend_name(&self) -> &'static str;

    async fn get_guids(&self) -> Result<BTreeSet<Guid>>;

    /// Load the last-run state and up to `count` snapshots (`None` for all),
    /// newest first, with consecutive identical payloads collapsed.
    async fn load(&self, guid: &str, count: Option<usize>) -> Result<LoadedCache>;

    /// Up to `distinct` snapshots with pairwise different payloads, newest
    /// first. Reads a growing window instead of the whole history.
    async fn history(&self, guid: &str, distinct: usize) -> Result<Vec<Snapshot>> {
        if distinct == 0 {
            return Ok(Vec::new());
        }
        let mut window = distinct.saturating_mul(2);
        loop {
            let snapshots = self.load(guid, Some(window)).await?.snapshots;
            let exhausted = snapshots.len() < window;
            let found = distinct_history(snapshots, distinct);
            if exhausted || found.len() >= distinct {
                return Ok(found);
            }
            window = window.saturating_mul(2);
        }
    }

    /// Export every guid with its complete history.
    async fn backup(&self) -> Result<Vec<BackupEntry>> {
        let mut entries = Vec::new();
        for guid in self.get_guids().await? {
            let loaded = self.load(&guid, None).await?;
            entries.push(BackupEntry {
                guid,
                state: loaded.state,
                snapshots: loaded.snapshots,
            });
        }
        Ok(entries)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Write access, implemented by the backends that keep history.
#[async_trait]
pub trait SnapshotWriter: SnapshotReader {
    /// Append a snapshot and make it the current one.
    async fn save(&self, guid: &str, data: &str, timestamp: Timestamp) -> Result<()>;

    /// Upsert last-run bookkeeping without touching snapshots.
    async fn update(&self, guid: &str, update: StateUpdate) -> Result<()>;

    /// Drop every snapshot and the last-run state of `guid`.
    async fn delete(&self, guid: &str) -> Result<()>;

    /// Keep the current snapshot plus the `retain_limit - 1` newest others;
    /// returns how many snapshots were removed.
    async fn clean_retaining(&self, guid: &str, retain_limit: usize) -> Result<usize>;

    /// Keep only the current snapshot.
    async fn clean(&self, guid: &str) -> Result<usize> {
        self.clean_retaining(guid, 1).await
    }

    /// Import entries produced by [`SnapshotReader::backup`].
    async fn restore(&self, entries: Vec<BackupEntry>) -> Result<()> {
        for entry in entries {
            for snapshot in entry.snapshots.iter().rev() {
                self.save(&entry.guid, &snapshot.data, snapshot.timestamp)
                    .await?;
            }
            self.update(&entry.guid, StateUpdate::from_state(&entry.state))
                .await?;
        }
        Ok(())
    }

    /// Delete guids that are no longer configured, then clean the rest.
    async fn gc(&self, known_guids: &BTreeSet<Guid>, retain_limit: usize) -> Result<GcReport> {
        let stored = self.get_guids().await?;
        let mut report = GcReport::default();

        for guid in stored.difference(known_guids) {
            info!(guid = %guid, backend = self.backend_name(), "removing stale guid");
            self.delete(guid).await?;
            report.removed.push(guid.clone());
        }

        for guid in stored.intersection(known_guids) {
            let count = self.clean_retaining(guid, retain_limit).await?;
            if count > 0 {
                info!(guid = %guid, count, "removed old snapshots");
                report.cleaned.push((guid.clone(), count));
            }
        }

        Ok(report)
    }
}

/// Collapse runs of identical payloads in a newest-first list (the newest
/// timestamp of each run survives) and cut the result at `count`.
pub fn collapse_consecutive<I>(snapshots: I, count: Option<usize>) -> Vec<Snapshot>
where
    I: IntoIterator<Item = Snapshot>,
{
    let mut out: Vec<Snapshot> = Vec::new();
    extend_collapsed(&mut out, snapshots, count.unwrap_or(usize::MAX));
    out
}

/// Append to an already collapsed list, stopping at `limit` entries.
/// Returns `true` once the limit is reached.
pub fn extend_collapsed<I>(out: &mut Vec<Snapshot>, snapshots: I, limit: usize) -> bool
where
    I: IntoIterator<Item = Snapshot>,
{
    for snapshot in snapshots {
        if out.len() >= limit {
            return true;
        }
        if out.last().is_some_and(|prev| prev.data == snapshot.data) {
            continue;
        }
        out.push(snapshot);
    }
    out.len() >= limit
}

/// Keep the first occurrence of each payload, up to `distinct` entries.
pub fn distinct_history(snapshots: Vec<Snapshot>, distinct: usize) -> Vec<Snapshot> {
    let mut out: Vec<Snapshot> = Vec::new();
    for snapshot in snapshots {
        if out.len() >= distinct {
            break;
        }
        if !out.iter().any(|s| s.data == snapshot.data) {
            out.push(snapshot);
        }
    }
    out
}
