// src/storage/location.rs

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::{DirStorage, MemoryStorage, RedisStorage, SnapshotReader, SnapshotWriter, SqliteStorage};
use crate::errors::{ChangewatchError, Result};

/// Where the snapshot cache lives, parsed from a config/CLI string.
///
/// - `redis://...` / `rediss://...` → remote backend
/// - `memory:` → in-process backend
/// - `dir:<path>` or an existing directory → legacy directory backend
/// - anything else → SQLite file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLocation {
    Directory(PathBuf),
    Sqlite(PathBuf),
    Redis(String),
    Memory,
}

impl CacheLocation {
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.starts_with("redis://") || spec.starts_with("rediss://") {
            return CacheLocation::Redis(spec.to_string());
        }
        if spec == "memory:" {
            return CacheLocation::Memory;
        }
        if let Some(path) = spec.strip_prefix("dir:") {
            return CacheLocation::Directory(PathBuf::from(path));
        }
        let path = PathBuf::from(spec.strip_prefix("sqlite:").unwrap_or(spec));
        if path.is_dir() {
            CacheLocation::Directory(path)
        } else {
            CacheLocation::Sqlite(path)
        }
    }

    pub async fn open(&self) -> Result<CacheBackend> {
        let backend = match self {
            CacheLocation::Directory(path) => CacheBackend::Directory(DirStorage::new(path)),
            CacheLocation::Sqlite(path) => CacheBackend::Sqlite(Arc::new(SqliteStorage::open(path).await?)),
            CacheLocation::Redis(url) => CacheBackend::Redis(Arc::new(RedisStorage::open(url).await?)),
            CacheLocation::Memory => CacheBackend::Memory(Arc::new(MemoryStorage::new())),
        };
        info!(backend = backend.reader().backend_name(), "cache backend ready");
        Ok(backend)
    }
}

/// An opened cache backend.
///
/// Every variant can be read; only the history-keeping ones hand out a
/// writer.
pub enum CacheBackend {
    Directory(DirStorage),
    Sqlite(Arc<SqliteStorage>),
    Redis(Arc<RedisStorage>),
    Memory(Arc<MemoryStorage>),
}

impl CacheBackend {
    pub fn reader(&self) -> &dyn SnapshotReader {
        match self {
            CacheBackend::Directory(s) => s,
            CacheBackend::Sqlite(s) => s.as_ref(),
            CacheBackend::Redis(s) => s.as_ref(),
            CacheBackend::Memory(s) => s.as_ref(),
        }
    }

    /// Shared writer handle for the worker pool.
    pub fn writer(&self) -> Result<Arc<dyn SnapshotWriter>> {
        match self {
            CacheBackend::Directory(s) => Err(ChangewatchError::ReadOnlyBackend(s.backend_name())),
            CacheBackend::Sqlite(s) => Ok(s.clone()),
            CacheBackend::Redis(s) => Ok(s.clone()),
            CacheBackend::Memory(s) => Ok(s.clone()),
        }
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, CacheBackend::Directory(_))
    }

    pub async fn close(&self) -> Result<()> {
        self.reader().close().await
    }
}
