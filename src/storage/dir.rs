// src/storage/dir.rs

//! Legacy directory cache: `<root>/<guid>` holds the latest payload of each
//! job and nothing else. Only readable; use it as a migration source.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{LoadedCache, Snapshot, SnapshotReader};
use crate::errors::Result;
use crate::types::Guid;

#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, guid: &str) -> PathBuf {
        self.root.join(guid)
    }
}

#[async_trait]
impl SnapshotReader for DirStorage {
    fn backend_name(&self) -> &'static str {
        "directory"
    }

    async fn get_guids(&self) -> Result<BTreeSet<Guid>> {
        let mut guids = BTreeSet::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                guids.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(guids)
    }

    async fn load(&self, guid: &str, count: Option<usize>) -> Result<LoadedCache> {
        let path = self.file_for(guid);
        if count == Some(0) || !fs::try_exists(&path).await? {
            return Ok(LoadedCache::default());
        }

        let bytes = fs::read(&path).await?;
        let data = String::from_utf8_lossy(&bytes).into_owned();
        let timestamp = fs::metadata(&path)
            .await?
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as f64)
            .unwrap_or_default();

        debug!(guid = %guid, path = ?path, "read legacy cache file");
        Ok(LoadedCache {
            state: Default::default(),
            snapshots: vec![Snapshot::new(data, timestamp)],
        })
    }
}
