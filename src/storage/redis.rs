// src/storage/redis.rs

//! Redis/Valkey-backed cache.
//!
//! Keys:
//! - `guid:<guid>`: list of JSON snapshot records, newest pushed to the front.
//! - `state:<guid>`: hash holding the last-run state.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    collapse_consecutive, LastRunState, LoadedCache, Snapshot, SnapshotReader, SnapshotWriter,
    StateUpdate,
};
use crate::errors::{ChangewatchError, Result};
use crate::types::{Guid, Timestamp};

const SNAPSHOT_PREFIX: &str = "guid:";
const STATE_PREFIX: &str = "state:";

/// One list element.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    data: String,
    timestamp: Timestamp,
    #[serde(default)]
    tries: u32,
    #[serde(default)]
    etag: Option<String>,
}

pub struct RedisStorage {
    url: String,
    connection: MultiplexedConnection,
}

impl RedisStorage {
    pub async fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ChangewatchError::Storage(format!("invalid redis url {url}: {e}")))?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!(url = %url, "connected to redis cache");
        Ok(Self {
            url: url.to_string(),
            connection,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn snapshot_key(guid: &str) -> String {
        format!("{SNAPSHOT_PREFIX}{guid}")
    }

    fn state_key(guid: &str) -> String {
        format!("{STATE_PREFIX}{guid}")
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{prefix}*"))
            .query_async(&mut conn)
            .await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(prefix).map(str::to_string))
            .collect())
    }

    async fn read_state(&self, guid: &str) -> Result<Option<LastRunState>> {
        let mut conn = self.conn();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(Self::state_key(guid))
            .query_async(&mut conn)
            .await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let mut state = LastRunState::default();
        for (field, value) in fields {
            match field.as_str() {
                "name" => state.name = Some(value),
                "location" => state.location = Some(value),
                "last_checked" => state.last_checked = value.parse().ok(),
                "tries" => state.tries = value.parse().unwrap_or_default(),
                "etag" => state.etag = Some(value),
                _ => {}
            }
        }
        Ok(Some(state))
    }
}

#[async_trait]
impl SnapshotReader for RedisStorage {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get_guids(&self) -> Result<BTreeSet<Guid>> {
        let mut guids: BTreeSet<Guid> = self
            .keys_with_prefix(SNAPSHOT_PREFIX)
            .await?
            .into_iter()
            .collect();
        guids.extend(self.keys_with_prefix(STATE_PREFIX).await?);
        Ok(guids)
    }

    async fn load(&self, guid: &str, count: Option<usize>) -> Result<LoadedCache> {
        let stop: i64 = match count {
            Some(0) => return Ok(self.load_state_only(guid).await?),
            // Over-fetch: collapsing duplicates may drop elements.
            Some(n) => i64::try_from(n.saturating_mul(2)).unwrap_or(i64::MAX) - 1,
            None => -1,
        };

        let mut conn = self.conn();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(Self::snapshot_key(guid))
            .arg(0)
            .arg(stop)
            .query_async(&mut conn)
            .await?;

        let records = raw
            .iter()
            .map(|r| serde_json::from_str::<Record>(r))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let state = match self.read_state(guid).await? {
            Some(state) => state,
            None => records
                .first()
                .map(|r| LastRunState {
                    tries: r.tries,
                    etag: r.etag.clone(),
                    ..LastRunState::default()
                })
                .unwrap_or_default(),
        };

        let mut snapshots = collapse_consecutive(
            records
                .into_iter()
                .map(|r| Snapshot::new(r.data, r.timestamp)),
            count,
        );

        // Not enough distinct elements in the over-fetched window: read all.
        if let Some(n) = count {
            if snapshots.len() < n && raw.len() as i64 == stop + 1 {
                snapshots = self.load(guid, None).await?.snapshots;
                snapshots.truncate(n);
            }
        }

        Ok(LoadedCache { state, snapshots })
    }
}

impl RedisStorage {
    async fn load_state_only(&self, guid: &str) -> Result<LoadedCache> {
        Ok(LoadedCache {
            state: self.read_state(guid).await?.unwrap_or_default(),
            snapshots: Vec::new(),
        })
    }
}

#[async_trait]
impl SnapshotWriter for RedisStorage {
    async fn save(&self, guid: &str, data: &str, timestamp: Timestamp) -> Result<()> {
        let state = self.read_state(guid).await?.unwrap_or_default();
        let record = Record {
            data: data.to_string(),
            timestamp,
            tries: state.tries,
            etag: state.etag,
        };
        let payload = serde_json::to_string(&record)?;

        let mut conn = self.conn();
        let _: i64 = redis::cmd("LPUSH")
            .arg(Self::snapshot_key(guid))
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        debug!(guid = %guid, "stored snapshot (redis)");
        Ok(())
    }

    async fn update(&self, guid: &str, update: StateUpdate) -> Result<()> {
        let mut fields: Vec<(&str, String)> = Vec::new();
        if let Some(name) = update.name {
            fields.push(("name", name));
        }
        if let Some(location) = update.location {
            fields.push(("location", location));
        }
        if let Some(ts) = update.last_checked {
            fields.push(("last_checked", ts.to_string()));
        }
        match update.etag {
            Some(Some(etag)) => fields.push(("etag", etag)),
            Some(None) => {
                let mut conn = self.conn();
                let _: i64 = redis::cmd("HDEL")
                    .arg(Self::state_key(guid))
                    .arg("etag")
                    .query_async(&mut conn)
                    .await?;
            }
            None => {}
        }
        // Always written so the hash exists after the first update.
        let tries = match update.tries {
            Some(tries) => tries,
            None => self
                .read_state(guid)
                .await?
                .map(|s| s.tries)
                .unwrap_or_default(),
        };
        fields.push(("tries", tries.to_string()));

        let mut cmd = redis::cmd("HSET");
        cmd.arg(Self::state_key(guid));
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }

        let mut conn = self.conn();
        let _: i64 = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, guid: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: i64 = redis::cmd("DEL")
            .arg(Self::snapshot_key(guid))
            .arg(Self::state_key(guid))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn clean_retaining(&self, guid: &str, retain_limit: usize) -> Result<usize> {
        let key = Self::snapshot_key(guid);
        let keep = i64::try_from(retain_limit.max(1)).unwrap_or(i64::MAX);
        let mut conn = self.conn();

        let before: i64 = redis::cmd("LLEN").arg(&key).query_async(&mut conn).await?;
        if before <= keep {
            return Ok(0);
        }
        let _: () = redis::cmd("LTRIM")
            .arg(&key)
            .arg(0)
            .arg(keep - 1)
            .query_async(&mut conn)
            .await?;
        let after: i64 = redis::cmd("LLEN").arg(&key).query_async(&mut conn).await?;

        Ok(usize::try_from(before - after).unwrap_or_default())
    }
}
