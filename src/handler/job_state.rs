// src/handler/job_state.rs

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::diff;
use crate::errors::Result;
use crate::filters::{FilterChain, FilterError};
use crate::jobs::{FetchError, FetchRequest, Job};
use crate::storage::{Snapshot, SnapshotWriter};
use crate::types::{now, Timestamp, Verb};

/// Where a [`JobState`] is in its single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Created,
    Loaded,
    Fetched,
    Filtered,
    Classified,
    Saved,
    Discarded,
}

/// A per-job failure captured during [`JobState::process`].
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("filter failed: {0}")]
    Filter(#[from] FilterError),

    #[error("diff failed: {0}")]
    Diff(String),
}

impl JobFailure {
    pub fn is_not_modified(&self) -> bool {
        matches!(self, JobFailure::Fetch(e) if e.is_not_modified())
    }
}

/// State of one job for one run. Owned by a single worker task.
pub struct JobState {
    pub job: Job,
    storage: Arc<dyn SnapshotWriter>,
    filters: Arc<dyn FilterChain>,
    pub phase: JobPhase,
    /// Baseline payload; the current snapshot unless classification picked
    /// a different historical entry.
    pub old_data: Option<String>,
    pub new_data: Option<String>,
    /// Timestamp of `old_data`.
    pub timestamp: Option<Timestamp>,
    /// When this run started.
    pub current_timestamp: Timestamp,
    /// Up to `compared_versions` distinct stored payloads, newest first.
    pub history: Vec<Snapshot>,
    pub tries: u32,
    pub etag: Option<String>,
    pub failure: Option<JobFailure>,
    /// Rendered failure for reports.
    pub traceback: Option<String>,
    pub verb: Option<Verb>,
    diff: Option<String>,
}

impl JobState {
    pub fn new(job: Job, storage: Arc<dyn SnapshotWriter>, filters: Arc<dyn FilterChain>) -> Self {
        Self {
            job,
            storage,
            filters,
            phase: JobPhase::Created,
            old_data: None,
            new_data: None,
            timestamp: None,
            current_timestamp: now(),
            history: Vec::new(),
            tries: 0,
            etag: None,
            failure: None,
            traceback: None,
            verb: None,
            diff: None,
        }
    }

    pub fn storage(&self) -> &Arc<dyn SnapshotWriter> {
        &self.storage
    }

    /// Seed the state from the cache.
    pub async fn load(&mut self) -> Result<()> {
        let guid = &self.job.guid;
        let loaded = self.storage.load(guid, Some(1)).await?;
        self.tries = loaded.state.tries;
        self.etag = loaded.state.etag;
        let current = loaded.snapshots.into_iter().next();
        if let Some(ref current) = current {
            self.old_data = Some(current.data.clone());
            self.timestamp = Some(current.timestamp);
        }
        self.history = match (self.job.compared_versions, current) {
            (0, _) | (_, None) => Vec::new(),
            (1, Some(current)) => vec![current],
            (n, Some(_)) => self.storage.history(guid, n).await?,
        };
        self.phase = JobPhase::Loaded;
        debug!(
            job = %self.job.pretty_name(),
            tries = self.tries,
            history = self.history.len(),
            "loaded cached state"
        );
        Ok(())
    }

    /// Load (if needed), fetch and filter. Fetch and filter failures are
    /// captured on the state; only storage errors are returned.
    pub async fn process(&mut self) -> Result<()> {
        if self.phase == JobPhase::Created {
            self.load().await?;
        }
        self.current_timestamp = now();

        let request = FetchRequest {
            etag: self.etag.clone(),
            since: self.timestamp,
            ignore_cached: self.job.ignore_cached,
        };

        let output = match self.job.fetcher.fetch(request).await {
            Ok(output) => output,
            Err(err) => {
                self.capture(err.into());
                return Ok(());
            }
        };
        self.phase = JobPhase::Fetched;
        self.etag = output.etag;

        match self.filters.apply(&output.content, &self.job.filter) {
            Ok(data) => {
                self.new_data = Some(data);
                self.phase = JobPhase::Filtered;
            }
            Err(err) => self.capture(err.into()),
        }
        Ok(())
    }

    fn capture(&mut self, failure: JobFailure) {
        let rendered = match &failure {
            JobFailure::Fetch(err) => self.job.format_error(err),
            other => render_chain(other),
        };
        if !failure.is_not_modified() {
            warn!(job = %self.job.pretty_name(), error = %rendered, "job failed");
        }
        self.traceback = Some(rendered);
        self.failure = Some(failure);
    }

    /// Record a failure found after processing (e.g. while diffing).
    pub fn fail(&mut self, failure: JobFailure) {
        self.capture(failure);
        self.verb = Some(Verb::Error);
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Adopt a historical snapshot as the diff baseline.
    pub fn use_baseline(&mut self, baseline: &Snapshot) {
        self.old_data = Some(baseline.data.clone());
        self.timestamp = Some(baseline.timestamp);
        self.diff = None;
    }

    /// Persist `new_data` as the current snapshot.
    pub async fn save(&mut self) -> Result<()> {
        if let Some(ref data) = self.new_data {
            self.storage
                .save(&self.job.guid, data, self.current_timestamp)
                .await?;
            self.phase = JobPhase::Saved;
        }
        Ok(())
    }

    /// Diff between baseline and new content, computed once.
    pub async fn get_diff(&mut self) -> Result<&str> {
        let diff = match self.diff.take() {
            Some(diff) => diff,
            None => {
                let old = self.old_data.as_deref().unwrap_or_default();
                let new = self.new_data.as_deref().unwrap_or_default();
                let raw = match self.job.diff_tool {
                    Some(ref tool) => diff::external_diff(tool, old, new).await?,
                    None => diff::unified_diff(old, new, self.timestamp, Some(self.current_timestamp)),
                };
                self.filters.apply_specs(&raw, &self.job.diff_filter)?
            }
        };
        Ok(self.diff.insert(diff).as_str())
    }

    /// Memoized diff, if [`JobState::get_diff`] already ran.
    pub fn cached_diff(&self) -> Option<&str> {
        self.diff.as_deref()
    }
}

impl fmt::Debug for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobState")
            .field("job", &self.job.pretty_name())
            .field("phase", &self.phase)
            .field("verb", &self.verb)
            .field("tries", &self.tries)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

fn render_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
