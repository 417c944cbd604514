// src/worker/pool.rs

use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::classify::{self, Outcome};
use super::similarity::SimilarityPolicy;
use crate::errors::{ChangewatchError, Result};
use crate::filters::FilterChain;
use crate::handler::JobState;
use crate::jobs::Job;
use crate::report::Report;
use crate::storage::SnapshotWriter;

/// Default number of concurrent jobs.
pub const DEFAULT_WIDTH: usize = 10;

/// Fixed-width pool for I/O-bound job tasks.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    width: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH)
    }
}

impl WorkerPool {
    pub fn new(width: usize) -> Self {
        Self { width: width.max(1) }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `f` over `items` with at most `width` in flight. Results come back
    /// in completion order. The first error (or panic) aborts the remaining
    /// tasks and is returned.
    pub async fn run_parallel<T, R, F, Fut>(&self, items: Vec<T>, f: F) -> Result<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.width));
        let f = Arc::new(f);
        let mut set = JoinSet::new();

        for item in items {
            let semaphore = semaphore.clone();
            let f = f.clone();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ChangewatchError::Other(anyhow!("worker pool closed: {e}")))?;
                f(item).await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            let outcome = joined
                .map_err(|e| ChangewatchError::Other(anyhow!("worker task failed: {e}")))
                .and_then(|r| r);
            match outcome {
                Ok(value) => results.push(value),
                Err(err) => {
                    error!(error = %err, "aborting worker pool");
                    set.abort_all();
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    /// Process every job, then classify the results in declaration order and
    /// route them into `report`.
    ///
    /// Jobs whose fetcher must stay on the calling task run here, one at a
    /// time; all others run in the pool.
    pub async fn run_jobs(
        &self,
        jobs: Vec<Job>,
        storage: Arc<dyn SnapshotWriter>,
        filters: Arc<dyn FilterChain>,
        policy: &SimilarityPolicy,
        report: &mut Report,
    ) -> Result<Vec<Outcome>> {
        let (local, parallel): (Vec<Job>, Vec<Job>) = jobs
            .into_iter()
            .partition(|job| job.fetcher.requires_calling_thread());
        info!(
            parallel = parallel.len(),
            local = local.len(),
            width = self.width,
            "processing jobs"
        );

        let mut states = {
            let storage = storage.clone();
            let filters = filters.clone();
            self.run_parallel(parallel, move |job| {
                let storage = storage.clone();
                let filters = filters.clone();
                async move {
                    let mut state = JobState::new(job, storage, filters);
                    state.process().await?;
                    debug!(job = %state.job.pretty_name(), "job finished");
                    Ok(state)
                }
            })
            .await?
        };

        for job in local {
            let mut state = JobState::new(job, storage.clone(), filters.clone());
            state.process().await?;
            debug!(job = %state.job.pretty_name(), "job finished on calling task");
            states.push(state);
        }

        states.sort_by_key(|s| s.job.index);

        let mut outcomes = Vec::with_capacity(states.len());
        for state in states {
            outcomes.push(classify::classify(state, policy, report).await?);
        }
        Ok(outcomes)
    }
}
