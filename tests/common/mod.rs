#![allow(dead_code)]

use std::sync::Arc;

use changewatch::filters::BuiltinFilters;
use changewatch::jobs::Job;
use changewatch::report::{FinishedReport, Report};
use changewatch::storage::{MemoryStorage, SnapshotWriter, SqliteStorage};
use changewatch::worker::{Outcome, SimilarityPolicy, WorkerPool};

/// Run `jobs` once against `storage` with default filters and thresholds.
pub async fn run_once(
    storage: Arc<dyn SnapshotWriter>,
    jobs: Vec<Job>,
) -> (Vec<Outcome>, FinishedReport) {
    let mut report = Report::new();
    let outcomes = WorkerPool::new(4)
        .run_jobs(
            jobs,
            storage,
            Arc::new(BuiltinFilters::new()),
            &SimilarityPolicy::default(),
            &mut report,
        )
        .await
        .expect("run should not fail on storage");
    (outcomes, report.finish().await)
}

/// Run a single job and return its outcome.
pub async fn run_job(storage: Arc<dyn SnapshotWriter>, job: Job) -> Outcome {
    let (outcomes, _) = run_once(storage, vec![job]).await;
    assert_eq!(outcomes.len(), 1);
    outcomes[0]
}

/// One fresh store per writable local backend, labelled for assertions.
pub async fn local_backends() -> Vec<(&'static str, Arc<dyn SnapshotWriter>)> {
    let sqlite = SqliteStorage::in_memory()
        .await
        .expect("in-memory sqlite should open");
    vec![
        ("memory", Arc::new(MemoryStorage::new())),
        ("sqlite", Arc::new(sqlite)),
    ]
}
