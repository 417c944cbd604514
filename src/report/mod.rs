// src/report/mod.rs

//! Run report: classified job states grouped by verb, handed to reporters
//! once the run is over.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::DisplaySection;
use crate::errors::Result;
use crate::handler::{JobFailure, JobState};
use crate::types::Verb;

pub mod stdout;

pub use stdout::StdoutReporter;

/// Accumulates job states during a run.
#[derive(Debug)]
pub struct Report {
    started: Instant,
    entries: Vec<JobState>,
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Report {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, verb: Verb, mut state: JobState) {
        state.verb = Some(verb);
        info!(job = %state.job.pretty_name(), verb = %verb, "job classified");
        self.entries.push(state);
    }

    pub fn add_new(&mut self, state: JobState) {
        self.add(Verb::New, state);
    }

    pub fn add_changed(&mut self, state: JobState) {
        self.add(Verb::Changed, state);
    }

    pub fn add_unchanged(&mut self, state: JobState) {
        self.add(Verb::Unchanged, state);
    }

    pub fn add_error(&mut self, state: JobState) {
        self.add(Verb::Error, state);
    }

    pub fn entries(&self) -> &[JobState] {
        &self.entries
    }

    /// Compute the diffs of changed jobs and stop the clock. A job whose diff
    /// cannot be produced is reported as an error instead.
    pub async fn finish(mut self) -> FinishedReport {
        self.entries.sort_by_key(|s| s.job.index);

        for state in self.entries.iter_mut() {
            if state.verb != Some(Verb::Changed) {
                continue;
            }
            if let Err(err) = state.get_diff().await {
                warn!(job = %state.job.pretty_name(), error = %err, "diff failed");
                state.fail(JobFailure::Diff(err.to_string()));
            }
        }

        FinishedReport {
            entries: self.entries,
            duration: self.started.elapsed(),
        }
    }
}

/// A finished run, ready for reporters.
#[derive(Debug)]
pub struct FinishedReport {
    /// In job declaration order.
    pub entries: Vec<JobState>,
    pub duration: Duration,
}

impl FinishedReport {
    pub fn with_verb(&self, verb: Verb) -> impl Iterator<Item = &JobState> {
        self.entries.iter().filter(move |s| s.verb == Some(verb))
    }

    pub fn count(&self, verb: Verb) -> usize {
        self.with_verb(verb).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only what the display settings ask for.
    pub fn filtered(self, display: &DisplaySection) -> FinishedReport {
        let entries = self
            .entries
            .into_iter()
            .filter(|s| s.verb.is_some_and(|v| display.shows(v)))
            .filter(|s| {
                display.empty_diff
                    || s.verb != Some(Verb::Changed)
                    || !s.cached_diff().is_some_and(|d| d.trim().is_empty())
            })
            .collect();
        FinishedReport {
            entries,
            duration: self.duration,
        }
    }
}

/// Consumes a finished report.
#[async_trait]
pub trait Reporter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit(&self, report: &FinishedReport) -> Result<()>;
}

/// Hand `report` to every reporter, in order.
pub async fn submit_all(reporters: &[Box<dyn Reporter>], report: &FinishedReport) -> Result<()> {
    if reporters.is_empty() {
        warn!("no reporters enabled");
    }
    for reporter in reporters {
        info!(reporter = reporter.name(), "submitting report");
        reporter.submit(report).await?;
    }
    Ok(())
}
