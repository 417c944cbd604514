// src/worker/classify.rs

//! Turn a processed [`JobState`] into a verb, update retry bookkeeping and
//! persist what needs persisting.

use tracing::{debug, info};

use super::similarity::{HistoryMatch, SimilarityPolicy};
use crate::errors::Result;
use crate::handler::{JobFailure, JobPhase, JobState};
use crate::report::Report;
use crate::storage::StateUpdate;
use crate::types::Verb;

/// What happened to a job after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Failure the job asked to ignore; nothing stored or reported.
    Ignored,
    /// Failure within the retry budget; counted but not reported.
    Retrying { tries: u32 },
    Reported(Verb),
}

pub async fn classify(
    mut js: JobState,
    policy: &SimilarityPolicy,
    report: &mut Report,
) -> Result<Outcome> {
    js.phase = JobPhase::Classified;

    if let Some(failure) = js.failure.take() {
        return classify_failure(js, failure, report).await;
    }

    let Some(new_data) = js.new_data.clone() else {
        js.phase = JobPhase::Discarded;
        return Ok(Outcome::Ignored);
    };

    let verb = if js.old_data.is_none() {
        Verb::New
    } else {
        let matched = policy.classify_blocking(new_data, js.history.clone()).await?;
        match matched {
            HistoryMatch::Exact(baseline) => {
                debug!(job = %js.job.pretty_name(), "matches stored payload");
                js.use_baseline(&baseline);
                Verb::Unchanged
            }
            HistoryMatch::Noise(baseline) => {
                debug!(job = %js.job.pretty_name(), "whitespace-only difference treated as unchanged");
                js.use_baseline(&baseline);
                Verb::Unchanged
            }
            HistoryMatch::Changed { baseline, ratio } => {
                debug!(job = %js.job.pretty_name(), ratio, "closest stored payload used as baseline");
                js.use_baseline(&baseline);
                Verb::Changed
            }
            HistoryMatch::Distinct => Verb::Changed,
        }
    };

    // The diff must exist before the new payload becomes current, or a
    // failing diff tool would lose the change.
    if verb == Verb::Changed {
        if let Some(err) = js.get_diff().await.err() {
            let message = err.to_string();
            js.fail(JobFailure::Diff(message.clone()));
            js.failure = None;
            return classify_failure(js, JobFailure::Diff(message), report).await;
        }
    }

    if verb == Verb::Unchanged {
        js.phase = JobPhase::Discarded;
    } else {
        js.save().await?;
    }
    js.tries = 0;
    persist_state(&js).await?;

    report.add(verb, js);
    Ok(Outcome::Reported(verb))
}

async fn classify_failure(mut js: JobState, failure: JobFailure, report: &mut Report) -> Result<Outcome> {
    if let JobFailure::Fetch(ref err) = failure {
        if js.job.ignore_error(err) {
            debug!(job = %js.job.pretty_name(), error = %err, "ignoring error");
            js.failure = Some(failure);
            js.phase = JobPhase::Discarded;
            return Ok(Outcome::Ignored);
        }
    }

    if failure.is_not_modified() {
        info!(job = %js.job.pretty_name(), "not modified");
        js.new_data = js.old_data.clone();
        js.tries = 0;
        js.phase = JobPhase::Discarded;
        persist_state(&js).await?;
        report.add_unchanged(js);
        return Ok(Outcome::Reported(Verb::Unchanged));
    }

    let previous = js.tries;
    js.tries = previous.saturating_add(1);
    js.failure = Some(failure);
    js.phase = JobPhase::Discarded;
    persist_state(&js).await?;

    if previous < js.job.max_tries {
        info!(
            job = %js.job.pretty_name(),
            tries = js.tries,
            max_tries = js.job.max_tries,
            "error within retry budget"
        );
        return Ok(Outcome::Retrying { tries: js.tries });
    }

    report.add_error(js);
    Ok(Outcome::Reported(Verb::Error))
}

async fn persist_state(js: &JobState) -> Result<()> {
    let mut update = StateUpdate::new()
        .location(js.job.location.clone())
        .last_checked(js.current_timestamp)
        .tries(js.tries)
        .etag(js.etag.clone());
    if let Some(ref name) = js.job.name {
        update = update.name(name.clone());
    }
    js.storage().update(&js.job.guid, update).await
}
