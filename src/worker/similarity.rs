// src/worker/similarity.rs

//! Near-match reconciliation against a job's recent history.

use std::time::Duration;

use anyhow::anyhow;
use similar::TextDiff;

use crate::config::SimilaritySection;
use crate::errors::{ChangewatchError, Result};
use crate::storage::Snapshot;

/// Inputs longer than this are compared line by line instead of by
/// character.
const CHAR_DIFF_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityPolicy {
    pub baseline_cutoff: f64,
    pub timeout: Duration,
}

impl Default for SimilarityPolicy {
    fn default() -> Self {
        SimilaritySection::default().into()
    }
}

impl From<SimilaritySection> for SimilarityPolicy {
    fn from(section: SimilaritySection) -> Self {
        Self {
            baseline_cutoff: section.baseline_cutoff,
            timeout: Duration::from_millis(200),
        }
    }
}

/// How a fetched payload relates to the history it was compared with.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryMatch {
    /// Identical to a stored payload.
    Exact(Snapshot),
    /// Differs from a stored payload in whitespace only.
    Noise(Snapshot),
    /// A real change; `baseline` is the closest stored payload.
    Changed { baseline: Snapshot, ratio: f64 },
    /// Nothing in history is close.
    Distinct,
}

/// Same words in the same order, whatever the spacing.
pub fn same_tokens(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}

impl SimilarityPolicy {
    pub fn ratio(&self, old: &str, new: &str) -> f64 {
        if old == new {
            return 1.0;
        }
        let mut config = TextDiff::configure();
        config.timeout(self.timeout);
        let ratio = if old.len().max(new.len()) > CHAR_DIFF_LIMIT {
            config.diff_lines(old, new).ratio()
        } else {
            config.diff_chars(old, new).ratio()
        };
        f64::from(ratio)
    }

    /// Compare `new_data` with `history` (newest first).
    ///
    /// Only an exact or whitespace-only match counts as unchanged. Otherwise
    /// the candidate with the highest ratio becomes the diff baseline if it
    /// reaches `baseline_cutoff`, ties going to the newer snapshot.
    pub fn classify(&self, new_data: &str, history: &[Snapshot]) -> HistoryMatch {
        if let Some(exact) = history.iter().find(|s| s.data == new_data) {
            return HistoryMatch::Exact(exact.clone());
        }
        if let Some(noise) = history.iter().find(|s| same_tokens(&s.data, new_data)) {
            return HistoryMatch::Noise(noise.clone());
        }

        let mut best: Option<(f64, &Snapshot)> = None;
        for candidate in history {
            let ratio = self.ratio(&candidate.data, new_data);
            if best.is_none_or(|(r, _)| ratio > r) {
                best = Some((ratio, candidate));
            }
        }

        match best {
            Some((ratio, baseline)) if ratio >= self.baseline_cutoff => HistoryMatch::Changed {
                baseline: baseline.clone(),
                ratio,
            },
            _ => HistoryMatch::Distinct,
        }
    }

    /// [`SimilarityPolicy::classify`] on the blocking pool; character diffs
    /// of large pages are CPU-bound.
    pub async fn classify_blocking(
        &self,
        new_data: String,
        history: Vec<Snapshot>,
    ) -> Result<HistoryMatch> {
        if history.is_empty() {
            return Ok(HistoryMatch::Distinct);
        }
        let policy = *self;
        tokio::task::spawn_blocking(move || policy.classify(&new_data, &history))
            .await
            .map_err(|e| ChangewatchError::Other(anyhow!("similarity task failed: {e}")))
    }
}
