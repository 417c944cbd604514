// src/handler/mod.rs

//! Per-job processing: load cached state, fetch, filter, diff.

pub mod diff;
pub mod job_state;

pub use job_state::{JobFailure, JobPhase, JobState};
