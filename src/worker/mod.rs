// src/worker/mod.rs

//! Bounded-concurrency job execution and result classification.

pub mod classify;
pub mod pool;
pub mod similarity;

pub use classify::{classify, Outcome};
pub use pool::{WorkerPool, DEFAULT_WIDTH};
pub use similarity::{HistoryMatch, SimilarityPolicy};
