// src/jobs/fetch.rs

//! Contract between the job pipeline and whatever retrieves raw content.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Timestamp;

/// Per-run inputs handed to a [`Fetcher`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    /// Revalidation token from the previous run.
    pub etag: Option<String>,
    /// Timestamp of the current snapshot, if any.
    pub since: Option<Timestamp>,
    /// Skip conditional requests and always fetch fresh content.
    pub ignore_cached: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutput {
    pub content: String,
    pub etag: Option<String>,
}

impl FetchOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// The resource has not changed since `FetchRequest::since` / `etag`.
    #[error("not modified")]
    NotModified,

    #[error("HTTP {status}: {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("command exited with status {code}")]
    Shell { code: i32, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn is_not_modified(&self) -> bool {
        matches!(self, FetchError::NotModified)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            }
        } else if err.is_connect() || err.is_request() {
            FetchError::Connection(err.to_string())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

/// Retrieves the raw content of one job.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutput, FetchError>;

    /// Fetchers that share a non-thread-safe session run on the calling task,
    /// one after the other, instead of in the pool.
    fn requires_calling_thread(&self) -> bool {
        false
    }
}
