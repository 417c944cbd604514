// src/jobs/mod.rs

//! Jobs: what to watch and how to fetch it.

use std::fmt;
use std::sync::Arc;

use crate::filters::FilterSpec;
use crate::types::Guid;

pub mod fetch;
pub mod file;
pub mod registry;
pub mod shell;
pub mod url;

pub use fetch::{FetchError, FetchOutput, FetchRequest, Fetcher};
pub use registry::{JobRegistry, KindBuild};

/// Stable identity of a job: hex-encoded BLAKE3 hash of its location.
pub fn guid_for(location: &str) -> Guid {
    blake3::hash(location.as_bytes()).to_hex().to_string()
}

/// Which fetch failures a job treats as a quiet no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub ignore_connection_errors: bool,
    pub ignore_timeout_errors: bool,
    /// Exact codes (`"404"`) or classes (`"5xx"`).
    pub ignore_http_error_codes: Vec<String>,
}

impl ErrorPolicy {
    pub fn is_ignorable(&self, err: &FetchError) -> bool {
        match err {
            FetchError::Connection(_) => self.ignore_connection_errors,
            FetchError::Timeout(_) => self.ignore_timeout_errors,
            FetchError::HttpStatus { status, .. } => self
                .ignore_http_error_codes
                .iter()
                .any(|pattern| http_code_matches(pattern, *status)),
            _ => false,
        }
    }
}

fn http_code_matches(pattern: &str, status: u16) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let code = status.to_string();
    if pattern.len() != 3 || code.len() != 3 {
        return false;
    }
    pattern
        .chars()
        .zip(code.chars())
        .all(|(p, c)| p == 'x' || p == c)
}

/// A configured, ready-to-run job.
#[derive(Clone)]
pub struct Job {
    /// Position in the configuration; reports are ordered by it.
    pub index: usize,
    pub name: Option<String>,
    pub kind: String,
    pub location: String,
    pub guid: Guid,
    pub filter: Vec<FilterSpec>,
    pub diff_filter: Vec<FilterSpec>,
    pub diff_tool: Option<String>,
    /// Failures tolerated silently before an error is reported.
    pub max_tries: u32,
    /// How many distinct past payloads a new fetch is compared against.
    pub compared_versions: usize,
    pub ignore_cached: bool,
    pub enabled: bool,
    pub error_policy: ErrorPolicy,
    pub fetcher: Arc<dyn Fetcher>,
}

impl Job {
    /// Job with default settings around `fetcher`.
    pub fn new(kind: impl Into<String>, location: impl Into<String>, fetcher: Arc<dyn Fetcher>) -> Self {
        let location = location.into();
        Self {
            index: 0,
            name: None,
            kind: kind.into(),
            guid: guid_for(&location),
            location,
            filter: Vec::new(),
            diff_filter: Vec::new(),
            diff_tool: None,
            max_tries: 0,
            compared_versions: 1,
            ignore_cached: false,
            enabled: true,
            error_policy: ErrorPolicy::default(),
            fetcher,
        }
    }

    pub fn pretty_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.location)
    }

    pub fn ignore_error(&self, err: &FetchError) -> bool {
        self.error_policy.is_ignorable(err)
    }

    /// One-line rendering for logs and reports. HTTP failures show only the
    /// status line; everything else shows the full error.
    pub fn format_error(&self, err: &FetchError) -> String {
        match err {
            FetchError::HttpStatus { status, reason } => format!("{status} {reason}").trim().to_string(),
            FetchError::Shell { stderr, .. } if !stderr.trim().is_empty() => {
                format!("{err}: {}", stderr.trim())
            }
            FetchError::Shell { code, .. } => format!("command exited with status {code}"),
            other => other.to_string(),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("location", &self.location)
            .field("guid", &self.guid)
            .field("max_tries", &self.max_tries)
            .field("compared_versions", &self.compared_versions)
            .finish_non_exhaustive()
    }
}
