// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::Verb;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// workers = 10
/// cache = "cache.db"
///
/// [display]
/// unchanged = false
///
/// [[job]]
/// name = "homepage"
/// url = "https://example.org/"
/// filter = ["strip"]
///
/// [[job]]
/// command = "uname -r"
/// ```
///
/// Everything except the job list has defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub display: DisplaySection,

    #[serde(default)]
    pub similarity: SimilaritySection,

    #[serde(default)]
    pub report: ReportSection,

    /// All jobs from `[[job]]`, in declaration order.
    #[serde(default)]
    pub job: Vec<JobConfig>,
}

/// Validated configuration. Built through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub display: DisplaySection,
    pub similarity: SimilaritySection,
    pub report: ReportSection,
    pub job: Vec<JobConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            display: raw.display,
            similarity: raw.similarity,
            report: raw.report,
            job: raw.job,
        }
    }

    pub fn enabled_jobs(&self) -> impl Iterator<Item = (usize, &JobConfig)> {
        self.job.iter().enumerate().filter(|(_, j)| j.enabled)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Worker pool width.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Cache location (`cache.db`, `redis://host/0`, `dir:/path`, `memory:`).
    #[serde(default = "default_cache")]
    pub cache: String,

    /// Snapshots kept per guid by `--gc-cache` when no count is given.
    #[serde(default = "default_retain")]
    pub retain: usize,

    /// Filters applied to every job before its own `filter` list.
    #[serde(default)]
    pub auto_filters: Vec<String>,
}

fn default_workers() -> usize {
    10
}

fn default_cache() -> String {
    "cache.db".to_string()
}

fn default_retain() -> usize {
    1
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            cache: default_cache(),
            retain: default_retain(),
            auto_filters: Vec::new(),
        }
    }
}

/// `[display]` section: which outcomes reach the reporters.
#[derive(Debug, Clone, Deserialize)]
pub struct DisplaySection {
    #[serde(default = "default_true")]
    pub new: bool,
    #[serde(default = "default_true")]
    pub changed: bool,
    #[serde(default)]
    pub unchanged: bool,
    #[serde(default = "default_true")]
    pub error: bool,
    /// Report `changed` jobs whose (filtered) diff came out empty.
    #[serde(default = "default_true")]
    pub empty_diff: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            new: true,
            changed: true,
            unchanged: false,
            error: true,
            empty_diff: true,
        }
    }
}

impl DisplaySection {
    pub fn shows(&self, verb: Verb) -> bool {
        match verb {
            Verb::New => self.new,
            Verb::Changed => self.changed,
            Verb::Unchanged => self.unchanged,
            Verb::Error => self.error,
        }
    }
}

/// `[similarity]` section: near-match reconciliation against history.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimilaritySection {
    /// Ratio at or above which a near match becomes the diff baseline.
    #[serde(default = "default_baseline_cutoff")]
    pub baseline_cutoff: f64,
}

fn default_baseline_cutoff() -> f64 {
    0.6
}

impl Default for SimilaritySection {
    fn default() -> Self {
        Self {
            baseline_cutoff: default_baseline_cutoff(),
        }
    }
}

/// `[report]` section: text output layout.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportSection {
    #[serde(default = "default_line_length")]
    pub line_length: usize,
    /// Print diffs and error details below the summary.
    #[serde(default = "default_true")]
    pub details: bool,
    #[serde(default = "default_true")]
    pub footer: bool,
}

fn default_line_length() -> usize {
    75
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            line_length: default_line_length(),
            details: true,
            footer: true,
        }
    }
}

/// One `[[job]]` entry.
///
/// The kind is either given explicitly (`kind = "url"`) or inferred from
/// which of `url` / `command` / `path` is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub filter: Vec<String>,

    #[serde(default)]
    pub diff_filter: Vec<String>,

    /// External diff command; receives the old and new file as arguments.
    #[serde(default)]
    pub diff_tool: Option<String>,

    #[serde(default)]
    pub max_tries: u32,

    #[serde(default = "default_compared_versions")]
    pub compared_versions: usize,

    #[serde(default)]
    pub ignore_cached: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra request headers (`url` jobs).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request timeout in seconds (`url` jobs).
    #[serde(default)]
    pub timeout: Option<f64>,

    #[serde(default)]
    pub ignore_connection_errors: bool,

    #[serde(default)]
    pub ignore_timeout_errors: bool,

    #[serde(default)]
    pub ignore_http_error_codes: Vec<String>,

    /// Free-form settings for kinds registered outside this crate.
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
}

fn default_compared_versions() -> usize {
    1
}

impl JobConfig {
    /// Which of the location keys are set, by the kind they imply.
    pub fn implied_kinds(&self) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        if self.url.is_some() {
            kinds.push("url");
        }
        if self.command.is_some() {
            kinds.push("shell");
        }
        if self.path.is_some() {
            kinds.push("file");
        }
        kinds
    }

    /// Name for error messages before the job is built.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .or_else(|| self.url.clone())
            .or_else(|| self.command.clone())
            .or_else(|| self.path.clone())
            .unwrap_or_else(|| format!("#{}", index + 1))
    }
}
