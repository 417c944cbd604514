// src/filters/mod.rs

//! Text transformations applied to fetched content and to diffs.
//!
//! Filter specs are written as `kind[:argument]`, e.g. `strip`,
//! `grep:^Version`, `grepi:timestamp`.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unknown filter '{0}'")]
    Unknown(String),

    #[error("filter '{0}' requires an argument (e.g. '{0}:<regex>')")]
    MissingArgument(String),

    #[error("filter '{spec}' has an invalid regex: {source}")]
    BadRegex {
        spec: String,
        #[source]
        source: regex::Error,
    },

    #[error("filter '{spec}' failed: {reason}")]
    Failed { spec: String, reason: String },
}

/// The closed set of built-in filters.
#[derive(Debug, Clone)]
pub enum FilterKind {
    /// Trim leading/trailing whitespace of the whole content.
    Strip,
    /// Sort lines.
    Sort,
    /// Reverse line order.
    Reverse,
    /// Keep only lines matching the regex.
    Grep(Regex),
    /// Drop lines matching the regex.
    GrepInverse(Regex),
    AsciiLower,
}

/// A parsed filter spec.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    raw: String,
    kind: FilterKind,
}

impl FilterSpec {
    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn parse_all<S: AsRef<str>>(specs: &[S]) -> Result<Vec<FilterSpec>, FilterError> {
        specs.iter().map(|s| s.as_ref().parse()).collect()
    }
}

impl PartialEq for FilterSpec {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for FilterSpec {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_string();
        let (name, arg) = match raw.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (raw.as_str(), None),
        };

        let regex_arg = |arg: Option<&str>| -> Result<Regex, FilterError> {
            let arg = arg
                .filter(|a| !a.is_empty())
                .ok_or_else(|| FilterError::MissingArgument(name.to_string()))?;
            Regex::new(arg).map_err(|source| FilterError::BadRegex {
                spec: raw.clone(),
                source,
            })
        };

        let kind = match name {
            "strip" => FilterKind::Strip,
            "sort" => FilterKind::Sort,
            "reverse" => FilterKind::Reverse,
            "ascii-lower" => FilterKind::AsciiLower,
            "grep" => FilterKind::Grep(regex_arg(arg)?),
            "grepi" => FilterKind::GrepInverse(regex_arg(arg)?),
            other => return Err(FilterError::Unknown(other.to_string())),
        };

        Ok(FilterSpec { raw, kind })
    }
}

/// Applies filter specs to content.
pub trait FilterChain: Send + Sync {
    /// Filters run on every job before its own filters.
    fn auto_filters(&self) -> &[FilterSpec];

    fn apply_one(&self, content: &str, spec: &FilterSpec) -> Result<String, FilterError>;

    /// Apply `specs` in order, without the automatic filters.
    fn apply_specs(&self, content: &str, specs: &[FilterSpec]) -> Result<String, FilterError> {
        let mut data = content.to_string();
        for spec in specs {
            trace!(filter = %spec, "applying filter");
            data = self.apply_one(&data, spec)?;
        }
        Ok(data)
    }

    /// Automatic filters first, then `specs`.
    fn apply(&self, content: &str, specs: &[FilterSpec]) -> Result<String, FilterError> {
        let data = self.apply_specs(content, self.auto_filters())?;
        self.apply_specs(&data, specs)
    }
}

/// [`FilterChain`] backed by [`FilterKind`].
#[derive(Debug, Clone, Default)]
pub struct BuiltinFilters {
    auto: Vec<FilterSpec>,
}

impl BuiltinFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_filters(auto: Vec<FilterSpec>) -> Self {
        Self { auto }
    }
}

impl FilterChain for BuiltinFilters {
    fn auto_filters(&self) -> &[FilterSpec] {
        &self.auto
    }

    fn apply_one(&self, content: &str, spec: &FilterSpec) -> Result<String, FilterError> {
        let out = match spec.kind() {
            FilterKind::Strip => content.trim().to_string(),
            FilterKind::Sort => {
                let mut lines: Vec<&str> = content.lines().collect();
                lines.sort_unstable();
                join_lines(lines, content)
            }
            FilterKind::Reverse => join_lines(content.lines().rev().collect(), content),
            FilterKind::Grep(re) => join_lines(content.lines().filter(|l| re.is_match(l)).collect(), content),
            FilterKind::GrepInverse(re) => {
                join_lines(content.lines().filter(|l| !re.is_match(l)).collect(), content)
            }
            FilterKind::AsciiLower => content.to_ascii_lowercase(),
        };
        Ok(out)
    }
}

/// Join lines, keeping a trailing newline if the input had one.
fn join_lines(lines: Vec<&str>, original: &str) -> String {
    let mut out = lines.join("\n");
    if original.ends_with('\n') && !out.is_empty() {
        out.push('\n');
    }
    out
}
