// src/jobs/registry.rs

//! Explicit kind → constructor table, built at startup.
//!
//! The built-in kinds (`url`, `shell`, `file`) are registered by
//! [`JobRegistry::with_builtins`]; anything else is added through
//! [`JobRegistry::register`] before jobs are built.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::file::FileFetcher;
use super::shell::ShellFetcher;
use super::url::UrlFetcher;
use super::{ErrorPolicy, Fetcher, Job};
use crate::config::{ConfigFile, JobConfig};
use crate::errors::{ChangewatchError, Result};
use crate::filters::FilterSpec;
use crate::types::Guid;

/// What a kind constructor produces: the identity-relevant location and the
/// fetcher for it.
pub struct KindBuild {
    pub location: String,
    pub fetcher: Arc<dyn Fetcher>,
}

pub type JobConstructor = Arc<dyn Fn(&JobConfig) -> Result<KindBuild> + Send + Sync>;

#[derive(Clone, Default)]
pub struct JobRegistry {
    kinds: BTreeMap<String, JobConstructor>,
}

impl JobRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("url", build_url);
        registry.register("shell", build_shell);
        registry.register("file", build_file);
        registry
    }

    /// Add or replace a kind.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&JobConfig) -> Result<KindBuild> + Send + Sync + 'static,
    {
        self.kinds.insert(kind.into(), Arc::new(constructor));
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    /// Explicit `kind`, or the one implied by the location key.
    pub fn resolve_kind(&self, cfg: &JobConfig, index: usize) -> Result<String> {
        let kind = match (&cfg.kind, cfg.implied_kinds().as_slice()) {
            (Some(kind), _) => kind.clone(),
            (None, [implied]) => implied.to_string(),
            _ => {
                return Err(ChangewatchError::ConfigError(format!(
                    "cannot determine kind of job '{}'",
                    cfg.label(index)
                )));
            }
        };
        if !self.kinds.contains_key(&kind) {
            let known: Vec<&str> = self.kinds().collect();
            return Err(ChangewatchError::ConfigError(format!(
                "job '{}' has unknown kind '{kind}' (known: {})",
                cfg.label(index),
                known.join(", ")
            )));
        }
        Ok(kind)
    }

    pub fn build_job(&self, cfg: &JobConfig, index: usize) -> Result<Job> {
        let kind = self.resolve_kind(cfg, index)?;
        let constructor = self
            .kinds
            .get(&kind)
            .ok_or_else(|| ChangewatchError::ConfigError(format!("unknown job kind '{kind}'")))?;
        let KindBuild { location, fetcher } = constructor(cfg)?;

        let label = cfg.label(index);
        let parse = |specs: &[String], what: &str| {
            FilterSpec::parse_all(specs)
                .map_err(|e| ChangewatchError::ConfigError(format!("job '{label}': {what}: {e}")))
        };

        let mut job = Job::new(kind, location, fetcher);
        job.index = index;
        job.name = cfg.name.clone();
        job.filter = parse(&cfg.filter, "filter")?;
        job.diff_filter = parse(&cfg.diff_filter, "diff_filter")?;
        job.diff_tool = cfg.diff_tool.clone();
        job.max_tries = cfg.max_tries;
        job.compared_versions = cfg.compared_versions.max(1);
        job.ignore_cached = cfg.ignore_cached;
        job.enabled = cfg.enabled;
        job.error_policy = ErrorPolicy {
            ignore_connection_errors: cfg.ignore_connection_errors,
            ignore_timeout_errors: cfg.ignore_timeout_errors,
            ignore_http_error_codes: cfg.ignore_http_error_codes.clone(),
        };

        debug!(job = %job.pretty_name(), kind = %job.kind, guid = %job.guid, "built job");
        Ok(job)
    }

    /// Build every enabled job, keeping declaration indices. Two enabled
    /// jobs with the same location are rejected.
    pub fn build_jobs(&self, cfg: &ConfigFile) -> Result<Vec<Job>> {
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut jobs = Vec::new();

        for (index, job_cfg) in cfg.enabled_jobs() {
            let job = self.build_job(job_cfg, index)?;
            if let Some(other) = seen.insert(job.guid.clone(), job.pretty_name().to_string()) {
                return Err(ChangewatchError::ConfigError(format!(
                    "jobs '{other}' and '{}' watch the same location '{}'",
                    job.pretty_name(),
                    job.location
                )));
            }
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// Guids of every configured job, disabled ones included, so that
    /// garbage collection keeps their history.
    pub fn known_guids(&self, cfg: &ConfigFile) -> Result<BTreeSet<Guid>> {
        cfg.job
            .iter()
            .enumerate()
            .map(|(index, job_cfg)| self.build_job(job_cfg, index).map(|job| job.guid))
            .collect()
    }
}

fn required<'a>(value: &'a Option<String>, key: &str, kind: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| ChangewatchError::ConfigError(format!("'{kind}' job requires `{key}`")))
}

fn build_url(cfg: &JobConfig) -> Result<KindBuild> {
    let url = required(&cfg.url, "url", "url")?;
    let timeout = cfg.timeout.map(Duration::from_secs_f64);
    Ok(KindBuild {
        location: url.to_string(),
        fetcher: Arc::new(UrlFetcher::new(url, &cfg.headers, timeout)?),
    })
}

fn build_shell(cfg: &JobConfig) -> Result<KindBuild> {
    let command = required(&cfg.command, "command", "shell")?;
    Ok(KindBuild {
        location: command.to_string(),
        fetcher: Arc::new(ShellFetcher::new(command)),
    })
}

fn build_file(cfg: &JobConfig) -> Result<KindBuild> {
    let path = required(&cfg.path, "path", "file")?;
    Ok(KindBuild {
        location: path.to_string(),
        fetcher: Arc::new(FileFetcher::new(path)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_from_str;
    use crate::jobs::{FetchError, FetchOutput, FetchRequest};
    use async_trait::async_trait;

    struct Constant;

    #[async_trait]
    impl Fetcher for Constant {
        async fn fetch(&self, _request: FetchRequest) -> std::result::Result<FetchOutput, FetchError> {
            Ok(FetchOutput::new("constant"))
        }
    }

    #[test]
    fn infers_builtin_kinds() {
        let cfg = load_from_str(
            "[[job]]\nurl = \"https://example.org/\"\n[[job]]\ncommand = \"date\"\n[[job]]\npath = \"/etc/hosts\"\n",
        )
        .unwrap();
        let jobs = JobRegistry::with_builtins().build_jobs(&cfg).unwrap();
        let kinds: Vec<&str> = jobs.iter().map(|j| j.kind.as_str()).collect();
        assert_eq!(kinds, vec!["url", "shell", "file"]);
        assert_eq!(jobs[2].index, 2);
    }

    #[test]
    fn disabled_jobs_are_skipped_but_keep_indices() {
        let cfg = load_from_str(
            "[[job]]\ncommand = \"a\"\nenabled = false\n[[job]]\ncommand = \"b\"\n",
        )
        .unwrap();
        let jobs = JobRegistry::with_builtins().build_jobs(&cfg).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].index, 1);
    }

    #[test]
    fn duplicate_locations_are_rejected() {
        let cfg = load_from_str("[[job]]\ncommand = \"date\"\n[[job]]\ncommand = \"date\"\n").unwrap();
        let err = JobRegistry::with_builtins().build_jobs(&cfg).unwrap_err();
        assert!(matches!(err, ChangewatchError::ConfigError(msg) if msg.contains("same location")));
    }

    #[test]
    fn custom_kind_via_register() {
        let mut registry = JobRegistry::with_builtins();
        registry.register("constant", |cfg: &JobConfig| {
            Ok(KindBuild {
                location: format!("constant:{}", cfg.name.as_deref().unwrap_or_default()),
                fetcher: Arc::new(Constant),
            })
        });

        let cfg = load_from_str("[[job]]\nkind = \"constant\"\nname = \"x\"\n").unwrap();
        let jobs = registry.build_jobs(&cfg).unwrap();
        assert_eq!(jobs[0].location, "constant:x");

        let err = JobRegistry::with_builtins().build_jobs(&cfg).unwrap_err();
        assert!(matches!(err, ChangewatchError::ConfigError(msg) if msg.contains("unknown kind")));
    }
}
