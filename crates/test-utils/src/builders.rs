#![allow(dead_code)]

use std::sync::Arc;

use changewatch::config::{
    ConfigFile, ConfigSection, DisplaySection, JobConfig, RawConfigFile, ReportSection,
    SimilaritySection,
};
use changewatch::filters::FilterSpec;
use changewatch::jobs::{Fetcher, Job};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                display: DisplaySection::default(),
                similarity: SimilaritySection::default(),
                report: ReportSection::default(),
                job: Vec::new(),
            },
        }
    }

    pub fn with_job(mut self, job: JobConfig) -> Self {
        self.config.job.push(job);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.config.workers = workers;
        self
    }

    pub fn with_cache(mut self, cache: &str) -> Self {
        self.config.config.cache = cache.to_string();
        self
    }

    pub fn with_auto_filter(mut self, spec: &str) -> Self {
        self.config.config.auto_filters.push(spec.to_string());
        self
    }

    pub fn show_unchanged(mut self) -> Self {
        self.config.display.unchanged = true;
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobConfig`.
pub struct JobConfigBuilder {
    job: JobConfig,
}

impl JobConfigBuilder {
    pub fn command(cmd: &str) -> Self {
        Self {
            job: JobConfig {
                command: Some(cmd.to_string()),
                compared_versions: 1,
                enabled: true,
                ..JobConfig::default()
            },
        }
    }

    pub fn url(url: &str) -> Self {
        Self {
            job: JobConfig {
                url: Some(url.to_string()),
                compared_versions: 1,
                enabled: true,
                ..JobConfig::default()
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.job.name = Some(name.to_string());
        self
    }

    pub fn filter(mut self, spec: &str) -> Self {
        self.job.filter.push(spec.to_string());
        self
    }

    pub fn max_tries(mut self, n: u32) -> Self {
        self.job.max_tries = n;
        self
    }

    pub fn compared_versions(mut self, n: usize) -> Self {
        self.job.compared_versions = n;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.job.enabled = false;
        self
    }

    pub fn build(self) -> JobConfig {
        self.job
    }
}

/// Builder for a ready-to-run [`Job`] around any fetcher.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(location: &str, fetcher: impl Fetcher + 'static) -> Self {
        Self {
            job: Job::new("test", location, Arc::new(fetcher)),
        }
    }

    pub fn index(mut self, index: usize) -> Self {
        self.job.index = index;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.job.name = Some(name.to_string());
        self
    }

    pub fn max_tries(mut self, n: u32) -> Self {
        self.job.max_tries = n;
        self
    }

    pub fn compared_versions(mut self, n: usize) -> Self {
        self.job.compared_versions = n;
        self
    }

    pub fn filter(mut self, spec: &str) -> Self {
        self.job.filter.push(spec.parse::<FilterSpec>().expect("valid filter spec"));
        self
    }

    pub fn diff_tool(mut self, tool: &str) -> Self {
        self.job.diff_tool = Some(tool.to_string());
        self
    }

    pub fn ignore_http(mut self, pattern: &str) -> Self {
        self.job
            .error_policy
            .ignore_http_error_codes
            .push(pattern.to_string());
        self
    }

    pub fn ignore_connection_errors(mut self) -> Self {
        self.job.error_policy.ignore_connection_errors = true;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}
