// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ChangewatchError, Result};
use crate::filters::FilterSpec;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ChangewatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_jobs(cfg)?;
    validate_global_config(cfg)?;
    validate_jobs(cfg)?;
    Ok(())
}

fn ensure_has_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(ChangewatchError::ConfigError(
            "config must contain at least one [[job]] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.workers == 0 {
        return Err(ChangewatchError::ConfigError(
            "[config].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    let cutoff = cfg.similarity.baseline_cutoff;
    if !(0.0..=1.0).contains(&cutoff) {
        return Err(ChangewatchError::ConfigError(format!(
            "[similarity].baseline_cutoff must lie within 0.0..=1.0 (got {cutoff})"
        )));
    }

    FilterSpec::parse_all(&cfg.config.auto_filters)
        .map_err(|e| ChangewatchError::ConfigError(format!("[config].auto_filters: {e}")))?;

    Ok(())
}

fn validate_jobs(cfg: &RawConfigFile) -> Result<()> {
    for (index, job) in cfg.job.iter().enumerate() {
        let label = job.label(index);
        let implied = job.implied_kinds();

        match (&job.kind, implied.len()) {
            (None, 0) => {
                return Err(ChangewatchError::ConfigError(format!(
                    "job '{label}' needs one of `url`, `command`, `path` or an explicit `kind`"
                )));
            }
            (None, 1) => {}
            (None, _) => {
                return Err(ChangewatchError::ConfigError(format!(
                    "job '{label}' sets more than one of `url`, `command`, `path` ({})",
                    implied.join(", ")
                )));
            }
            (Some(kind), _) if implied.len() > 1 => {
                return Err(ChangewatchError::ConfigError(format!(
                    "job '{label}' of kind '{kind}' sets more than one location key"
                )));
            }
            (Some(_), _) => {}
        }

        if job.compared_versions == 0 {
            return Err(ChangewatchError::ConfigError(format!(
                "job '{label}': compared_versions must be >= 1 (got 0)"
            )));
        }

        if let Some(timeout) = job.timeout {
            if !(timeout.is_finite() && timeout > 0.0) {
                return Err(ChangewatchError::ConfigError(format!(
                    "job '{label}': timeout must be a positive number of seconds"
                )));
            }
        }

        FilterSpec::parse_all(&job.filter)
            .map_err(|e| ChangewatchError::ConfigError(format!("job '{label}': filter: {e}")))?;
        FilterSpec::parse_all(&job.diff_filter)
            .map_err(|e| ChangewatchError::ConfigError(format!("job '{label}': diff_filter: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::load_from_str;
    use crate::errors::ChangewatchError;

    fn config_error(toml: &str) -> String {
        match load_from_str(toml) {
            Err(ChangewatchError::ConfigError(msg)) => msg,
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn defaults_apply() {
        let cfg = load_from_str("[[job]]\nurl = \"https://example.org/\"\n").unwrap();
        assert_eq!(cfg.config.workers, 10);
        assert_eq!(cfg.config.cache, "cache.db");
        assert_eq!(cfg.job[0].compared_versions, 1);
        assert_eq!(cfg.job[0].max_tries, 0);
        assert!(cfg.job[0].enabled);
        assert!(!cfg.display.unchanged);
    }

    #[test]
    fn requires_jobs() {
        assert!(config_error("[config]\nworkers = 2\n").contains("at least one"));
    }

    #[test]
    fn rejects_zero_workers() {
        let msg = config_error("[config]\nworkers = 0\n[[job]]\ncommand = \"true\"\n");
        assert!(msg.contains("workers"));
    }

    #[test]
    fn rejects_ambiguous_location() {
        let msg = config_error("[[job]]\nurl = \"https://a/\"\ncommand = \"true\"\n");
        assert!(msg.contains("more than one"));
        let msg = config_error("[[job]]\nname = \"nothing\"\n");
        assert!(msg.contains("needs one of"));
    }

    #[test]
    fn rejects_bad_filters() {
        let msg = config_error("[[job]]\ncommand = \"true\"\nfilter = [\"grep:(\"]\n");
        assert!(msg.contains("filter"));
    }

    #[test]
    fn rejects_out_of_range_baseline_cutoff() {
        let msg = config_error(
            "[similarity]\nbaseline_cutoff = 1.5\n[[job]]\ncommand = \"true\"\n",
        );
        assert!(msg.contains("baseline_cutoff"));
    }
}
