// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file and return the raw `RawConfigFile`.
///
/// Only deserializes; use [`load_and_validate`] for the semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = ?path, "read config file");
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Parse and validate configuration held in memory.
pub fn load_from_str(contents: &str) -> Result<ConfigFile> {
    let raw: RawConfigFile = toml::from_str(contents)?;
    ConfigFile::try_from(raw)
}

/// Load a configuration file from path and validate it.
///
/// Checks job count, pool width, location keys, `compared_versions` and
/// filter specs. Guid collisions are detected when the job registry builds
/// the jobs, since custom kinds compute their own locations.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    ConfigFile::try_from(raw_config)
}

/// `changewatch.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("changewatch.toml")
}
