// src/logging.rs

//! `tracing` subscriber setup.
//!
//! The level comes from `--log-level`, else from `CHANGEWATCH_LOG`, else
//! `info`. Output goes to stderr because stdout carries the report.

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "CHANGEWATCH_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let level = resolve_level(cli_level, env_value.as_deref());

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("installing log subscriber")
}

fn resolve_level(cli_level: Option<LogLevel>, env_value: Option<&str>) -> Level {
    if let Some(level) = cli_level {
        return level.into();
    }
    env_value
        .map(|s| s.trim().to_ascii_lowercase())
        .and_then(|s| match s.as_str() {
            "warning" => Some(Level::WARN),
            other => other.parse().ok(),
        })
        .unwrap_or(Level::INFO)
}
