// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `changewatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "changewatch",
    version,
    about = "Fetch watched resources, compare them with the cached history and report changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "changewatch.toml")]
    pub config: String,

    /// Cache location, overriding `[config].cache`
    /// (`cache.db`, `redis://host:6379/0`, `dir:/path`, `memory:`).
    #[arg(long, value_name = "LOCATION")]
    pub cache: Option<String>,

    /// Worker pool width, overriding `[config].workers`.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CHANGEWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the jobs, but don't fetch anything.
    #[arg(long)]
    pub dry_run: bool,

    /// List jobs with their guids and exit.
    #[arg(long)]
    pub list: bool,

    /// Remove cached data of jobs no longer configured and trim history,
    /// keeping RETAIN snapshots per job (default: `[config].retain`).
    #[arg(long, value_name = "RETAIN", num_args = 0..=1)]
    pub gc_cache: Option<Option<usize>>,

    /// Copy the complete history from another cache into the configured one.
    #[arg(long, value_name = "LOCATION")]
    pub migrate_from: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
