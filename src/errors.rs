// src/errors.rs

//! Crate-wide error type.
//!
//! Per-job failures (fetch/filter) never show up here: they are captured on
//! the `JobState` and classified. Anything that reaches `ChangewatchError`
//! aborts the run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChangewatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("The {0} cache backend is read-only")]
    ReadOnlyBackend(&'static str),

    #[error("Diff filter error: {0}")]
    DiffFilter(#[from] crate::filters::FilterError),

    #[error("Diff tool `{command}` failed with exit code {code}")]
    DiffTool { command: String, code: i32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ChangewatchError {
    fn from(err: sqlx::Error) -> Self {
        ChangewatchError::Storage(format!("sqlite: {err}"))
    }
}

impl From<redis::RedisError> for ChangewatchError {
    fn from(err: redis::RedisError) -> Self {
        ChangewatchError::Storage(format!("redis: {err}"))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ChangewatchError>;
