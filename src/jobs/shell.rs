// src/jobs/shell.rs

//! `shell` job kind: run a command and capture its standard output.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::fetch::{FetchError, FetchOutput, FetchRequest, Fetcher};

#[derive(Debug, Clone)]
pub struct ShellFetcher {
    command: String,
}

impl ShellFetcher {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Build a shell command appropriate for the platform.
pub(crate) fn shell_command(script: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    }
}

#[async_trait]
impl Fetcher for ShellFetcher {
    async fn fetch(&self, _request: FetchRequest) -> Result<FetchOutput, FetchError> {
        info!(cmd = %self.command, "running shell job");

        let mut cmd = shell_command(&self.command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await?;
        let code = output.status.code().unwrap_or(-1);
        debug!(cmd = %self.command, exit_code = code, "shell job exited");

        if !output.status.success() {
            return Err(FetchError::Shell {
                code,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(FetchOutput::new(String::from_utf8_lossy(&output.stdout)))
    }
}
