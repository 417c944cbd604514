// src/handler/diff.rs

//! Diff generation: built-in unified diff or an external tool.

use std::process::Stdio;

use chrono::{Local, TimeZone};
use similar::TextDiff;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{ChangewatchError, Result};
use crate::types::Timestamp;

/// Lines of context around each hunk.
const CONTEXT_LINES: usize = 3;

/// Unified diff with `@\t<date>` from/to markers. Line endings are
/// normalised, so a missing final newline is not reported as a change.
pub fn unified_diff(
    old: &str,
    new: &str,
    old_timestamp: Option<Timestamp>,
    new_timestamp: Option<Timestamp>,
) -> String {
    let old = normalise_lines(old);
    let new = normalise_lines(new);
    TextDiff::from_lines(&old, &new)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&marker(old_timestamp), &marker(new_timestamp))
        .to_string()
}

fn normalise_lines(text: &str) -> String {
    text.lines().map(|l| format!("{l}\n")).collect()
}

fn marker(ts: Option<Timestamp>) -> String {
    let date = ts
        .and_then(|ts| {
            let secs = ts.floor() as i64;
            let nanos = ((ts - ts.floor()) * 1e9) as u32;
            Local.timestamp_opt(secs, nanos).single()
        })
        .map(|dt| dt.to_rfc2822())
        .unwrap_or_default();
    format!("@\t{date}")
}

/// Run `tool old_file new_file` through the shell.
///
/// Exit status 0 means "no difference" (empty output), 1 means the tool's
/// stdout is the diff. Anything else is an error.
pub async fn external_diff(tool: &str, old: &str, new: &str) -> Result<String> {
    let dir = tempfile::tempdir()?;
    let old_path = dir.path().join("old");
    let new_path = dir.path().join("new");
    tokio::fs::write(&old_path, old).await?;
    tokio::fs::write(&new_path, new).await?;

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C")
            .arg(format!("{tool} \"{}\" \"{}\"", old_path.display(), new_path.display()));
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c")
            .arg(format!("{tool} \"$@\""))
            .arg("changewatch-diff")
            .arg(&old_path)
            .arg(&new_path);
        c
    };
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    info!(tool = %tool, "running external diff tool");
    let output = cmd.output().await?;
    let code = output.status.code().unwrap_or(-1);
    debug!(tool = %tool, exit_code = code, "diff tool exited");

    match code {
        0 => Ok(String::new()),
        1 => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
        _ => Err(ChangewatchError::DiffTool {
            command: tool.to_string(),
            code,
        }),
    }
}
