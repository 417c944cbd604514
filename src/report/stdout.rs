// src/report/stdout.rs

//! Plain-text reporter printing to stdout.

use std::io::Write;

use async_trait::async_trait;

use super::{FinishedReport, Reporter};
use crate::config::ReportSection;
use crate::errors::Result;
use crate::handler::JobState;
use crate::types::Verb;

#[derive(Debug, Clone)]
pub struct StdoutReporter {
    settings: ReportSection,
}

impl StdoutReporter {
    pub fn new(settings: ReportSection) -> Self {
        Self { settings }
    }

    /// Summary list, then one detail block per job, then a footer.
    pub fn render(&self, report: &FinishedReport) -> String {
        let width = self.settings.line_length;
        let mut summary = Vec::new();
        let mut details = Vec::new();

        for state in &report.entries {
            let Some(verb) = state.verb else { continue };
            let name = state.job.pretty_name();
            summary.push(format!("{}: {name}", verb_label(verb)));

            let location = if name == state.job.location {
                name.to_string()
            } else {
                format!("{name} ({})", state.job.location)
            };
            let sep = "-".repeat(width);
            details.push(sep.clone());
            details.push(format!("{}: {location}", verb_label(verb)));
            details.push(sep.clone());
            if let Some(content) = detail_content(state, verb) {
                details.push(content);
                details.push(sep);
            }
            details.push(String::new());
        }

        if summary.is_empty() {
            return String::new();
        }

        let mut lines = Vec::new();
        let sep = "=".repeat(width);
        lines.push(sep.clone());
        lines.extend(
            summary
                .iter()
                .enumerate()
                .map(|(i, line)| format!("{:02}. {line}", i + 1)),
        );
        lines.push(sep);
        lines.push(String::new());

        if self.settings.details {
            lines.extend(details);
        }
        if self.settings.footer {
            lines.push("-- ".to_string());
            lines.push(format!(
                "changewatch {}, checked {} jobs in {:.2} seconds",
                env!("CARGO_PKG_VERSION"),
                report.entries.len(),
                report.duration.as_secs_f64()
            ));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

fn verb_label(verb: Verb) -> String {
    verb.as_str().to_uppercase()
}

fn detail_content(state: &JobState, verb: Verb) -> Option<String> {
    match verb {
        Verb::Error => state.traceback.as_deref().map(|t| t.trim().to_string()),
        Verb::Unchanged => state.old_data.clone(),
        Verb::New => None,
        Verb::Changed => state
            .cached_diff()
            .filter(|d| !d.is_empty())
            .map(|d| d.trim_end().to_string()),
    }
}

#[async_trait]
impl Reporter for StdoutReporter {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn submit(&self, report: &FinishedReport) -> Result<()> {
        let text = self.render(report);
        if text.is_empty() {
            return Ok(());
        }
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}
