use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;

/// Stable job identifier derived from the job location.
pub type Guid = String;

/// Seconds since the Unix epoch, with sub-second precision.
pub type Timestamp = f64;

/// Current wall-clock time as a [`Timestamp`].
pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Classification outcome of a single job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    New,
    Changed,
    Unchanged,
    Error,
}

impl Verb {
    pub const ALL: [Verb; 4] = [Verb::New, Verb::Changed, Verb::Unchanged, Verb::Error];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::New => "new",
            Verb::Changed => "changed",
            Verb::Unchanged => "unchanged",
            Verb::Error => "error",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(Verb::New),
            "changed" => Ok(Verb::Changed),
            "unchanged" => Ok(Verb::Unchanged),
            "error" => Ok(Verb::Error),
            other => Err(format!(
                "invalid verb: {other} (expected new, changed, unchanged or error)"
            )),
        }
    }
}
