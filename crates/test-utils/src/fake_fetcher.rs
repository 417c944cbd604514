use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use changewatch::jobs::{FetchError, FetchOutput, FetchRequest, Fetcher};

/// One scripted fetch result.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Content(String),
    ContentWithEtag(String, String),
    NotModified,
    Http(u16),
    Connection,
    Timeout,
    Shell(i32),
}

impl Step {
    pub fn content(s: &str) -> Self {
        Step::Content(s.to_string())
    }

    fn into_result(self) -> Result<FetchOutput, FetchError> {
        match self {
            Step::Content(c) => Ok(FetchOutput::new(c)),
            Step::ContentWithEtag(c, etag) => Ok(FetchOutput::new(c).with_etag(Some(etag))),
            Step::NotModified => Err(FetchError::NotModified),
            Step::Http(status) => Err(FetchError::HttpStatus {
                status,
                reason: "scripted".to_string(),
            }),
            Step::Connection => Err(FetchError::Connection("scripted refusal".to_string())),
            Step::Timeout => Err(FetchError::Timeout("scripted timeout".to_string())),
            Step::Shell(code) => Err(FetchError::Shell {
                code,
                stderr: String::new(),
            }),
        }
    }
}

/// A fetcher that:
/// - replays a queue of [`Step`]s, one per call (the last step repeats)
/// - records every [`FetchRequest`] it receives.
///
/// Clones share the same queue and log, so a test can keep a handle while
/// the job owns another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFetcher {
    steps: Arc<Mutex<VecDeque<Step>>>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
    on_calling_thread: bool,
}

impl ScriptedFetcher {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Always returns `content`.
    pub fn constant(content: &str) -> Self {
        Self::new([Step::content(content)])
    }

    pub fn on_calling_thread(mut self) -> Self {
        self.on_calling_thread = true;
        self
    }

    /// Queue more steps after the existing ones.
    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    /// Replace the queue.
    pub fn set(&self, steps: impl IntoIterator<Item = Step>) {
        *self.steps.lock().unwrap() = steps.into_iter().collect();
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutput, FetchError> {
        self.requests.lock().unwrap().push(request);
        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            }
        };
        step.map(Step::into_result)
            .unwrap_or_else(|| Err(FetchError::Other("no scripted step".to_string())))
    }

    fn requires_calling_thread(&self) -> bool {
        self.on_calling_thread
    }
}
