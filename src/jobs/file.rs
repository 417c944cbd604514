// src/jobs/file.rs

//! `file` job kind: read a local file.

use std::path::PathBuf;

use async_trait::async_trait;

use super::fetch::{FetchError, FetchOutput, FetchRequest, Fetcher};

#[derive(Debug, Clone)]
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    /// Accepts plain paths and `file://` URLs.
    pub fn new(path: &str) -> Self {
        let path = path.strip_prefix("file://").unwrap_or(path);
        Self {
            path: PathBuf::from(path),
        }
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, _request: FetchRequest) -> Result<FetchOutput, FetchError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(FetchOutput::new(String::from_utf8_lossy(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.txt");
        std::fs::write(&path, "content").unwrap();

        let fetcher = FileFetcher::new(&format!("file://{}", path.display()));
        let out = fetcher.fetch(FetchRequest::default()).await.unwrap();
        assert_eq!(out.content, "content");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = FileFetcher::new("/definitely/not/here")
            .fetch(FetchRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));
    }
}
