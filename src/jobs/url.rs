// src/jobs/url.rs

//! `url` job kind: HTTP GET with conditional-request support.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, USER_AGENT};
use reqwest::StatusCode;
use tracing::debug;

use super::fetch::{FetchError, FetchOutput, FetchRequest, Fetcher};
use crate::errors::{ChangewatchError, Result};
use crate::types::Timestamp;

const DEFAULT_USER_AGENT: &str = concat!("changewatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct UrlFetcher {
    url: String,
    client: reqwest::Client,
}

impl UrlFetcher {
    pub fn new(
        url: impl Into<String>,
        headers: &BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let url = url.into();
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ChangewatchError::ConfigError(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ChangewatchError::ConfigError(format!("invalid value for header '{name}': {e}"))
            })?;
            default_headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder().default_headers(default_headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ChangewatchError::ConfigError(format!("building HTTP client for {url}: {e}")))?;

        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// RFC 7231 IMF-fixdate, as expected by `If-Modified-Since`.
pub fn http_date(ts: Timestamp) -> Option<String> {
    let secs = ts.floor() as i64;
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

#[async_trait]
impl Fetcher for UrlFetcher {
    async fn fetch(&self, request: FetchRequest) -> std::result::Result<FetchOutput, FetchError> {
        let mut req = self.client.get(&self.url);
        if !request.ignore_cached {
            if let Some(ref etag) = request.etag {
                req = req.header(IF_NONE_MATCH, etag);
            }
            if let Some(date) = request.since.and_then(http_date) {
                req = req.header(IF_MODIFIED_SINCE, date);
            }
        }

        let response = req.send().await?;
        let status = response.status();
        debug!(url = %self.url, status = status.as_u16(), "HTTP response");

        if status == StatusCode::NOT_MODIFIED {
            return Err(FetchError::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content = response.text().await?;

        Ok(FetchOutput::new(content).with_etag(etag))
    }
}
