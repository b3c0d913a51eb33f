//! Remote transport for artifact downloads.

use crate::error::DownloadError;
use futures::future::{BoxFuture, FutureExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::path::Path;

/// What a fetch produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// The body was written to the destination.
    Fetched,
    /// The remote has no such file.
    NotFound,
}

/// Fetches one URL into a local file.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<FetchStatus, DownloadError>>;
}

/// `reqwest` backed fetcher.
///
/// A JSON response is treated as an indirection: its `signedUrl` field names
/// the real location, which is then downloaded instead.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch_inner(&self, url: &str, dest: &Path) -> Result<FetchStatus, DownloadError> {
        log::debug!("[Download] GET {}", url);
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            log::debug!("[Download] 404 for {}", url);
            return Ok(FetchStatus::NotFound);
        }
        if !response.status().is_success() {
            return Err(DownloadError::Failed {
                file: dest.display().to_string(),
                source_url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        let response = if is_json {
            let body: serde_json::Value = response.json().await?;
            let signed = body
                .get("signedUrl")
                .and_then(|v| v.as_str())
                .ok_or_else(|| DownloadError::MissingSignedUrl(url.to_string()))?;
            log::debug!("[Download] following signed URL for {}", url);
            let signed_response = self.client.get(signed).send().await?;
            if signed_response.status() == StatusCode::NOT_FOUND {
                return Ok(FetchStatus::NotFound);
            }
            signed_response.error_for_status()?
        } else {
            response
        };

        let bytes = response.bytes().await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        log::debug!("[Download] wrote {} bytes to {}", bytes.len(), dest.display());
        Ok(FetchStatus::Fetched)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<FetchStatus, DownloadError>> {
        self.fetch_inner(url, dest).boxed()
    }
}
