//! Media fetching over HTTP.
//!
//! Produces a readable byte stream per URL so the archive builder never
//! holds a whole file in memory. Redirects are followed transparently but
//! bounded, and every request carries its own timeout so one stalled
//! connection cannot stall the job indefinitely.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL returned status code {status}: {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),
}

/// A fetched media file as an incrementally consumable byte stream.
pub struct MediaStream {
    /// Server-declared length, when the response carried one.
    pub content_length: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes, FetchError>>,
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("content_length", &self.content_length)
            .field("stream", &"<stream>")
            .finish()
    }
}

/// Source of media byte streams, fakeable in tests.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<MediaStream, FetchError>;
}

/// HTTP media fetcher over reqwest.
pub struct HttpMediaFetcher {
    client: reqwest::Client,
}

impl HttpMediaFetcher {
    /// Build a fetcher with a per-request timeout and a bounded redirect
    /// policy. `max_redirects` caps redirect chains; a chain that exceeds it
    /// fails the fetch rather than looping.
    pub fn new(timeout: Duration, max_redirects: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .user_agent("picpack-worker/1.0")
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<MediaStream, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        // Only allow HTTP/HTTPS
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = status.as_u16(), "Media fetch returned non-2xx");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        let owned_url = url.to_string();
        let stream = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| FetchError::RequestFailed {
                    url: owned_url.clone(),
                    reason: e.to_string(),
                })
            })
            .boxed();

        Ok(MediaStream {
            content_length,
            stream,
        })
    }
}
