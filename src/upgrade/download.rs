use async_trait::async_trait;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constants::{
    DEFAULT_MAX_DOWNLOAD_BYTES, DOWNLOAD_CHUNK_TIMEOUT, PROGRESS_MIN_INTERVAL, SIZE_SLACK_PERCENT,
};
use crate::core::UpdateError;
use crate::upgrade::fetcher::build_client;
use crate::upgrade::release::Asset;

/// Callback receiving `(downloaded, total)`; `total` is the asset's declared size.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Fetches an asset body into memory.
#[async_trait]
pub trait AssetDownloader: Send + Sync {
    /// Download `asset` completely.
    ///
    /// Fails with [`UpdateError::SizeExceeded`] past the byte ceiling,
    /// [`UpdateError::Network`] on transport errors or a stalled body, and
    /// [`UpdateError::Cancelled`] when `cancel` fires. Partial buffers never
    /// escape on failure.
    async fn download(
        &self,
        asset: &Asset,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, UpdateError>;
}

/// Rate limiter for progress callbacks.
#[derive(Debug)]
pub struct ProgressThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// True when enough time passed since the last emitted update.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Whether `actual` bytes are within the tolerated slack of the declared size.
///
/// A declared size of zero means "unknown" and always passes.
#[must_use]
pub fn within_size_slack(declared: u64, actual: u64) -> bool {
    if declared == 0 {
        return true;
    }
    let slack = declared * SIZE_SLACK_PERCENT / 100;
    declared.abs_diff(actual) <= slack
}

/// [`AssetDownloader`] streaming over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
    max_bytes: u64,
    chunk_timeout: Duration,
}

impl HttpDownloader {
    pub fn new(max_bytes: u64) -> Result<Self, UpdateError> {
        Ok(Self {
            client: build_client()?,
            max_bytes,
            chunk_timeout: DOWNLOAD_CHUNK_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn size_exceeded(&self, asset: &Asset) -> UpdateError {
        UpdateError::SizeExceeded {
            asset: asset.name.clone(),
            limit: self.max_bytes,
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
            max_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            chunk_timeout: DOWNLOAD_CHUNK_TIMEOUT,
        }
    }
}

#[async_trait]
impl AssetDownloader for HttpDownloader {
    async fn download(
        &self,
        asset: &Asset,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, UpdateError> {
        let url = asset.download_url.as_str();
        if asset.size > self.max_bytes {
            return Err(self.size_exceeded(asset));
        }

        debug!("Downloading {} ({} bytes) from {url}", asset.name, asset.size);

        let request = self.client.get(url).send();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(UpdateError::Cancelled),
            result = tokio::time::timeout(self.chunk_timeout, request) => match result {
                Ok(response) => response.map_err(|e| UpdateError::network(url, &e))?,
                Err(_) => {
                    return Err(UpdateError::Network {
                        url: url.to_string(),
                        status: None,
                        reason: "timed out waiting for response".to_string(),
                    });
                }
            },
        };

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Network {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: format!("HTTP {status}"),
            });
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(self.size_exceeded(asset));
        }

        let capacity = asset.size.min(self.max_bytes);
        let mut buffer = Vec::with_capacity(usize::try_from(capacity).unwrap_or_default());
        let mut throttle = ProgressThrottle::new(PROGRESS_MIN_INTERVAL);
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(UpdateError::Cancelled),
                next = tokio::time::timeout(self.chunk_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Err(_) => {
                    return Err(UpdateError::Network {
                        url: url.to_string(),
                        status: None,
                        reason: format!("no data received for {}s", self.chunk_timeout.as_secs()),
                    });
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(UpdateError::network(url, &e)),
                Ok(Some(Ok(chunk))) => chunk,
            };

            if buffer.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(self.size_exceeded(asset));
            }
            buffer.extend_from_slice(&chunk);

            if throttle.ready(Instant::now()) {
                progress(buffer.len() as u64, asset.size);
            }
        }

        progress(buffer.len() as u64, asset.size);
        debug!("Downloaded {} bytes of {}", buffer.len(), asset.name);
        Ok(buffer)
    }
}
