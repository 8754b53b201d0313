use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::constants::{METADATA_TIMEOUT, USER_AGENT};
use crate::core::UpdateError;
use crate::upgrade::release::{RawRelease, Release};

/// Resolves release metadata.
///
/// Implementations never retry; the orchestrator decides whether a failure is
/// worth another attempt.
#[async_trait]
pub trait ReleaseFetcher: Send + Sync {
    /// The newest published release.
    async fn fetch_latest(&self) -> Result<Release, UpdateError>;

    /// The release published under `tag` (with or without a leading `v`).
    async fn fetch_by_tag(&self, tag: &str) -> Result<Release, UpdateError>;
}

/// [`ReleaseFetcher`] backed by the GitHub releases REST API.
///
/// Requests go to `{api_base}/repos/{repo}/releases/latest` and
/// `{api_base}/repos/{repo}/releases/tags/{tag}`.
#[derive(Debug, Clone)]
pub struct GithubFetcher {
    client: reqwest::Client,
    api_base: String,
    repo: String,
    timeout: Duration,
}

impl GithubFetcher {
    /// Create a fetcher for `repo` (`owner/name`).
    pub fn new(api_base: &str, repo: &str) -> Result<Self, UpdateError> {
        let client = build_client()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            timeout: METADATA_TIMEOUT,
        })
    }

    /// Override the per-request deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn latest_url(&self) -> String {
        format!("{}/repos/{}/releases/latest", self.api_base, self.repo)
    }

    /// Tags are normalized to carry a leading `v`.
    #[must_use]
    pub fn tag_url(&self, tag: &str) -> String {
        format!(
            "{}/repos/{}/releases/tags/v{}",
            self.api_base,
            self.repo,
            tag.trim().trim_start_matches('v')
        )
    }

    async fn fetch(&self, url: &str) -> Result<Release, UpdateError> {
        debug!("Fetching release metadata from {url}");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpdateError::network(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Network {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: format!("HTTP {status}"),
            });
        }

        let body = response.bytes().await.map_err(|e| UpdateError::network(url, &e))?;
        let raw: RawRelease = serde_json::from_slice(&body).map_err(|e| UpdateError::Protocol {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Release::from_raw(raw, url)
    }
}

#[async_trait]
impl ReleaseFetcher for GithubFetcher {
    async fn fetch_latest(&self) -> Result<Release, UpdateError> {
        self.fetch(&self.latest_url()).await
    }

    async fn fetch_by_tag(&self, tag: &str) -> Result<Release, UpdateError> {
        self.fetch(&self.tag_url(tag)).await
    }
}

/// HTTP client shared by the fetcher, downloader and verifier.
pub(crate) fn build_client() -> Result<reqwest::Client, UpdateError> {
    reqwest::Client::builder().user_agent(USER_AGENT).build().map_err(|e| UpdateError::Config {
        message: format!("failed to build HTTP client: {e}"),
    })
}
