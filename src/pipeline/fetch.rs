//! Media fetcher: bounded-concurrency downloads into the cache.
//!
//! ## Algorithm
//!
//! 1. Deduplicate the input URLs (first occurrence wins).
//! 2. `lookup` each URL in the [`CacheStore`]; hits become
//!    [`FetchResult::CachedHit`] without any network call.
//! 3. Misses run through `buffer_unordered(concurrency)`, so at most
//!    `concurrency` downloads are in flight regardless of how many URLs there
//!    are. Outcomes arrive in completion order.
//! 4. A successful body is committed to the cache; a URL whose attempts are
//!    all exhausted becomes [`FetchResult::Failed`].
//!
//! Only a cache write failure aborts the batch: if the cache directory is
//! unwritable no further media can be resolved.
//!
//! ## Retry Strategy
//!
//! Each attempt is one GET bounded by the client timeout. Any non-2xx
//! status, timeout, connection error or empty body is retried until
//! `max_attempts` is reached, waiting `retry_backoff_ms * 2^(n-2)` before
//! attempt `n`. A body over the size cap is never retried.

use crate::config::ExportConfig;
use crate::error::{ExportError, MediaError};
use crate::output::{FetchOutcome, FetchResult};
use crate::pipeline::cache::CacheStore;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Attempt bound and backoff schedule for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Delay to wait before attempt `attempt` (1-based). The first attempt
    /// starts immediately.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt <= 1 {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        Some(self.base_backoff.saturating_mul(factor))
    }
}

/// Outcome of a single GET.
#[derive(Debug)]
enum AttemptError {
    Retryable(String),
    Permanent(MediaError),
}

/// Build the HTTP client used for media and font downloads.
pub fn build_client(config: &ExportConfig) -> Result<reqwest::Client, ExportError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.download_timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ExportError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Download `url` with retries, returning the full body.
///
/// `max_bytes = None` disables the size cap.
pub async fn download_with_retry(
    client: &reqwest::Client,
    url: &str,
    policy: RetryPolicy,
    max_bytes: Option<u64>,
) -> Result<Vec<u8>, MediaError> {
    let mut last_err = String::from("no attempt made");

    for attempt in 1..=policy.max_attempts {
        if let Some(delay) = policy.delay_before(attempt) {
            warn!(
                "{}: retry {}/{} after {}ms",
                url,
                attempt,
                policy.max_attempts,
                delay.as_millis()
            );
            sleep(delay).await;
        }

        match attempt_once(client, url, max_bytes).await {
            Ok(bytes) => return Ok(bytes),
            Err(AttemptError::Permanent(e)) => return Err(e),
            Err(AttemptError::Retryable(reason)) => {
                debug!("{}: attempt {} failed: {}", url, attempt, reason);
                last_err = reason;
            }
        }
    }

    Err(MediaError::DownloadFailed {
        url: url.to_string(),
        attempts: policy.max_attempts,
        reason: last_err,
    })
}

async fn attempt_once(
    client: &reqwest::Client,
    url: &str,
    max_bytes: Option<u64>,
) -> Result<Vec<u8>, AttemptError> {
    let mut response = client.get(url).send().await.map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(AttemptError::Retryable(format!("HTTP {}", status)));
    }

    let too_large = |bytes: u64, limit: u64| {
        AttemptError::Permanent(MediaError::TooLarge {
            url: url.to_string(),
            bytes,
            limit,
        })
    };

    if let (Some(limit), Some(len)) = (max_bytes, response.content_length()) {
        if len > limit {
            return Err(too_large(len, limit));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
        body.extend_from_slice(&chunk);
        if let Some(limit) = max_bytes {
            if body.len() as u64 > limit {
                return Err(too_large(body.len() as u64, limit));
            }
        }
    }

    if body.is_empty() {
        return Err(AttemptError::Retryable("empty response body".into()));
    }
    Ok(body)
}

fn transport_error(e: reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        AttemptError::Retryable("timed out".into())
    } else {
        AttemptError::Retryable(e.to_string())
    }
}

/// Resolves eligible media URLs against the cache, downloading misses.
pub struct Fetcher {
    client: reqwest::Client,
    store: CacheStore,
    policy: RetryPolicy,
    concurrency: usize,
    max_media_bytes: u64,
    progress: Option<ProgressCallback>,
}

impl Fetcher {
    pub fn new(store: CacheStore, config: &ExportConfig) -> Result<Self, ExportError> {
        Ok(Self {
            client: build_client(config)?,
            store,
            policy: RetryPolicy::from_config(config),
            concurrency: config.concurrency.max(1),
            max_media_bytes: config.max_media_bytes,
            progress: config.progress_callback.clone(),
        })
    }

    /// The cache this fetcher reads from and commits to.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Produce one [`FetchOutcome`] per distinct URL in `urls`.
    ///
    /// # Errors
    /// Only [`ExportError::CacheWriteError`] (or an internal task failure);
    /// per-URL problems are reported as `Failed` outcomes.
    pub async fn fetch_all(&self, urls: &[String]) -> Result<Vec<FetchOutcome>, ExportError> {
        let mut seen = HashSet::new();
        let distinct: Vec<&str> = urls
            .iter()
            .map(String::as_str)
            .filter(|u| seen.insert(*u))
            .collect();

        let mut outcomes = Vec::with_capacity(distinct.len());
        let mut to_download = Vec::new();

        for url in distinct {
            match self.store.lookup(url).await {
                Some(entry) => {
                    debug!("Cache hit: {}", url);
                    let outcome = FetchOutcome::new(url, FetchResult::CachedHit { entry });
                    self.notify(&outcome);
                    outcomes.push(outcome);
                }
                None => to_download.push(url),
            }
        }

        info!(
            "Media: {} cached, {} to download (concurrency={})",
            outcomes.len(),
            to_download.len(),
            self.concurrency
        );

        let downloaded: Vec<FetchOutcome> = stream::iter(to_download)
            .map(|url| self.fetch_one(url))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        outcomes.extend(downloaded);
        Ok(outcomes)
    }

    async fn fetch_one(&self, url: &str) -> Result<FetchOutcome, ExportError> {
        let result = match download_with_retry(
            &self.client,
            url,
            self.policy,
            Some(self.max_media_bytes),
        )
        .await
        {
            Ok(bytes) => {
                let entry = self.store.commit(url, bytes).await?;
                FetchResult::Downloaded { entry }
            }
            Err(error) => {
                warn!("Media unavailable: {}: {}", url, error);
                FetchResult::Failed { error }
            }
        };

        let outcome = FetchOutcome::new(url, result);
        self.notify(&outcome);
        Ok(outcome)
    }

    fn notify(&self, outcome: &FetchOutcome) {
        if let Some(ref cb) = self.progress {
            cb.on_media_complete(&outcome.url, outcome.result.kind());
        }
    }
}
