//! Configuration types for CSV-to-PDF export.
//!
//! All export behaviour is controlled through [`ExportConfig`], built via its
//! [`ExportConfigBuilder`]. The config is the run-scoped context handed to
//! every pipeline stage: nothing reads the cache directory, allowlist or
//! concurrency limit from ambient state, so tests can point a run at an
//! isolated temporary directory.

use crate::error::ExportError;
use crate::pipeline::allowlist::HostMatch;
use crate::pipeline::select::{DateRange, SortOrder};
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Hosts allowed by default: where exported tweet images are served from.
pub const DEFAULT_ALLOW_HOSTS: [&str; 2] = ["pbs.twimg.com", "video.twimg.com"];

/// Default number of concurrent media downloads.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".tweetpdf_cache";

/// Configuration for one CSV-to-PDF export.
///
/// Built via [`ExportConfig::builder()`] or using [`ExportConfig::default()`].
///
/// # Example
/// ```rust
/// use tweetpdf::{ExportConfig, HostMatch};
///
/// let config = ExportConfig::builder()
///     .concurrency(8)
///     .allow_hosts(["pbs.twimg.com"])
///     .host_match(HostMatch::Exact)
///     .purge_cache(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct ExportConfig {
    /// Maximum number of in-flight media downloads. Default: 4.
    pub concurrency: usize,

    /// Cache root. Media files live in `<cache_dir>/media/`. Default: `.tweetpdf_cache`.
    pub cache_dir: PathBuf,

    /// Hostnames media may be downloaded from. Empty means allow all.
    pub allow_hosts: Vec<String>,

    /// Whether allowlist entries match subdomains too. Default: [`HostMatch::Subdomain`].
    pub host_match: HostMatch,

    /// Delete the cache entries touched by this run after the PDF is written. Default: true.
    ///
    /// With `false` the entries stay on disk and the next run against the
    /// same `cache_dir` resolves them as cache hits without any network call.
    pub purge_cache: bool,

    /// Download attempts per URL before it is reported as failed. Default: 2.
    pub max_attempts: u32,

    /// Delay before the second attempt, doubling after each one. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-attempt HTTP timeout in seconds. Default: 20.
    pub download_timeout_secs: u64,

    /// Largest media body accepted, in bytes. Default: 10 MiB.
    pub max_media_bytes: u64,

    /// `User-Agent` header sent with every download.
    pub user_agent: String,

    /// Inclusive date filter applied after ingestion. Default: none.
    pub date_range: Option<DateRange>,

    /// Record order in the document. Default: ascending.
    pub sort: SortOrder,

    /// Directory holding the Noto font files. Default: `fonts`.
    pub font_dir: PathBuf,

    /// Document title printed on the first page.
    pub title: String,

    /// Optional progress events sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            allow_hosts: DEFAULT_ALLOW_HOSTS.iter().map(|h| h.to_string()).collect(),
            host_match: HostMatch::default(),
            purge_cache: true,
            max_attempts: 2,
            retry_backoff_ms: 500,
            download_timeout_secs: 20,
            max_media_bytes: 10 * 1024 * 1024,
            user_agent: format!("tweetpdf/{}", env!("CARGO_PKG_VERSION")),
            date_range: None,
            sort: SortOrder::default(),
            font_dir: PathBuf::from("fonts"),
            title: "Tweet Export".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("concurrency", &self.concurrency)
            .field("cache_dir", &self.cache_dir)
            .field("allow_hosts", &self.allow_hosts)
            .field("host_match", &self.host_match)
            .field("purge_cache", &self.purge_cache)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_media_bytes", &self.max_media_bytes)
            .field("date_range", &self.date_range)
            .field("sort", &self.sort)
            .field("font_dir", &self.font_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExportProgressCallback>"),
            )
            .finish()
    }
}

impl ExportConfig {
    /// Create a new builder for `ExportConfig`.
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory that holds the content-addressed media files.
    pub fn media_dir(&self) -> PathBuf {
        self.cache_dir.join("media")
    }
}

/// Builder for [`ExportConfig`].
#[derive(Debug)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn allow_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allow_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn host_match(mut self, mode: HostMatch) -> Self {
        self.config.host_match = mode;
        self
    }

    pub fn purge_cache(mut self, v: bool) -> Self {
        self.config.purge_cache = v;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_media_bytes(mut self, bytes: u64) -> Self {
        self.config.max_media_bytes = bytes;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn date_range(mut self, range: Option<DateRange>) -> Self {
        self.config.date_range = range;
        self
    }

    pub fn sort(mut self, order: SortOrder) -> Self {
        self.config.sort = order;
        self
    }

    pub fn font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.font_dir = dir.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExportConfig, ExportError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ExportError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_attempts == 0 {
            return Err(ExportError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(ExportError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        if c.cache_dir.as_os_str().is_empty() {
            return Err(ExportError::InvalidConfig(
                "Cache directory must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
