//! Result types produced by an export run.
//!
//! Everything here is plain data and `Serialize`, so the CLI can emit a run
//! as JSON with `--json`.

use crate::error::MediaError;
use crate::pipeline::ingest::Record;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One media file stored in the cache directory.
///
/// Owned by [`crate::pipeline::cache::CacheStore`]; never mutated after it is
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hex SHA-256 digest of the media URL; the file name stem.
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// How a single media URL was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchResult {
    /// A valid cache file already existed; no network call was made.
    CachedHit { entry: CacheEntry },
    /// Downloaded during this run and committed to the cache.
    Downloaded { entry: CacheEntry },
    /// Refused by the host allowlist; never reached the fetcher.
    Rejected { error: MediaError },
    /// Every download attempt failed.
    Failed { error: MediaError },
}

impl FetchResult {
    /// The cache entry backing this result, if the media is available.
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            FetchResult::CachedHit { entry } | FetchResult::Downloaded { entry } => Some(entry),
            FetchResult::Rejected { .. } | FetchResult::Failed { .. } => None,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            FetchResult::CachedHit { .. } => OutcomeKind::CachedHit,
            FetchResult::Downloaded { .. } => OutcomeKind::Downloaded,
            FetchResult::Rejected { .. } => OutcomeKind::Rejected,
            FetchResult::Failed { .. } => OutcomeKind::Failed,
        }
    }
}

/// Data-less discriminant of [`FetchResult`], used in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    CachedHit,
    Downloaded,
    Rejected,
    Failed,
}

/// Resolution of one distinct media URL in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub url: String,
    #[serde(flatten)]
    pub result: FetchResult,
}

impl FetchOutcome {
    pub fn new(url: impl Into<String>, result: FetchResult) -> Self {
        Self {
            url: url.into(),
            result,
        }
    }
}

/// A record's media reference after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MediaSlot {
    /// Media is on disk at `path`.
    Resolved { url: String, path: PathBuf },
    /// Media is unavailable; the renderer prints a notice instead.
    Missing { url: String, reason: String },
}

impl MediaSlot {
    pub fn url(&self) -> &str {
        match self {
            MediaSlot::Resolved { url, .. } | MediaSlot::Missing { url, .. } => url,
        }
    }
}

/// A record ready for rendering: date and text untouched, media rebound to
/// local paths or explicit absence markers, in the original media order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub id: String,
    pub created_at: NaiveDateTime,
    pub text: String,
    pub link: String,
    pub media: Vec<MediaSlot>,
}

impl ResolvedRecord {
    /// Pair `record` with the slots resolved for its media URLs.
    pub fn new(record: Record, media: Vec<MediaSlot>) -> Self {
        Self {
            id: record.id,
            created_at: record.created_at,
            text: record.text,
            link: record.link,
            media,
        }
    }
}

/// Per-status counts over all [`FetchOutcome`]s of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSummary {
    pub cached: usize,
    pub downloaded: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl MediaSummary {
    pub fn from_outcomes(outcomes: &[FetchOutcome]) -> Self {
        let mut s = Self::default();
        for o in outcomes {
            match o.result.kind() {
                OutcomeKind::CachedHit => s.cached += 1,
                OutcomeKind::Downloaded => s.downloaded += 1,
                OutcomeKind::Rejected => s.rejected += 1,
                OutcomeKind::Failed => s.failed += 1,
            }
        }
        s
    }

    /// Media available to the renderer (cache hits plus fresh downloads).
    pub fn succeeded(&self) -> usize {
        self.cached + self.downloaded
    }

    pub fn total(&self) -> usize {
        self.succeeded() + self.rejected + self.failed
    }
}

/// Cache cleanup totals for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub removed_files: usize,
    pub freed_bytes: u64,
    /// Deletions that failed; excluded from `freed_bytes`.
    pub failed_removals: usize,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutput {
    pub output_path: PathBuf,
    pub records: Vec<ResolvedRecord>,
    pub outcomes: Vec<FetchOutcome>,
    pub summary: MediaSummary,
    /// `None` when cache purging was disabled.
    pub report: Option<RunReport>,
    pub stats: ExportStats,
}

/// Timing and volume figures for a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExportStats {
    pub records: usize,
    /// Rows dropped during ingestion because their date could not be parsed.
    pub skipped_rows: usize,
    pub fetch_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Human-readable size: GB above 1 GiB, MB otherwise.
pub fn format_size(total_bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let b = total_bytes as f64;
    if b >= GIB {
        format!("{:.2} GB", b / GIB)
    } else {
        format!("{:.2} MB", b / MIB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(size: u64) -> CacheEntry {
        CacheEntry {
            key: "ab".into(),
            path: PathBuf::from("/tmp/ab.jpg"),
            size,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn summary_counts_each_kind() {
        let outcomes = vec![
            FetchOutcome::new("a", FetchResult::CachedHit { entry: entry(1) }),
            FetchOutcome::new("b", FetchResult::Downloaded { entry: entry(2) }),
            FetchOutcome::new(
                "c",
                FetchResult::Rejected {
                    error: MediaError::InvalidUrl { url: "c".into() },
                },
            ),
            FetchOutcome::new(
                "d",
                FetchResult::Failed {
                    error: MediaError::DownloadFailed {
                        url: "d".into(),
                        attempts: 2,
                        reason: "timeout".into(),
                    },
                },
            ),
        ];
        let s = MediaSummary::from_outcomes(&outcomes);
        assert_eq!(s.succeeded(), 2);
        assert_eq!(s.rejected, 1);
        assert_eq!(s.failed, 1);
        assert_eq!(s.total(), 4);
    }

    #[test]
    fn format_size_switches_units() {
        assert_eq!(format_size(0), "0.00 MB");
        assert_eq!(format_size(1024 * 1024 + 512 * 1024), "1.50 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn outcome_serialises_flat() {
        let o = FetchOutcome::new("https://x/a.png", FetchResult::Downloaded { entry: entry(7) });
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["url"], "https://x/a.png");
        assert_eq!(json["status"], "downloaded");
        assert_eq!(json["entry"]["size"], 7);
    }
}
