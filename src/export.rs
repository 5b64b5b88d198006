//! Export entry points and the media pipeline coordinator.
//!
//! ## Why a single barrier?
//!
//! Page layout depends on whether each image is present (an image block and
//! a notice line have different heights). The coordinator therefore waits
//! for every media URL to reach a final outcome before the renderer starts.
//! Downloads inside the barrier are concurrent; everything around it runs
//! one stage at a time.
//!
//! Record order is never touched here: records reach the renderer in the
//! order produced by [`crate::pipeline::select::select`]. Rebinding of media
//! keys on the URL, so download completion order is irrelevant.

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::output::{
    ExportOutput, ExportStats, FetchOutcome, FetchResult, MediaSlot, MediaSummary, OutcomeKind,
    ResolvedRecord, RunReport,
};
use crate::pipeline::allowlist::{Allowlist, Eligibility};
use crate::pipeline::cache::CacheStore;
use crate::pipeline::cleanup;
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::fonts;
use crate::pipeline::ingest::{self, Record};
use crate::pipeline::render::{DocumentRenderer, PdfiumRenderer};
use crate::pipeline::select::select;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Records with media rebound, plus one outcome per distinct URL.
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub records: Vec<ResolvedRecord>,
    /// In order of first appearance across the records.
    pub outcomes: Vec<FetchOutcome>,
    pub summary: MediaSummary,
}

/// Export the CSV at `csv_path` to a PDF at `out_path`.
///
/// This is the primary entry point for the library: ingest, date filter and
/// sort, font check, then [`run`] with the pdfium renderer.
///
/// # Errors
/// Returns `Err(ExportError)` only for fatal errors (unreadable CSV, bad
/// allowlist, unwritable cache, missing fonts, render or write failure).
/// Media that could not be fetched is reported in
/// [`ExportOutput::summary`] and rendered as a notice.
pub async fn export(
    csv_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<ExportOutput, ExportError> {
    let csv_path = csv_path.as_ref().to_path_buf();
    info!("Starting export: {}", csv_path.display());

    // ── Step 1: Read CSV ─────────────────────────────────────────────────
    let ingested = tokio::task::spawn_blocking(move || ingest::read_records(&csv_path))
        .await
        .map_err(|e| ExportError::Internal(format!("CSV reader task panicked: {}", e)))??;

    // ── Step 2: Filter and sort ──────────────────────────────────────────
    if let Some(range) = config.date_range {
        info!("Date range: {} to {}", range.start(), range.end());
    }
    let records = select(ingested.records, config.date_range, config.sort);
    info!("Records in output scope: {}", records.len());

    // ── Step 3: Fonts ────────────────────────────────────────────────────
    fonts::ensure_fonts(config).await?;

    // ── Step 4: Media, render, cleanup ───────────────────────────────────
    let renderer = Arc::new(PdfiumRenderer::new(&config.font_dir, &config.title));
    let mut output = run(records, config, renderer, out_path).await?;
    output.stats.skipped_rows = ingested.skipped_rows;
    Ok(output)
}

/// Synchronous wrapper around [`export`].
///
/// Creates a temporary tokio runtime internally.
pub fn export_sync(
    csv_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
    config: &ExportConfig,
) -> Result<ExportOutput, ExportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExportError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(export(csv_path, out_path, config))
}

/// Resolve media for already filtered and sorted `records`, render them, and
/// clean the cache.
///
/// The renderer is called exactly once, after every media URL has an
/// outcome, with records in the order given. When `config.purge_cache` is
/// set, every cache entry resolved in this run is deleted afterwards and the
/// totals land in [`ExportOutput::report`].
pub async fn run(
    records: Vec<Record>,
    config: &ExportConfig,
    renderer: Arc<dyn DocumentRenderer>,
    out_path: impl AsRef<Path>,
) -> Result<ExportOutput, ExportError> {
    let total_start = Instant::now();
    let out_path = out_path.as_ref().to_path_buf();

    // ── Steps 1–4: Classify, fetch, rebind ───────────────────────────────
    let fetch_start = Instant::now();
    let resolved = resolve_media(records, config).await?;
    let fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;

    // ── Step 5: Render ───────────────────────────────────────────────────
    if let Some(ref cb) = config.progress_callback {
        cb.on_render_start(resolved.records.len());
    }
    let render_start = Instant::now();
    let records = resolved.records;
    let target = out_path.clone();
    let (records, rendered) = tokio::task::spawn_blocking(move || {
        let result = renderer.render(&records, &target);
        (records, result)
    })
    .await
    .map_err(|e| ExportError::Internal(format!("Render task panicked: {}", e)))?;
    rendered?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} records in {}ms",
        records.len(),
        render_duration_ms
    );

    // ── Step 6: Cleanup ──────────────────────────────────────────────────
    let report = if config.purge_cache {
        let entries: Vec<_> = resolved
            .outcomes
            .iter()
            .filter_map(|o| o.result.entry().cloned())
            .collect();
        let report = if entries.is_empty() {
            RunReport::default()
        } else {
            let store = CacheStore::open(config.media_dir()).await?;
            cleanup::purge(&store, &entries).await
        };
        if let Some(ref cb) = config.progress_callback {
            cb.on_cleanup_complete(&report);
        }
        Some(report)
    } else {
        debug!("Keeping cache entries in {}", config.media_dir().display());
        None
    };

    let stats = ExportStats {
        records: records.len(),
        skipped_rows: 0,
        fetch_duration_ms,
        render_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    Ok(ExportOutput {
        output_path: out_path,
        records,
        outcomes: resolved.outcomes,
        summary: resolved.summary,
        report,
        stats,
    })
}

/// Classify, fetch and rebind the media of `records` without rendering.
///
/// # Errors
/// [`ExportError::InvalidAllowlist`] for a malformed allowlist entry and
/// [`ExportError::CacheWriteError`] when the cache directory is unusable.
/// Both are raised before any record is handed on.
pub async fn resolve_media(
    records: Vec<Record>,
    config: &ExportConfig,
) -> Result<ResolvedMedia, ExportError> {
    let allowlist = Allowlist::new(&config.allow_hosts, config.host_match)?;
    if allowlist.allows_all() {
        debug!("Allowlist empty: any http/https host is allowed");
    } else {
        debug!(
            "Allowlist ({:?}): {}",
            config.host_match,
            allowlist.hosts().join(", ")
        );
    }

    let mut seen = HashSet::new();
    let distinct: Vec<String> = records
        .iter()
        .flat_map(|r| r.media_urls.iter())
        .filter(|u| seen.insert(u.as_str()))
        .cloned()
        .collect();

    if let Some(ref cb) = config.progress_callback {
        cb.on_fetch_start(distinct.len());
    }

    let mut results: HashMap<String, FetchResult> = HashMap::with_capacity(distinct.len());
    let mut eligible = Vec::new();
    for url in &distinct {
        match allowlist.classify(url) {
            Eligibility::Eligible => eligible.push(url.clone()),
            Eligibility::Rejected(error) => {
                debug!("Rejected: {}: {}", url, error);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_media_complete(url, OutcomeKind::Rejected);
                }
                results.insert(url.clone(), FetchResult::Rejected { error });
            }
        }
    }

    if eligible.is_empty() {
        info!("Media download skipped (no downloadable media)");
    } else {
        let store = CacheStore::open(config.media_dir()).await?;
        let fetcher = Fetcher::new(store, config)?;
        for outcome in fetcher.fetch_all(&eligible).await? {
            results.insert(outcome.url, outcome.result);
        }
    }

    let outcomes: Vec<FetchOutcome> = distinct
        .iter()
        .filter_map(|url| {
            results
                .get(url)
                .map(|result| FetchOutcome::new(url.clone(), result.clone()))
        })
        .collect();

    let records = records
        .into_iter()
        .map(|record| {
            let media = record
                .media_urls
                .iter()
                .map(|url| rebind(url, results.get(url)))
                .collect();
            ResolvedRecord::new(record, media)
        })
        .collect();

    let summary = MediaSummary::from_outcomes(&outcomes);
    info!(
        "Media: {}/{} succeeded, {} rejected, {} failed",
        summary.succeeded(),
        summary.total(),
        summary.rejected,
        summary.failed
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_fetch_complete(&summary);
    }

    Ok(ResolvedMedia {
        records,
        outcomes,
        summary,
    })
}

fn rebind(url: &str, result: Option<&FetchResult>) -> MediaSlot {
    match result {
        Some(FetchResult::CachedHit { entry }) | Some(FetchResult::Downloaded { entry }) => {
            MediaSlot::Resolved {
                url: url.to_string(),
                path: entry.path.clone(),
            }
        }
        Some(FetchResult::Rejected { error }) | Some(FetchResult::Failed { error }) => {
            MediaSlot::Missing {
                url: url.to_string(),
                reason: error.to_string(),
            }
        }
        None => MediaSlot::Missing {
            url: url.to_string(),
            reason: "not resolved".to_string(),
        },
    }
}
