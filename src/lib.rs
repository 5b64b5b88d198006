//! # tweetpdf
//!
//! Export a CSV of timestamped posts to a single PDF, with remote images
//! downloaded and inlined.
//!
//! ## Why this crate?
//!
//! Post exports reference their images by URL. A PDF that only prints those
//! URLs is useless once the links rot, and fetching hundreds of images one by
//! one is slow. This crate downloads each distinct image once, with bounded
//! concurrency and a host allowlist, caches it under a content-addressed
//! name, lays the records out in date order and removes the cache when the
//! document is written.
//!
//! ## Pipeline Overview
//!
//! ```text
//! CSV
//!  │
//!  ├─ 1. Ingest    pick columns, parse dates, split media cells
//!  ├─ 2. Select    inclusive date range, stable sort
//!  ├─ 3. Classify  host allowlist (exact or subdomain match)
//!  ├─ 4. Fetch     cache lookup, concurrent downloads with retry
//!  ├─ 5. Render    paginate and draw via pdfium (spawn_blocking)
//!  └─ 6. Cleanup   delete this run's cache entries, report freed bytes
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tweetpdf::{export, ExportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExportConfig::builder().concurrency(8).build()?;
//!     let output = export("tweets.csv", "tweets.pdf", &config).await?;
//!     eprintln!(
//!         "{} succeeded, {} rejected, {} failed",
//!         output.summary.succeeded(),
//!         output.summary.rejected,
//!         output.summary.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tweetpdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! tweetpdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! Rendering binds the pdfium shared library at run time. Set
//! `PDFIUM_LIB_PATH` to the library file or its directory, or install it
//! where the system loader finds it.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExportConfig, ExportConfigBuilder};
pub use error::{ExportError, MediaError};
pub use export::{export, export_sync, resolve_media, run, ResolvedMedia};
pub use output::{
    format_size, CacheEntry, ExportOutput, ExportStats, FetchOutcome, FetchResult, MediaSlot,
    MediaSummary, OutcomeKind, ResolvedRecord, RunReport,
};
pub use pipeline::allowlist::HostMatch;
pub use pipeline::ingest::Record;
pub use pipeline::render::{DocumentRenderer, PdfiumRenderer};
pub use pipeline::select::{DateRange, SortOrder};
pub use progress::{ExportProgressCallback, NoopProgressCallback, ProgressCallback};
