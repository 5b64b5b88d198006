//! Error types for the tweetpdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExportError`]: **Fatal**: the export cannot proceed at all (CSV not
//!   found, cache directory unwritable, allowlist malformed, renderer
//!   unavailable). Returned as `Err(ExportError)` from the top-level
//!   `export*` / `run` functions.
//!
//! * [`MediaError`]: **Non-fatal**: a single media URL was rejected by the
//!   host allowlist or could not be downloaded. Stored inside
//!   [`crate::output::FetchResult`] so the document still renders, with a
//!   "media unavailable" notice in place of that image.
//!
//! A cache file that exists but is empty is neither: it is logged and
//! treated as a cache miss, so the URL is simply downloaded again.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the tweetpdf library.
///
/// Per-URL failures use [`MediaError`] and are stored in
/// [`crate::output::FetchOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExportError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input CSV was not found at the given path.
    #[error("CSV file not found: '{path}'\nCheck the path exists and is readable.")]
    CsvNotFound { path: PathBuf },

    /// The CSV could not be read or is malformed.
    #[error("Failed to read CSV '{path}': {detail}")]
    CsvRead { path: PathBuf, detail: String },

    /// None of the candidate header names matched a required column.
    #[error(
        "Could not find required columns.\nHeader={header:?}\n\
Need one of: created_at/date/time, text/full_text, tweet_url/url."
    )]
    MissingColumns { header: Vec<String> },

    /// Date filter bounds are incomplete, malformed or inverted.
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    // ── Media policy / cache errors ───────────────────────────────────────
    /// An allowlist entry is not a bare hostname.
    #[error("Invalid allowlist entry '{entry}': {reason}")]
    InvalidAllowlist { entry: String, reason: String },

    /// The cache directory cannot be created or written; no media can be resolved.
    #[error("Cannot write media cache at '{path}': {source}\nCheck --download-dir is writable and the disk is not full.")]
    CacheWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// A required font is missing and could not be downloaded.
    #[error("Failed to download font '{name}': {reason}\nRun `tweetpdf --init` with network access.")]
    FontUnavailable { name: String, reason: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium or set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n"
    )]
    PdfiumBindingFailed(String),

    /// pdfium-render returned an error while building the document.
    #[error("PDF rendering failed: {0}")]
    RenderFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single media URL.
///
/// The renderer shows a textual notice instead of the image and the run
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum MediaError {
    /// Host is not in the configured allowlist.
    #[error("host not in allowlist: {host}")]
    RejectedByPolicy { url: String, host: String },

    /// URL could not be parsed or is not http/https.
    #[error("invalid media URL: {url}")]
    InvalidUrl { url: String },

    /// Network error, timeout or non-success status after all attempts.
    #[error("download failed after {attempts} attempt(s): {reason}")]
    DownloadFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Response body exceeded the configured size cap.
    #[error("media too large: {bytes} bytes (limit {limit})")]
    TooLarge { url: String, bytes: u64, limit: u64 },
}
