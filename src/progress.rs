//! Progress-callback trait for export events.
//!
//! Inject an [`Arc<dyn ExportProgressCallback>`] via
//! [`crate::config::ExportConfigBuilder::progress_callback`] to receive
//! events as media is resolved, the document rendered and the cache purged.
//!
//! # Example
//!
//! ```rust
//! use tweetpdf::{ExportConfig, ExportProgressCallback, OutcomeKind};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ExportProgressCallback for CountingCallback {
//!     fn on_media_complete(&self, url: &str, kind: OutcomeKind) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("#{n} {url}: {kind:?}");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//!
//! let config = ExportConfig::builder()
//!     .progress_callback(cb as Arc<dyn ExportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{MediaSummary, OutcomeKind, RunReport};
use std::sync::Arc;

/// Called by the export pipeline as it progresses.
///
/// `on_media_complete` is called concurrently from download tasks, so
/// implementations must protect shared mutable state (`Mutex`, atomics).
/// All methods have default no-op implementations.
pub trait ExportProgressCallback: Send + Sync {
    /// Called once before any URL is resolved.
    ///
    /// # Arguments
    /// * `total_urls`: distinct media URLs referenced by the records
    fn on_fetch_start(&self, total_urls: usize) {
        let _ = total_urls;
    }

    /// Called once per distinct URL, in completion order.
    fn on_media_complete(&self, url: &str, kind: OutcomeKind) {
        let _ = (url, kind);
    }

    /// Called after every URL has an outcome.
    fn on_fetch_complete(&self, summary: &MediaSummary) {
        let _ = summary;
    }

    /// Called just before the renderer is invoked.
    fn on_render_start(&self, records: usize) {
        let _ = records;
    }

    /// Called after cache entries of this run have been deleted.
    fn on_cleanup_complete(&self, report: &RunReport) {
        let _ = report;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExportConfig`].
pub type ProgressCallback = Arc<dyn ExportProgressCallback>;
