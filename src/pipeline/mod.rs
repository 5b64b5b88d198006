//! Pipeline stages for CSV-to-PDF export.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the coordinator in [`crate::export`] stays a thin sequence of
//! calls.
//!
//! ## Data Flow
//!
//! ```text
//! ingest ──▶ select ──▶ allowlist ──▶ fetch ⇄ cache ──▶ layout/render ──▶ cleanup
//!  (CSV)    (date/sort)  (classify)   (download)        (pdfium)         (purge)
//! ```
//!
//! 1. [`ingest`]    : parse the CSV into ordered records
//! 2. [`select`]    : inclusive date filter and stable sort
//! 3. [`allowlist`] : partition media URLs into eligible and rejected
//! 4. [`fetch`]     : bounded-concurrency downloads with retry; the only
//!    stage with network I/O (apart from [`fonts`])
//! 5. [`cache`]     : content-addressed files, atomic commit
//! 6. [`layout`]    : pure pagination into text and image blocks
//! 7. [`render`]    : draw the layout with pdfium in `spawn_blocking`
//! 8. [`cleanup`]   : delete this run's cache entries and total the bytes

pub mod allowlist;
pub mod cache;
pub mod cleanup;
pub mod fetch;
pub mod fonts;
pub mod ingest;
pub mod layout;
pub mod render;
pub mod select;
