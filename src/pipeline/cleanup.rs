//! Cache cleanup after the document has been written.
//!
//! Every entry resolved during the run is deleted, including cache hits left
//! over from an earlier run: the cache is scoped to what this run touched.
//! Files that vanished or cannot be removed are logged, counted in
//! `failed_removals`, and excluded from the freed-byte total.

use crate::output::{CacheEntry, RunReport};
use crate::pipeline::cache::CacheStore;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Delete `entries` through `store` and total what was freed.
pub async fn purge(store: &CacheStore, entries: &[CacheEntry]) -> RunReport {
    let mut report = RunReport::default();
    let mut seen = HashSet::new();

    for entry in entries {
        if !seen.insert(entry.path.as_path()) {
            continue;
        }
        match store.remove(entry).await {
            Some(bytes) => {
                report.removed_files += 1;
                report.freed_bytes += bytes;
            }
            None => report.failed_removals += 1,
        }
    }

    prune_empty_dirs(store.root()).await;

    info!(
        "Cache cleaned: {} files removed, {} bytes freed, {} failed",
        report.removed_files, report.freed_bytes, report.failed_removals
    );
    report
}

/// Remove the media directory and its parent if they are now empty.
///
/// `remove_dir` refuses non-empty directories, so files kept by another run
/// are never touched.
async fn prune_empty_dirs(media_dir: &Path) {
    for dir in [Some(media_dir), media_dir.parent()].into_iter().flatten() {
        if dir.as_os_str().is_empty() {
            break;
        }
        if let Err(e) = tokio::fs::remove_dir(dir).await {
            debug!("Keeping {}: {}", dir.display(), e);
            break;
        }
        debug!("Removed empty directory {}", dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn freed_bytes_equal_sum_of_entry_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("cache/media")).await.unwrap();

        let a = store.commit("https://h/a.jpg", vec![1u8; 100]).await.unwrap();
        let b = store.commit("https://h/b.jpg", vec![2u8; 250]).await.unwrap();
        let expected: u64 = [&a, &b].iter().map(|e| e.size).sum();

        let report = purge(&store, &[a, b]).await;
        assert_eq!(report.removed_files, 2);
        assert_eq!(report.freed_bytes, expected);
        assert_eq!(report.failed_removals, 0);

        // both now-empty directories are gone
        assert!(!dir.path().join("cache/media").exists());
        assert!(!dir.path().join("cache").exists());
    }

    #[tokio::test]
    async fn missing_files_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("media")).await.unwrap();

        let a = store.commit("https://h/a.jpg", vec![1u8; 10]).await.unwrap();
        let b = store.commit("https://h/b.jpg", vec![1u8; 20]).await.unwrap();
        std::fs::remove_file(&b.path).unwrap();

        let report = purge(&store, &[a, b]).await;
        assert_eq!(report.removed_files, 1);
        assert_eq!(report.freed_bytes, 10);
        assert_eq!(report.failed_removals, 1);
    }

    #[tokio::test]
    async fn duplicate_entries_removed_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("media")).await.unwrap();
        let a = store.commit("https://h/a.jpg", vec![1u8; 10]).await.unwrap();

        let report = purge(&store, &[a.clone(), a]).await;
        assert_eq!(report.removed_files, 1);
        assert_eq!(report.failed_removals, 0);
    }

    #[tokio::test]
    async fn unrelated_files_keep_directory() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        let store = CacheStore::open(&media).await.unwrap();
        let a = store.commit("https://h/a.jpg", vec![1u8; 10]).await.unwrap();
        std::fs::write(media.join("other.jpg"), b"keep").unwrap();

        purge(&store, &[a]).await;
        assert!(media.join("other.jpg").exists());
    }
}
