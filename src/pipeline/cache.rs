//! Content-addressed on-disk media cache.
//!
//! ## Layout
//!
//! ```text
//! <cache_dir>/media/
//!   ├─ 3f1c…9a.jpg        one file per URL, named <sha256(url)>.<ext>
//!   └─ .partial-XXXXXX    in-flight write, never matched by lookup
//! ```
//!
//! The digest of the URL is the file stem, so the same URL maps to the same
//! file within and across runs. There is no sidecar metadata: a file that
//! exists with a non-zero size is a valid entry.
//!
//! Writes go to a temp file in the same directory and are then renamed over
//! the final name, so a killed process leaves at worst an orphan
//! `.partial-*` file, never a truncated entry under a real key.

use crate::error::ExportError;
use crate::output::CacheEntry;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PARTIAL_PREFIX: &str = ".partial-";

static RE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.([A-Za-z0-9]{2,5})$").unwrap());

/// Deterministic cache key for `url`: lower-case hex SHA-256 of its bytes.
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// File extension for a media URL.
///
/// Taken from the path (`/media/x.PNG` → `png`), else from a `format=` query
/// parameter as used by image CDNs (`?format=jpg&name=large` → `jpg`),
/// else `bin`.
pub fn media_extension(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "bin".to_string();
    };

    if let Some(caps) = RE_EXTENSION.captures(parsed.path()) {
        return caps[1].to_ascii_lowercase();
    }

    parsed
        .query_pairs()
        .find(|(k, _)| k == "format")
        .map(|(_, v)| v.to_ascii_lowercase())
        .filter(|v| (2..=5).contains(&v.len()) && v.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

/// Handle on one cache directory, scoped to a run.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open (creating if needed) the cache directory at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| ExportError::CacheWriteError {
                path: root.clone(),
                source,
            })?;
        debug!("Media cache at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path of the entry for `url`, whether or not it exists.
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", cache_key(url), media_extension(url)))
    }

    /// Look up a valid entry for `url`.
    ///
    /// A zero-length file is treated as absent so the URL is downloaded again.
    pub async fn lookup(&self, url: &str) -> Option<CacheEntry> {
        let path = self.path_for(url);
        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                debug!("Cache lookup failed for {}: {}", path.display(), e);
                return None;
            }
        };

        if !meta.is_file() {
            return None;
        }
        if meta.len() == 0 {
            warn!(
                "Ignoring truncated cache file {} (0 bytes); will re-download",
                path.display()
            );
            return None;
        }

        Some(CacheEntry {
            key: cache_key(url),
            path,
            size: meta.len(),
            created_at: modified_at(&meta),
        })
    }

    /// Atomically store `bytes` as the entry for `url`.
    ///
    /// Committing the same URL twice replaces the file with identical content.
    pub async fn commit(&self, url: &str, bytes: Vec<u8>) -> Result<CacheEntry, ExportError> {
        let root = self.root.clone();
        let path = self.path_for(url);
        let key = cache_key(url);

        tokio::task::spawn_blocking(move || commit_blocking(&root, &path, key, &bytes))
            .await
            .map_err(|e| ExportError::Internal(format!("Cache write task panicked: {}", e)))?
    }

    /// Delete `entry`, returning the bytes freed.
    ///
    /// Returns `None` (and logs) if the file is already gone or cannot be
    /// removed; never fails the run.
    pub async fn remove(&self, entry: &CacheEntry) -> Option<u64> {
        let size = match tokio::fs::metadata(&entry.path).await {
            Ok(m) => m.len(),
            Err(e) => {
                warn!("Cache file {} already gone: {}", entry.path.display(), e);
                return None;
            }
        };

        match tokio::fs::remove_file(&entry.path).await {
            Ok(()) => {
                debug!("Removed {} ({} bytes)", entry.path.display(), size);
                Some(size)
            }
            Err(e) => {
                warn!("Failed to remove {}: {}", entry.path.display(), e);
                None
            }
        }
    }
}

fn commit_blocking(
    root: &Path,
    path: &Path,
    key: String,
    bytes: &[u8],
) -> Result<CacheEntry, ExportError> {
    let write_err = |source: std::io::Error| ExportError::CacheWriteError {
        path: root.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(root)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    let meta = std::fs::metadata(path).map_err(write_err)?;
    debug!("Cached {} bytes at {}", meta.len(), path.display());

    Ok(CacheEntry {
        key,
        path: path.to_path_buf(),
        size: meta.len(),
        created_at: modified_at(&meta),
    })
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://pbs.twimg.com/media/AbC123.jpg";

    #[test]
    fn key_is_stable_and_distinct() {
        assert_eq!(cache_key(URL), cache_key(URL));
        assert_ne!(cache_key(URL), cache_key("https://pbs.twimg.com/media/AbC124.jpg"));
        assert_eq!(cache_key(URL).len(), 64);
    }

    #[test]
    fn extension_from_path_or_query() {
        assert_eq!(media_extension("https://h/a/B.PNG"), "png");
        assert_eq!(
            media_extension("https://pbs.twimg.com/media/X?format=jpg&name=large"),
            "jpg"
        );
        assert_eq!(media_extension("https://h/a/noext"), "bin");
        assert_eq!(media_extension("https://h/a?format=../../x"), "bin");
        assert_eq!(media_extension("garbage"), "bin");
    }

    #[tokio::test]
    async fn lookup_misses_then_hits_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path().join("media")).await.unwrap();

        assert!(store.lookup(URL).await.is_none());

        let entry = store.commit(URL, b"jpeg bytes".to_vec()).await.unwrap();
        assert_eq!(entry.size, 10);
        assert_eq!(entry.key, cache_key(URL));
        assert!(entry.path.ends_with(format!("{}.jpg", cache_key(URL))));

        let hit = store.lookup(URL).await.expect("entry should be found");
        assert_eq!(hit.path, entry.path);
        assert_eq!(hit.size, 10);
    }

    #[tokio::test]
    async fn zero_length_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        std::fs::write(store.path_for(URL), b"").unwrap();
        assert!(store.lookup(URL).await.is_none());
    }

    #[tokio::test]
    async fn commit_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        let a = store.commit(URL, b"same".to_vec()).await.unwrap();
        let b = store.commit(URL, b"same".to_vec()).await.unwrap();
        assert_eq!(a.path, b.path);
        assert_eq!(std::fs::read(&b.path).unwrap(), b"same");

        // no temp files left behind
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1, "got {names:?}");
    }

    #[tokio::test]
    async fn orphan_partial_file_is_never_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        // simulate a crash mid-write
        std::fs::write(dir.path().join(".partial-abc123"), b"trunc").unwrap();
        assert!(store.lookup(URL).await.is_none());
    }

    #[tokio::test]
    async fn remove_reports_size_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        let entry = store.commit(URL, vec![7u8; 300]).await.unwrap();

        assert_eq!(store.remove(&entry).await, Some(300));
        assert!(!entry.path.exists());
        assert_eq!(store.remove(&entry).await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn commit_into_readonly_dir_is_cache_write_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path()).await.unwrap();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o555)).unwrap();

        // root ignores directory permissions; nothing to assert there
        let probe = dir.path().join("probe");
        if std::fs::write(&probe, b"x").is_ok() {
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let err = store.commit(URL, b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, ExportError::CacheWriteError { .. }));
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
