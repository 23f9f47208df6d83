//! Content-addressed artifact cache on the local filesystem.
//!
//! Artifacts are stored by the SHA-256 of their namespace and key material.
//! Each namespace gets its own directory; the file's modification time is the
//! only metadata.
//!
//! ## Directory Structure
//!
//! ```text
//! <cache_root>/
//!   pdf/
//!     3f9a...c1 (downloaded bulletin, keyed by date)
//!   markdown/
//!     b07e...42 (converted text, keyed by PDF bytes)
//! ```
//!
//! Writes go to a uniquely named temporary file in the target directory and
//! are renamed into place, so a visible entry is always complete and two
//! processes producing the same key simply overwrite each other with equal
//! content.
//!
//! Cache failures never fail a run. Anything that goes wrong while reading or
//! writing is logged as a [`CacheError`] and the artifact is recomputed.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

const TEMP_PREFIX: &str = ".tmp-";

/// Cache partitions, one per pipeline stage that produces an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Downloaded bulletin PDFs.
    Pdf,
    /// Text converted from a PDF.
    Markdown,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Pdf, Namespace::Markdown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Pdf => "pdf",
            Namespace::Markdown => "markdown",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cache key (SHA-256 hash as hex string).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `material` within `namespace`.
    ///
    /// The namespace is part of the digest, so equal material in two
    /// namespaces never yields the same key.
    pub fn derive(namespace: Namespace, material: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(material);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Problems inside the cache. Logged, never returned to callers.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O failed during {operation} on {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cached entry {} could not be decoded", .0.display())]
    Undecodable(PathBuf),
}

impl CacheError {
    fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// A value that can be stored in the cache.
pub trait CacheArtifact: Sized {
    fn to_bytes(&self) -> Cow<'_, [u8]>;

    /// `None` when the stored bytes are not a valid artifact.
    fn from_bytes(bytes: Vec<u8>) -> Option<Self>;
}

impl CacheArtifact for Vec<u8> {
    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }

    fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        Some(bytes)
    }
}

impl CacheArtifact for String {
    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }

    fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        String::from_utf8(bytes).ok()
    }
}

/// Result of [`ContentCache::get_or_produce`].
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    /// `true` when the value came from disk and the producer did not run.
    pub hit: bool,
    /// Location of the entry on disk, if one exists after the call.
    pub path: Option<PathBuf>,
}

/// Outcome of a [`ContentCache::cleanup`] or [`ContentCache::clear`] sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
}

/// Entry counts and sizes, per namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub pdf_entries: usize,
    pub markdown_entries: usize,
    pub total_bytes: u64,
}

/// Filesystem-backed get-or-produce cache.
///
/// A disabled cache ([`ContentCache::disabled`]) is a transparent bypass:
/// every call runs the producer and nothing is read or written.
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: Option<PathBuf>,
}

impl ContentCache {
    /// A cache rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { root: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Where the entry for `key` lives (or would live).
    pub fn entry_path(&self, namespace: Namespace, key: &CacheKey) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|root| root.join(namespace.as_str()).join(key.as_hex()))
    }

    /// Return the cached artifact for `key_material`, or produce and store it.
    ///
    /// A fresh entry (younger than `max_age`) is returned without calling
    /// `produce`. Otherwise `produce` runs exactly once; on success its value
    /// is written atomically and returned with `hit == false`. Producer errors
    /// are returned unchanged and nothing is written.
    pub async fn get_or_produce<T, E, F, Fut>(
        &self,
        namespace: Namespace,
        key_material: &[u8],
        max_age: Duration,
        produce: F,
    ) -> Result<Cached<T>, E>
    where
        T: CacheArtifact,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = CacheKey::derive(namespace, key_material);
        let Some(path) = self.entry_path(namespace, &key) else {
            let value = produce().await?;
            return Ok(Cached {
                value,
                hit: false,
                path: None,
            });
        };

        match read_fresh::<T>(&path, max_age) {
            Ok(Some(value)) => {
                tracing::info!(%namespace, key = %key, "cache hit");
                return Ok(Cached {
                    value,
                    hit: true,
                    path: Some(path),
                });
            }
            Ok(None) => tracing::info!(%namespace, key = %key, "cache miss"),
            Err(e) => tracing::warn!(%namespace, key = %key, error = %e, "cache read failed, recomputing"),
        }

        let value = produce().await?;

        let path = match write_atomic(&path, &value.to_bytes()) {
            Ok(()) => {
                tracing::debug!(%namespace, key = %key, path = %path.display(), "cache entry written");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(%namespace, key = %key, error = %e, "cache write failed, continuing without cache");
                None
            }
        };

        Ok(Cached {
            value,
            hit: false,
            path,
        })
    }

    /// Delete entries whose modification time is older than `older_than`.
    ///
    /// Best effort: failures are logged and counted, never returned. Orphaned
    /// temporary files from interrupted writes are swept the same way.
    pub fn cleanup(&self, older_than: Duration) -> CleanupReport {
        let report = self.sweep(Some(older_than), |path| fs::remove_file(path));
        if report.removed > 0 || report.failed > 0 {
            tracing::info!(removed = report.removed, failed = report.failed, "cache cleanup finished");
        }
        report
    }

    /// Remove every entry regardless of age.
    pub fn clear(&self) -> CleanupReport {
        let report = self.sweep(None, |path| fs::remove_file(path));
        tracing::info!(removed = report.removed, failed = report.failed, "cache cleared");
        report
    }

    /// Remove entries older than `older_than` (all of them when `None`).
    fn sweep(
        &self,
        older_than: Option<Duration>,
        remove: impl Fn(&Path) -> std::io::Result<()>,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();
        let Some(root) = &self.root else {
            return report;
        };
        let now = SystemTime::now();

        for namespace in Namespace::ALL {
            for entry in list_entries(&root.join(namespace.as_str())) {
                if let Some(older_than) = older_than {
                    let age = fs::metadata(&entry)
                        .and_then(|m| m.modified())
                        .map(|mtime| now.duration_since(mtime).unwrap_or_default());
                    match age {
                        Ok(age) if age > older_than => {}
                        Ok(_) => continue,
                        Err(e) => {
                            report.failed += 1;
                            tracing::warn!(error = %CacheError::io("stat", &entry, e), "cache sweep could not inspect entry");
                            continue;
                        }
                    }
                }
                match remove(&entry) {
                    Ok(()) => report.removed += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(error = %CacheError::io("remove", &entry, e), "cache sweep could not delete entry");
                    }
                }
            }
        }
        report
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        let Some(root) = &self.root else {
            return stats;
        };
        for namespace in Namespace::ALL {
            for entry in list_entries(&root.join(namespace.as_str())) {
                if is_temp(&entry) {
                    continue;
                }
                match namespace {
                    Namespace::Pdf => stats.pdf_entries += 1,
                    Namespace::Markdown => stats.markdown_entries += 1,
                }
                stats.total_bytes += fs::metadata(&entry).map(|m| m.len()).unwrap_or(0);
            }
        }
        stats
    }
}

/// Read the entry at `path` if it exists and is younger than `max_age`.
fn read_fresh<T: CacheArtifact>(path: &Path, max_age: Duration) -> Result<Option<T>, CacheError> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io("stat", path, e)),
    };
    let mtime = metadata
        .modified()
        .map_err(|e| CacheError::io("stat", path, e))?;
    // An mtime in the future (clock skew) counts as brand new.
    let age = SystemTime::now().duration_since(mtime).unwrap_or_default();
    if age >= max_age {
        tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "cache entry expired");
        return Ok(None);
    }

    let bytes = fs::read(path).map_err(|e| CacheError::io("read", path, e))?;
    T::from_bytes(bytes)
        .map(Some)
        .ok_or_else(|| CacheError::Undecodable(path.to_path_buf()))
}

/// Write `bytes` to `path` through a uniquely named temp file and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let dir = path
        .parent()
        .ok_or_else(|| CacheError::io("resolve", path, std::io::ErrorKind::InvalidInput.into()))?;
    fs::create_dir_all(dir).map_err(|e| CacheError::io("create_dir_all", dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| CacheError::io("create", dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| CacheError::io("write", tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CacheError::io("sync", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| CacheError::io("rename", path, e.error))?;
    Ok(())
}

fn list_entries(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            tracing::warn!(error = %CacheError::io("read_dir", dir, e), "could not list cache directory");
            Vec::new()
        }
    }
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TEMP_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn counting_producer<'a>(
        calls: &'a AtomicU32,
        content: &'a str,
    ) -> impl FnOnce() -> std::future::Ready<Result<String, String>> + 'a {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(content.to_string()))
        }
    }

    fn age_file(path: &Path, by: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    fn mtime(path: &Path) -> SystemTime {
        fs::metadata(path).unwrap().modified().unwrap()
    }

    #[test]
    fn test_key_is_deterministic_and_namespaced() {
        let a = CacheKey::derive(Namespace::Pdf, b"2024-01-15");
        let b = CacheKey::derive(Namespace::Pdf, b"2024-01-15");
        let c = CacheKey::derive(Namespace::Markdown, b"2024-01-15");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_hex().len(), 64);
        assert!(a.as_hex().chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_entry_path_layout() {
        let cache = ContentCache::new("/cache");
        let key = CacheKey::derive(Namespace::Markdown, b"pdf bytes");
        let path = cache.entry_path(Namespace::Markdown, &key).unwrap();
        assert_eq!(path, Path::new("/cache/markdown").join(key.as_hex()));
        assert!(ContentCache::disabled().entry_path(Namespace::Pdf, &key).is_none());
    }

    #[tokio::test]
    async fn test_second_call_hits_and_producer_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let calls = AtomicU32::new(0);

        let first = cache
            .get_or_produce(Namespace::Markdown, b"key", DAY, counting_producer(&calls, "text"))
            .await
            .unwrap();
        let second = cache
            .get_or_produce(Namespace::Markdown, b"key", DAY, counting_producer(&calls, "other"))
            .await
            .unwrap();

        assert!(!first.hit);
        assert!(second.hit);
        assert_eq!(first.value, "text");
        assert_eq!(second.value, "text");
        assert_eq!(first.path, second.path);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let calls = AtomicU32::new(0);
        let max_age = Duration::from_secs(3600);

        let first = cache
            .get_or_produce(Namespace::Pdf, b"2024-01-15", max_age, counting_producer(&calls, "old"))
            .await
            .unwrap();
        let path = first.path.unwrap();
        age_file(&path, Duration::from_secs(2 * 3600));
        let aged = mtime(&path);

        let second = cache
            .get_or_produce(Namespace::Pdf, b"2024-01-15", max_age, counting_producer(&calls, "new"))
            .await
            .unwrap();

        assert!(!second.hit);
        assert_eq!(second.value, "new");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(mtime(&path) > aged);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_disabled_cache_always_produces() {
        let cache = ContentCache::disabled();
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let out = cache
                .get_or_produce(Namespace::Pdf, b"same", DAY, counting_producer(&calls, "x"))
                .await
                .unwrap();
            assert!(!out.hit);
            assert!(out.path.is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_producer_error_propagates_and_nothing_written() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());

        let result: Result<Cached<String>, String> = cache
            .get_or_produce(Namespace::Pdf, b"k", DAY, || async { Err("offline".to_string()) })
            .await;

        assert_eq!(result.unwrap_err(), "offline");
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_namespaces_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let calls = AtomicU32::new(0);

        cache
            .get_or_produce(Namespace::Pdf, b"k", DAY, counting_producer(&calls, "pdf"))
            .await
            .unwrap();
        let md = cache
            .get_or_produce(Namespace::Markdown, b"k", DAY, counting_producer(&calls, "md"))
            .await
            .unwrap();

        assert!(!md.hit);
        assert_eq!(md.value, "md");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let key = CacheKey::derive(Namespace::Markdown, b"k");
        let path = cache.entry_path(Namespace::Markdown, &key).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [0xff, 0xfe, 0xfd]).unwrap();

        let calls = AtomicU32::new(0);
        let out = cache
            .get_or_produce(Namespace::Markdown, b"k", DAY, counting_producer(&calls, "fresh"))
            .await
            .unwrap();

        assert!(!out.hit);
        assert_eq!(out.value, "fresh");
        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_unwritable_root_degrades_to_bypass() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the cache root directory should be.
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        let cache = ContentCache::new(&blocker);
        let calls = AtomicU32::new(0);

        let out = cache
            .get_or_produce(Namespace::Pdf, b"k", DAY, counting_producer(&calls, "v"))
            .await
            .unwrap();

        assert_eq!(out.value, "v");
        assert!(!out.hit);
        assert!(out.path.is_none());
    }

    #[tokio::test]
    async fn test_binary_artifacts_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let pdf = vec![0x25, 0x50, 0x44, 0x46, 0x00, 0xff];

        let expected = pdf.clone();
        cache
            .get_or_produce(Namespace::Pdf, b"d", DAY, || async move { Ok::<_, ()>(pdf) })
            .await
            .unwrap();
        let cached: Cached<Vec<u8>> = cache
            .get_or_produce(Namespace::Pdf, b"d", DAY, || async { Err(()) })
            .await
            .unwrap();

        assert!(cached.hit);
        assert_eq!(cached.value, expected);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let calls = AtomicU32::new(0);

        let old = cache
            .get_or_produce(Namespace::Pdf, b"old", DAY, counting_producer(&calls, "a"))
            .await
            .unwrap();
        let young = cache
            .get_or_produce(Namespace::Markdown, b"young", DAY, counting_producer(&calls, "b"))
            .await
            .unwrap();
        let old_path = old.path.unwrap();
        let young_path = young.path.unwrap();
        age_file(&old_path, 10 * DAY);

        let report = cache.cleanup(7 * DAY);

        assert_eq!(report, CleanupReport { removed: 1, failed: 0 });
        assert!(!old_path.exists());
        assert!(young_path.exists());
    }

    #[tokio::test]
    async fn test_cleanup_counts_undeletable_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let calls = AtomicU32::new(0);
        for material in [&b"stuck"[..], &b"gone"[..]] {
            let entry = cache
                .get_or_produce(Namespace::Pdf, material, DAY, counting_producer(&calls, "x"))
                .await
                .unwrap();
            age_file(&entry.path.unwrap(), 10 * DAY);
        }
        let stuck = cache
            .entry_path(Namespace::Pdf, &CacheKey::derive(Namespace::Pdf, b"stuck"))
            .unwrap();

        let report = cache.sweep(Some(7 * DAY), |path| {
            if path == stuck {
                Err(std::io::ErrorKind::PermissionDenied.into())
            } else {
                fs::remove_file(path)
            }
        });

        assert_eq!(report, CleanupReport { removed: 1, failed: 1 });
        assert!(stuck.exists());
        assert_eq!(cache.stats().pdf_entries, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cleanup_survives_read_only_namespace() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let calls = AtomicU32::new(0);
        let entry = cache
            .get_or_produce(Namespace::Markdown, b"k", DAY, counting_producer(&calls, "x"))
            .await
            .unwrap()
            .path
            .unwrap();
        age_file(&entry, 10 * DAY);
        let namespace_dir = dir.path().join("markdown");
        fs::set_permissions(&namespace_dir, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users can delete anyway; either way nothing panics.
        let report = cache.cleanup(7 * DAY);
        fs::set_permissions(&namespace_dir, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(report.removed + report.failed, 1);
        assert_eq!(report.failed == 1, entry.exists());
    }

    #[tokio::test]
    async fn test_concurrent_producers_leave_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let produce = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, String>("same text".to_string())
        };

        let (a, b) = tokio::join!(
            cache.get_or_produce(Namespace::Markdown, b"pdf", DAY, produce),
            cache.get_or_produce(Namespace::Markdown, b"pdf", DAY, produce),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.value, "same text");
        assert_eq!(b.value, "same text");
        let path = a.path.unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "same text");

        let files: Vec<PathBuf> = fs::read_dir(dir.path().join("markdown"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files, vec![path]);
        assert!(!files.iter().any(|p| is_temp(p)));
    }

    #[test]
    fn test_cleanup_on_missing_root_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path().join("never-created"));
        assert_eq!(cache.cleanup(Duration::ZERO), CleanupReport::default());
        assert_eq!(ContentCache::disabled().cleanup(Duration::ZERO), CleanupReport::default());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path());
        let calls = AtomicU32::new(0);
        cache
            .get_or_produce(Namespace::Pdf, b"1", DAY, counting_producer(&calls, "abc"))
            .await
            .unwrap();
        cache
            .get_or_produce(Namespace::Markdown, b"2", DAY, counting_producer(&calls, "de"))
            .await
            .unwrap();

        let stats = cache.stats();
        assert_eq!(stats.pdf_entries, 1);
        assert_eq!(stats.markdown_entries, 1);
        assert_eq!(stats.total_bytes, 5);

        assert_eq!(cache.clear().removed, 2);
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
