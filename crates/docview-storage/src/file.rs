use crate::traits::{
    BackendError, BackendResult, BackendStats, CacheBackend, EvictableStore, StoredEntry,
};
use crate::CacheBackendKind;
use async_trait::async_trait;
use bytes::Bytes;
use docview_core::file_utils::md5_str;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const META_SUFFIX: &str = ".meta";
const TMP_PREFIX: &str = ".tmp-";
const SHARD_LEN: usize = 2;
const MAX_ENCODED_KEY_LEN: usize = 200;

/// Expiry sidecar stored next to an entry
#[derive(Debug, Serialize, Deserialize)]
struct ExpiryMeta {
    /// Unix seconds
    expire: f64,
}

/// Filesystem cache backend
///
/// Layout: `<root>/<md5(key)[..2]>/<encoded key>` with an optional `<encoded key>.meta`
/// expiry sidecar. Keys are percent-encoded with `.` escaped, so the only names
/// containing a dot are sidecars and in-flight `.tmp-*` files.
#[derive(Clone)]
pub struct FileCacheBackend {
    root: PathBuf,
}

impl FileCacheBackend {
    /// Create the backend, creating `root` if needed.
    pub async fn new(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            BackendError::Config(format!(
                "Failed to create cache directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(FileCacheBackend { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn encode_key(key: &str) -> BackendResult<String> {
        if key.is_empty() {
            return Err(BackendError::InvalidKey("Cache key is empty".to_string()));
        }

        let encoded = urlencoding::encode(key).replace('.', "%2E");
        if encoded.len() > MAX_ENCODED_KEY_LEN {
            return Err(BackendError::InvalidKey(format!(
                "Cache key too long ({} bytes encoded)",
                encoded.len()
            )));
        }

        Ok(encoded)
    }

    fn decode_key(name: &str) -> Option<String> {
        urlencoding::decode(name).ok().map(|k| k.into_owned())
    }

    /// Shard directory for `key`: leading hex digits of its MD5, so keys sharing a
    /// namespace prefix still spread across directories.
    fn shard_of(key: &str) -> String {
        let mut digest = md5_str(key);
        digest.truncate(SHARD_LEN);
        digest
    }

    /// Path of the data file for `key`.
    pub fn entry_path(&self, key: &str) -> BackendResult<PathBuf> {
        let encoded = Self::encode_key(key)?;
        Ok(self.root.join(Self::shard_of(key)).join(&encoded))
    }

    fn meta_path(data_path: &Path) -> PathBuf {
        let mut raw = data_path.as_os_str().to_owned();
        raw.push(META_SUFFIX);
        PathBuf::from(raw)
    }

    /// Write through a temp file in the same directory, then rename into place.
    async fn write_atomic(target: &Path, data: &[u8]) -> io::Result<()> {
        let dir = target
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "entry has no parent"))?;
        fs::create_dir_all(dir).await?;

        let tmp = dir.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4().simple()));
        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, target).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        result
    }

    /// Reads the sidecar; a missing or unreadable sidecar means no expiry.
    async fn read_expiry(meta_path: &Path) -> Option<SystemTime> {
        match fs::read(meta_path).await {
            Ok(raw) => match serde_json::from_slice::<ExpiryMeta>(&raw) {
                Ok(meta) => Duration::try_from_secs_f64(meta.expire)
                    .ok()
                    .map(|d| UNIX_EPOCH + d),
                Err(e) => {
                    tracing::warn!(
                        path = %meta_path.display(),
                        error = %e,
                        "Corrupt expiry sidecar, treating entry as non-expiring"
                    );
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %meta_path.display(), error = %e, "Failed to read expiry sidecar");
                None
            }
        }
    }

    /// Removes data then sidecar; returns bytes freed. Missing files are not errors.
    async fn remove_files(data_path: &Path) -> io::Result<u64> {
        let mut freed = 0;
        for path in [data_path.to_path_buf(), Self::meta_path(data_path)] {
            let size = match fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            match fs::remove_file(&path).await {
                Ok(()) => freed += size,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(freed)
    }

    /// False if the entry has expired, in which case it is deleted.
    async fn check_live(&self, key: &str, data_path: &Path) -> bool {
        match Self::read_expiry(&Self::meta_path(data_path)).await {
            Some(at) if at <= SystemTime::now() => {
                tracing::debug!(key = %key, "Cache entry expired, removing");
                if let Err(e) = Self::remove_files(data_path).await {
                    tracing::warn!(key = %key, error = %e, "Failed to remove expired cache entry");
                }
                false
            }
            _ => true,
        }
    }

    /// Committed data files as (key, path), regardless of expiry.
    async fn scan(&self) -> io::Result<Vec<(String, PathBuf)>> {
        let mut found = Vec::new();
        let mut shards = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e),
        };

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if name.contains('.') {
                    continue;
                }
                if let Some(key) = Self::decode_key(name) {
                    found.push((key, entry.path()));
                }
            }
        }

        Ok(found)
    }
}

/// Translate a `*`/`?` glob into an anchored regex.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

#[async_trait]
impl CacheBackend for FileCacheBackend {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let path = match self.entry_path(key) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Rejected cache key");
                return None;
            }
        };

        if !self.check_live(key, &path).await {
            return None;
        }

        match fs::read(&path).await {
            Ok(data) => Some(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to read cache entry");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Bytes, expire: Option<Duration>) -> bool {
        let path = match self.entry_path(key) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Rejected cache key");
                return false;
            }
        };
        let meta_path = Self::meta_path(&path);
        let start = Instant::now();

        // The sidecar is settled before the data so a reader never pairs new data
        // with a stale expiry.
        let meta_result = match expire {
            Some(ttl) => {
                let expire_at = (SystemTime::now() + ttl)
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or_default();
                match serde_json::to_vec(&ExpiryMeta { expire: expire_at }) {
                    Ok(raw) => Self::write_atomic(&meta_path, &raw).await,
                    Err(e) => Err(io::Error::other(e)),
                }
            }
            None => match fs::remove_file(&meta_path).await {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        };

        if let Err(e) = meta_result {
            tracing::warn!(key = %key, error = %e, "Failed to write expiry sidecar");
            return false;
        }

        match Self::write_atomic(&path, &value).await {
            Ok(()) => {
                tracing::debug!(
                    key = %key,
                    size_bytes = value.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Cache entry written"
                );
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to write cache entry");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let path = match self.entry_path(key) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Rejected cache key");
                return false;
            }
        };

        match Self::remove_files(&path).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to delete cache entry");
                false
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let Ok(path) = self.entry_path(key) else {
            return false;
        };

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return false;
        }
        self.check_live(key, &path).await
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        let Some(matcher) = glob_to_regex(pattern) else {
            tracing::warn!(pattern = %pattern, "Invalid key pattern");
            return Vec::new();
        };

        let scanned = match self.scan().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "Failed to scan cache directory");
                return Vec::new();
            }
        };

        let mut keys = Vec::new();
        for (key, path) in scanned {
            if matcher.is_match(&key) && self.check_live(&key, &path).await {
                keys.push(key);
            }
        }
        keys.sort();
        keys
    }

    async fn get_many(&self, keys: &[String]) -> HashMap<String, Bytes> {
        join_all(keys.iter().map(|key| async move {
            self.get(key).await.map(|value| (key.clone(), value))
        }))
        .await
        .into_iter()
        .flatten()
        .collect()
    }

    async fn set_many(
        &self,
        entries: HashMap<String, Bytes>,
        expire: Option<Duration>,
    ) -> HashMap<String, bool> {
        join_all(entries.into_iter().map(|(key, value)| async move {
            let ok = self.set(&key, value, expire).await;
            (key, ok)
        }))
        .await
        .into_iter()
        .collect()
    }

    async fn delete_many(&self, keys: &[String]) -> HashMap<String, bool> {
        join_all(
            keys.iter()
                .map(|key| async move { (key.clone(), self.delete(key).await) }),
        )
        .await
        .into_iter()
        .collect()
    }

    async fn clear(&self) -> bool {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "Failed to clear cache");
                return false;
            }
        };

        let mut ok = true;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to list cache directory");
                    ok = false;
                    break;
                }
            };
            let path = entry.path();
            let result = match entry.file_type().await {
                Ok(t) if t.is_dir() => fs::remove_dir_all(&path).await,
                _ => fs::remove_file(&path).await,
            };
            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache path");
                ok = false;
            }
        }

        tracing::info!(root = %self.root.display(), success = ok, "Cache cleared");
        ok
    }

    async fn get_stats(&self) -> BackendStats {
        let (count, size_bytes) = match self.committed_entries().await {
            Ok(entries) => (
                entries.len() as u64,
                entries.iter().map(|e| e.size).sum::<u64>(),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to collect cache statistics");
                (0, 0)
            }
        };

        let mut extra = BTreeMap::new();
        extra.insert(
            "root".to_string(),
            serde_json::Value::String(self.root.display().to_string()),
        );

        BackendStats {
            backend: CacheBackendKind::File,
            size_bytes,
            count,
            extra,
        }
    }

    fn backend_type(&self) -> CacheBackendKind {
        CacheBackendKind::File
    }

    fn evictable(&self) -> Option<&dyn EvictableStore> {
        Some(self)
    }
}

#[async_trait]
impl EvictableStore for FileCacheBackend {
    async fn committed_entries(&self) -> BackendResult<Vec<StoredEntry>> {
        let mut entries = Vec::new();
        for (key, path) in self.scan().await? {
            let meta = match fs::metadata(&path).await {
                Ok(meta) => meta,
                // Removed between scan and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let meta_path = Self::meta_path(&path);
            let sidecar_size = fs::metadata(&meta_path)
                .await
                .map(|m| m.len())
                .unwrap_or(0);

            entries.push(StoredEntry {
                key,
                size: meta.len() + sidecar_size,
                modified: meta.modified().unwrap_or(UNIX_EPOCH),
                expires_at: Self::read_expiry(&meta_path).await,
            });
        }
        Ok(entries)
    }

    async fn remove_entry(&self, key: &str) -> BackendResult<u64> {
        let path = self.entry_path(key)?;
        Ok(Self::remove_files(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_set_get_delete() {
        let dir = tempdir().unwrap();
        let backend = FileCacheBackend::new(dir.path()).await.unwrap();

        assert!(backend.set("file_info:abc", Bytes::from_static(b"{}"), None).await);
        assert_eq!(
            backend.get("file_info:abc").await,
            Some(Bytes::from_static(b"{}"))
        );
        assert!(backend.exists("file_info:abc").await);

        assert!(backend.delete("file_info:abc").await);
        assert!(backend.get("file_info:abc").await.is_none());
        // Deleting twice is fine.
        assert!(backend.delete("file_info:abc").await);
    }

    #[tokio::test]
    async fn test_layout_is_sharded_and_dot_free() {
        let dir = tempdir().unwrap();
        let backend = FileCacheBackend::new(dir.path()).await.unwrap();

        let path = backend.entry_path("pdf_a1b2.c3").unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(!name.contains('.'));
        assert_eq!(
            path.parent().unwrap().file_name().unwrap().to_str().unwrap(),
            &md5_str("pdf_a1b2.c3")[..2]
        );
    }

    #[tokio::test]
    async fn test_keys_of_one_namespace_spread_over_shards() {
        let dir = tempdir().unwrap();
        let backend = FileCacheBackend::new(dir.path()).await.unwrap();

        let shards: std::collections::HashSet<PathBuf> = (0..32)
            .map(|i| {
                let path = backend.entry_path(&format!("md5:{:032x}", i)).unwrap();
                path.parent().unwrap().to_path_buf()
            })
            .collect();
        assert!(shards.len() > 1);

        for i in 0..32 {
            let key = format!("md5:{:032x}", i);
            assert!(backend.set(&key, Bytes::from(key.clone()), None).await);
        }
        assert_eq!(backend.keys("md5:*").await.len(), 32);
    }

    #[tokio::test]
    async fn test_traversal_keys_stay_inside_root() {
        let dir = tempdir().unwrap();
        let backend = FileCacheBackend::new(dir.path()).await.unwrap();

        assert!(backend.set("../../etc/passwd", Bytes::from_static(b"x"), None).await);
        let path = backend.entry_path("../../etc/passwd").unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(
            backend.get("../../etc/passwd").await,
            Some(Bytes::from_static(b"x"))
        );

        assert!(backend.entry_path("").is_err());
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent_and_removed() {
        let dir = tempdir().unwrap();
        let backend = FileCacheBackend::new(dir.path()).await.unwrap();

        assert!(
            backend
                .set("md5:aa", Bytes::from_static(b"id1"), Some(Duration::from_millis(20)))
                .await
        );
        assert!(backend.exists("md5:aa").await);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(backend.get("md5:aa").await.is_none());
        let path = backend.entry_path("md5:aa").unwrap();
        assert!(!path.exists());
        assert!(!FileCacheBackend::meta_path(&path).exists());
    }

    #[tokio::test]
    async fn test_overwrite_without_expiry_clears_sidecar() {
        let dir = tempdir().unwrap();
        let backend = FileCacheBackend::new(dir.path()).await.unwrap();

        backend
            .set("k", Bytes::from_static(b"1"), Some(Duration::from_millis(20)))
            .await;
        backend.set("k", Bytes::from_static(b"2"), None).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(backend.get("k").await, Some(Bytes::from_static(b"2")));
    }

    #[tokio::test]
    async fn test_corrupt_sidecar_fails_open() {
        let dir = tempdir().unwrap();
        let backend = FileCacheBackend::new(dir.path()).await.unwrap();

        backend.set("k", Bytes::from_static(b"v"), None).await;
        let meta = FileCacheBackend::meta_path(&backend.entry_path("k").unwrap());
        std::fs::write(&meta, b"not json").unwrap();

        assert_eq!(backend.get("k").await, Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn test_keys_glob_ignores_temp_files() {
        let dir = tempdir().unwrap();
        let backend = FileCacheBackend::new(dir.path()).await.unwrap();

        backend.set("file_info:a1", Bytes::from_static(b"1"), None).await;
        backend.set("file_info:b2", Bytes::from_static(b"2"), None).await;
        backend.set("md5:c3", Bytes::from_static(b"3"), None).await;

        let shard = backend.entry_path("file_info:a1").unwrap();
        std::fs::write(shard.parent().unwrap().join(".tmp-inflight"), b"partial").unwrap();

        assert_eq!(
            backend.keys("file_info:*").await,
            vec!["file_info:a1".to_string(), "file_info:b2".to_string()]
        );
        assert_eq!(backend.keys("md5:c?").await, vec!["md5:c3".to_string()]);
        assert_eq!(backend.keys("*").await.len(), 3);
    }

    #[tokio::test]
    async fn test_batch_operations() {
        let dir = tempdir().unwrap();
        let backend = FileCacheBackend::new(dir.path()).await.unwrap();

        let mut entries = HashMap::new();
        entries.insert("a".to_string(), Bytes::from_static(b"1"));
        entries.insert("b".to_string(), Bytes::from_static(b"2"));
        let results = backend.set_many(entries, None).await;
        assert!(results.values().all(|ok| *ok));

        let keys = vec!["a".to_string(), "b".to_string(), "missing".to_string()];
        let values = backend.get_many(&keys).await;
        assert_eq!(values.len(), 2);
        assert_eq!(values["b"], Bytes::from_static(b"2"));

        let deleted = backend.delete_many(&keys).await;
        assert_eq!(deleted.len(), 3);
        assert!(backend.keys("*").await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let dir = tempdir().unwrap();
        let backend = FileCacheBackend::new(dir.path()).await.unwrap();

        backend.set("a", Bytes::from_static(b"1234"), None).await;
        backend
            .set("b", Bytes::from_static(b"56"), Some(Duration::from_secs(60)))
            .await;

        let stats = backend.get_stats().await;
        assert_eq!(stats.count, 2);
        assert!(stats.size_bytes > 6);
        assert_eq!(stats.backend, CacheBackendKind::File);

        assert!(backend.clear().await);
        assert_eq!(backend.get_stats().await.count, 0);
        assert!(backend.get("a").await.is_none());
    }

    #[test]
    fn test_glob_translation() {
        let re = glob_to_regex("url_mapping:*").unwrap();
        assert!(re.is_match("url_mapping:abc"));
        assert!(!re.is_match("xurl_mapping:abc"));
        let re = glob_to_regex("a.b?").unwrap();
        assert!(re.is_match("a.bc"));
        assert!(!re.is_match("axbc"));
    }
}
