//! Cache manager
//!
//! Typed operations over a `CacheBackend`: file records, the hash/id/URL indices,
//! conversion results and retired ids, plus size-bounded cleanup.

use crate::keys;
use crate::traits::{BackendStats, CacheBackend, StoredEntry};
use bytes::Bytes;
use docview_core::CacheConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Result of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub expired_removed: usize,
    pub evicted: usize,
    pub bytes_freed: u64,
    pub remaining_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    #[serde(flatten)]
    pub backend: BackendStats,
    pub max_size_bytes: u64,
    pub retention_days: u32,
}

pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    max_size_bytes: u64,
    retention_days: u32,
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend,
            max_size_bytes: config.max_size_bytes,
            retention_days: config.retention_days,
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    async fn put_string(&self, key: &str, value: &str, expire: Option<Duration>) -> bool {
        self.backend
            .set(key, Bytes::copy_from_slice(value.as_bytes()), expire)
            .await
    }

    async fn get_string(&self, key: &str) -> Option<String> {
        let raw = self.backend.get(key).await?;
        match String::from_utf8(raw.to_vec()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key = %key, "Cache value is not valid UTF-8");
                None
            }
        }
    }

    fn decode<T: DeserializeOwned>(key: &str, raw: &[u8]) -> Option<T> {
        match serde_json::from_slice(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to decode cached JSON");
                None
            }
        }
    }

    // File records

    pub async fn put_file_info<T: Serialize>(
        &self,
        file_id: &str,
        info: &T,
        expire: Option<Duration>,
    ) -> bool {
        let key = keys::file_info(file_id);
        match serde_json::to_vec(info) {
            Ok(raw) => self.backend.set(&key, Bytes::from(raw), expire).await,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode file info");
                false
            }
        }
    }

    pub async fn get_file_info<T: DeserializeOwned>(&self, file_id: &str) -> Option<T> {
        let key = keys::file_info(file_id);
        let raw = self.backend.get(&key).await?;
        Self::decode(&key, &raw)
    }

    pub async fn delete_file_info(&self, file_id: &str) -> bool {
        self.backend.delete(&keys::file_info(file_id)).await
    }

    /// Ids of every stored file record.
    pub async fn list_file_ids(&self) -> Vec<String> {
        self.backend
            .keys(&keys::file_info_pattern())
            .await
            .into_iter()
            .filter_map(|k| k.strip_prefix(keys::FILE_INFO_PREFIX).map(str::to_string))
            .collect()
    }

    /// Batch read of file records; ids without a decodable record are skipped.
    pub async fn get_file_infos<T: DeserializeOwned>(&self, file_ids: &[String]) -> Vec<(String, T)> {
        let lookup: Vec<String> = file_ids.iter().map(|id| keys::file_info(id)).collect();
        let mut values = self.backend.get_many(&lookup).await;

        file_ids
            .iter()
            .zip(lookup.iter())
            .filter_map(|(id, key)| {
                let raw = values.remove(key)?;
                Self::decode(key, &raw).map(|info| (id.clone(), info))
            })
            .collect()
    }

    // Content hash -> id

    pub async fn put_md5_mapping(&self, content_hash: &str, file_id: &str) -> bool {
        self.put_string(&keys::md5(content_hash), file_id, None).await
    }

    pub async fn get_file_id_by_md5(&self, content_hash: &str) -> Option<String> {
        self.get_string(&keys::md5(content_hash)).await
    }

    pub async fn delete_md5_mapping(&self, content_hash: &str) -> bool {
        self.backend.delete(&keys::md5(content_hash)).await
    }

    // Id -> stored path

    pub async fn put_id_mapping(&self, file_id: &str, path: &std::path::Path) -> bool {
        self.put_string(&keys::id(file_id), &path.to_string_lossy(), None)
            .await
    }

    pub async fn get_file_path_by_id(&self, file_id: &str) -> Option<PathBuf> {
        self.get_string(&keys::id(file_id)).await.map(PathBuf::from)
    }

    pub async fn delete_id_mapping(&self, file_id: &str) -> bool {
        self.backend.delete(&keys::id(file_id)).await
    }

    // URL -> id

    pub async fn put_url_mapping(&self, url: &str, file_id: &str) -> bool {
        self.put_string(&keys::url_mapping(url), file_id, None).await
    }

    pub async fn get_file_id_by_url(&self, url: &str) -> Option<String> {
        self.get_string(&keys::url_mapping(url)).await
    }

    pub async fn delete_url_mapping(&self, url: &str) -> bool {
        self.backend.delete(&keys::url_mapping(url)).await
    }

    // Content hash -> stored path

    pub async fn put_content_path(&self, content_hash: &str, path: &std::path::Path) -> bool {
        self.put_string(&keys::content(content_hash), &path.to_string_lossy(), None)
            .await
    }

    pub async fn get_content_path(&self, content_hash: &str) -> Option<PathBuf> {
        self.get_string(&keys::content(content_hash))
            .await
            .map(PathBuf::from)
    }

    pub async fn delete_content_path(&self, content_hash: &str) -> bool {
        self.backend.delete(&keys::content(content_hash)).await
    }

    // Conversion results

    pub async fn put_conversion(
        &self,
        method: &str,
        content_hash: &str,
        path: &std::path::Path,
    ) -> bool {
        self.put_string(
            &keys::conversion(method, content_hash),
            &path.to_string_lossy(),
            None,
        )
        .await
    }

    pub async fn get_conversion(&self, method: &str, content_hash: &str) -> Option<PathBuf> {
        self.get_string(&keys::conversion(method, content_hash))
            .await
            .map(PathBuf::from)
    }

    pub async fn delete_conversion(&self, method: &str, content_hash: &str) -> bool {
        self.backend
            .delete(&keys::conversion(method, content_hash))
            .await
    }

    // Retired ids

    pub async fn retire_file_id(&self, file_id: &str) -> bool {
        self.put_string(&keys::retired(file_id), "1", None).await
    }

    pub async fn is_file_id_retired(&self, file_id: &str) -> bool {
        self.backend.exists(&keys::retired(file_id)).await
    }

    pub async fn get_statistics(&self) -> CacheStatistics {
        CacheStatistics {
            backend: self.backend.get_stats().await,
            max_size_bytes: self.max_size_bytes,
            retention_days: self.retention_days,
        }
    }

    /// Remove expired entries, then evict least recently modified entries until the
    /// cache fits `max_size_bytes`. Identity-mapping entries are never size-evicted;
    /// records leave through the mapping's own retention cleanup. Backends without
    /// the eviction capability get an empty report.
    pub async fn cleanup(&self) -> CleanupReport {
        let Some(store) = self.backend.evictable() else {
            tracing::debug!(
                backend = %self.backend.backend_type(),
                "Backend manages its own eviction, skipping cleanup"
            );
            return CleanupReport::default();
        };

        let start = Instant::now();
        let entries = match store.committed_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list cache entries for cleanup");
                return CleanupReport::default();
            }
        };

        let mut report = CleanupReport::default();
        let now = SystemTime::now();
        let mut live: Vec<StoredEntry> = Vec::with_capacity(entries.len());

        for entry in entries {
            if !entry.is_expired(now) {
                live.push(entry);
                continue;
            }
            match store.remove_entry(&entry.key).await {
                Ok(freed) => {
                    report.expired_removed += 1;
                    report.bytes_freed += freed;
                }
                Err(e) => {
                    tracing::warn!(key = %entry.key, error = %e, "Failed to remove expired entry");
                    live.push(entry);
                }
            }
        }

        let mut total: u64 = live.iter().map(|e| e.size).sum();

        if total > self.max_size_bytes {
            live.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.key.cmp(&b.key)));

            for entry in live.iter().filter(|e| !keys::is_identity_key(&e.key)) {
                if total <= self.max_size_bytes {
                    break;
                }
                match store.remove_entry(&entry.key).await {
                    Ok(freed) => {
                        report.evicted += 1;
                        report.bytes_freed += freed;
                        total = total.saturating_sub(entry.size);
                    }
                    Err(e) => {
                        tracing::warn!(key = %entry.key, error = %e, "Failed to evict entry");
                    }
                }
            }
        }

        report.remaining_bytes = total;
        if total > self.max_size_bytes {
            tracing::warn!(
                remaining_bytes = total,
                max_size_bytes = self.max_size_bytes,
                "Identity entries alone exceed the cache budget"
            );
        }

        tracing::info!(
            expired_removed = report.expired_removed,
            evicted = report.evicted,
            bytes_freed = report.bytes_freed,
            remaining_bytes = report.remaining_bytes,
            max_size_bytes = self.max_size_bytes,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cache cleanup completed"
        );

        report
    }
}
