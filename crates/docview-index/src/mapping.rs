//! File identity mapping
//!
//! Assigns each distinct content hash one `FileRecord` with a short, never reused id.
//! Records and their indices live in the cache backend; lookups verify that the
//! stored artifact still exists and purge anything stale they run into.

use crate::error::{IndexError, IndexResult};
use chrono::{Duration as ChronoDuration, Utc};
use docview_core::file_utils::{self, FileInfo};
use docview_core::{ConvertedInfo, DownloadInfo, FileRecord, FileType, OriginalFileInfo};
use docview_storage::CacheManager;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

/// Upper bound on id candidates tried by `generate_file_id`.
pub const MAX_ID_ATTEMPTS: usize = 64;

const HASH_LOCK_STRIPES: usize = 64;

/// Registration request for `FileIdentityMapping::add`.
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub content_hash: String,
    pub path: PathBuf,
    pub original_name: Option<String>,
    pub source_url: Option<String>,
    pub download_info: Option<DownloadInfo>,
    pub original_info: Option<OriginalFileInfo>,
    pub converted_info: Option<ConvertedInfo>,
}

/// Exact-match filter for `list_files`; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub file_type: Option<FileType>,
    pub extension: Option<String>,
    pub source_url: Option<String>,
}

impl FileFilter {
    fn matches(&self, record: &FileRecord) -> bool {
        self.file_type.map_or(true, |t| record.file_type == t)
            && self
                .extension
                .as_deref()
                .map_or(true, |e| record.extension == docview_core::config::normalize_extension(e))
            && self
                .source_url
                .as_deref()
                .map_or(true, |u| record.source_url.as_deref() == Some(u))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FilePage {
    pub items: Vec<FileRecord>,
    /// Matching records before pagination
    pub total: usize,
}

pub struct FileIdentityMapping {
    cache: Arc<CacheManager>,
    storage_dir: PathBuf,
    retention_days: u32,
    /// Ids handed out but not yet persisted
    reserved_ids: Mutex<HashSet<String>>,
    hash_locks: Vec<AsyncMutex<()>>,
}

impl FileIdentityMapping {
    pub fn new(cache: Arc<CacheManager>, storage_dir: impl Into<PathBuf>) -> Self {
        let retention_days = cache.retention_days();
        Self {
            cache,
            storage_dir: storage_dir.into(),
            retention_days,
            reserved_ids: Mutex::new(HashSet::new()),
            hash_locks: (0..HASH_LOCK_STRIPES).map(|_| AsyncMutex::new(())).collect(),
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Canonical location of the artifact for `content_hash`:
    /// `<storage_dir>/<hash[0..2]>/<hash><extension>`.
    pub fn storage_path_for(&self, content_hash: &str, extension: &str) -> PathBuf {
        let shard = content_hash.get(..2).unwrap_or(content_hash);
        self.storage_dir
            .join(shard)
            .join(format!("{}{}", content_hash, extension))
    }

    async fn lock_hash(&self, content_hash: &str) -> MutexGuard<'_, ()> {
        let stripe = content_hash
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
            % HASH_LOCK_STRIPES;
        self.hash_locks[stripe].lock().await
    }

    fn reserve(&self, candidate: &str) -> bool {
        match self.reserved_ids.lock() {
            Ok(mut reserved) => reserved.insert(candidate.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(candidate.to_string()),
        }
    }

    /// Drop an in-process reservation made by `generate_file_id`.
    pub fn release_file_id(&self, file_id: &str) {
        match self.reserved_ids.lock() {
            Ok(mut reserved) => reserved.remove(file_id),
            Err(poisoned) => poisoned.into_inner().remove(file_id),
        };
    }

    /// Reserve a fresh id that no live record, retired id or concurrent caller uses.
    ///
    /// The reservation lasts until the id is persisted by `add` or released with
    /// `release_file_id`.
    pub async fn generate_file_id(&self) -> IndexResult<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = file_utils::generate_file_id();
            if !self.reserve(&candidate) {
                continue;
            }

            let taken = self
                .cache
                .get_file_info::<FileRecord>(&candidate)
                .await
                .is_some()
                || self.cache.is_file_id_retired(&candidate).await;

            if taken {
                self.release_file_id(&candidate);
                continue;
            }

            return Ok(candidate);
        }

        tracing::error!(attempts = MAX_ID_ATTEMPTS, "File id space exhausted");
        Err(IndexError::IdSpaceExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Register content, or merge into the record that already holds its hash.
    ///
    /// Returns the file id, which is the existing one on a repeat submission.
    #[tracing::instrument(skip(self, file), fields(content_hash = %file.content_hash))]
    pub async fn add(&self, file: NewFile) -> IndexResult<String> {
        let _guard = self.lock_hash(&file.content_hash).await;

        if let Some(record) = self.live_record_for_hash(&file.content_hash).await {
            let file_id = record.file_id.clone();
            self.merge(record, file).await?;
            tracing::debug!(file_id = %file_id, "Merged into existing file record");
            return Ok(file_id);
        }

        let info = file_utils::file_info(&file.path).await?;
        let file_id = self.generate_file_id().await?;
        let result = self.create(&file_id, file, info).await;
        self.release_file_id(&file_id);
        result?;

        tracing::info!(file_id = %file_id, "Registered new file");
        Ok(file_id)
    }

    async fn create(&self, file_id: &str, file: NewFile, info: FileInfo) -> IndexResult<()> {
        let now = Utc::now();
        let record = FileRecord {
            file_id: file_id.to_string(),
            content_hash: file.content_hash,
            path: file.path,
            original_name: file.original_name.or(Some(info.filename)),
            file_type: info.file_type,
            extension: info.extension,
            size: info.size,
            mime_type: info.mime_type,
            source_url: file.source_url,
            download_info: file.download_info,
            original_file_info: file.original_info,
            converted_info: file.converted_info,
            creation_time: now,
            last_accessed: now,
        };

        // The record goes first so no index ever points at a missing record.
        self.persist_record(&record).await?;

        let persisted = self
            .cache
            .put_md5_mapping(&record.content_hash, file_id)
            .await
            && self.cache.put_id_mapping(file_id, &record.path).await
            && self
                .cache
                .put_content_path(&record.content_hash, &record.path)
                .await;
        let persisted = match record.source_url.as_deref() {
            Some(url) if persisted => self.cache.put_url_mapping(url, file_id).await,
            _ => persisted,
        };

        if !persisted {
            self.remove_indices(&record).await;
            return Err(IndexError::Persist {
                what: "indices",
                file_id: file_id.to_string(),
            });
        }

        Ok(())
    }

    async fn merge(&self, mut record: FileRecord, file: NewFile) -> IndexResult<()> {
        if let Some(name) = file.original_name {
            if record.original_name.as_deref() != Some(name.as_str()) {
                tracing::debug!(file_id = %record.file_id, name = %name, "Updating original name");
                record.original_name = Some(name);
            }
        }

        if let Some(url) = file.source_url {
            if !self.cache.put_url_mapping(&url, &record.file_id).await {
                return Err(IndexError::Persist {
                    what: "url mapping",
                    file_id: record.file_id,
                });
            }
            record.source_url = Some(url);
        }

        if file.download_info.is_some() {
            record.download_info = file.download_info;
        }
        if file.original_info.is_some() {
            record.original_file_info = file.original_info;
        }
        if file.converted_info.is_some() {
            record.converted_info = file.converted_info;
        }

        if file.path != record.path && !file.path.as_os_str().is_empty() {
            self.relocate(&mut record, file.path).await?;
        }

        record.last_accessed = Utc::now();
        self.persist_record(&record).await
    }

    /// Point the record at `new_path` and refresh everything derived from the file.
    async fn relocate(&self, record: &mut FileRecord, new_path: PathBuf) -> IndexResult<()> {
        let info = file_utils::file_info(&new_path).await?;
        record.path = new_path;
        record.file_type = info.file_type;
        record.extension = info.extension;
        record.size = info.size;
        record.mime_type = info.mime_type;

        let ok = self.cache.put_id_mapping(&record.file_id, &record.path).await
            && self
                .cache
                .put_content_path(&record.content_hash, &record.path)
                .await;
        if ok {
            Ok(())
        } else {
            Err(IndexError::Persist {
                what: "path mapping",
                file_id: record.file_id.clone(),
            })
        }
    }

    async fn persist_record(&self, record: &FileRecord) -> IndexResult<()> {
        if self
            .cache
            .put_file_info(&record.file_id, record, None)
            .await
        {
            Ok(())
        } else {
            Err(IndexError::Persist {
                what: "file record",
                file_id: record.file_id.clone(),
            })
        }
    }

    /// Record holding `content_hash`, purging the hash index if it is stale.
    async fn live_record_for_hash(&self, content_hash: &str) -> Option<FileRecord> {
        let file_id = self.cache.get_file_id_by_md5(content_hash).await?;

        match self.cache.get_file_info::<FileRecord>(&file_id).await {
            Some(record) if record.is_live().await => Some(record),
            Some(record) => {
                tracing::info!(file_id = %file_id, path = %record.path.display(), "Stored file vanished, dropping record");
                self.remove_record(&record).await;
                None
            }
            None => {
                tracing::debug!(file_id = %file_id, "Dangling hash index, removing");
                self.cache.delete_md5_mapping(content_hash).await;
                None
            }
        }
    }

    /// Lock the hash stripe of `file_id` and re-read its record under the lock, so a
    /// concurrent merge or delete is never overwritten by a stale copy.
    async fn lock_record(&self, file_id: &str) -> Option<(MutexGuard<'_, ()>, FileRecord)> {
        let content_hash = self
            .cache
            .get_file_info::<FileRecord>(file_id)
            .await?
            .content_hash;
        let guard = self.lock_hash(&content_hash).await;
        let record = self.cache.get_file_info::<FileRecord>(file_id).await?;
        Some((guard, record))
    }

    /// Bump the access time of a live record. Dead records are purged.
    /// Returns the record and whether the new access time was persisted.
    async fn touch(&self, file_id: &str) -> Option<(FileRecord, bool)> {
        let (_guard, mut record) = self.lock_record(file_id).await?;

        if !record.is_live().await {
            tracing::info!(file_id = %file_id, path = %record.path.display(), "Stored file vanished, dropping record");
            self.remove_record(&record).await;
            return None;
        }

        record.last_accessed = Utc::now();
        let persisted = match self.persist_record(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(file_id = %file_id, error = %e, "Failed to update access time");
                false
            }
        };
        Some((record, persisted))
    }

    /// Full record for `file_id`, bumping its access time.
    pub async fn get_record(&self, file_id: &str) -> Option<FileRecord> {
        self.touch(file_id).await.map(|(record, _)| record)
    }

    /// Stored path and original name for `file_id`.
    pub async fn get_by_id(&self, file_id: &str) -> Option<(PathBuf, Option<String>)> {
        self.get_record(file_id)
            .await
            .map(|r| (r.path, r.original_name))
    }

    pub async fn get_id_by_url(&self, url: &str) -> Option<String> {
        let file_id = self.cache.get_file_id_by_url(url).await?;

        match self.cache.get_file_info::<FileRecord>(&file_id).await {
            Some(record) if record.is_live().await => Some(file_id),
            Some(record) => {
                self.remove_record(&record).await;
                self.cache.delete_url_mapping(url).await;
                None
            }
            None => {
                tracing::debug!(file_id = %file_id, "Dangling URL index, removing");
                self.cache.delete_url_mapping(url).await;
                None
            }
        }
    }

    pub async fn get_id_by_md5(&self, content_hash: &str) -> Option<String> {
        self.live_record_for_hash(content_hash)
            .await
            .map(|r| r.file_id)
    }

    pub async fn update_access_time(&self, file_id: &str) -> bool {
        matches!(self.touch(file_id).await, Some((_, true)))
    }

    /// Point an existing record at a rewritten artifact.
    pub async fn update_path(
        &self,
        file_id: &str,
        new_path: PathBuf,
        converted_info: Option<ConvertedInfo>,
    ) -> IndexResult<()> {
        let Some((_guard, mut record)) = self.lock_record(file_id).await else {
            return Err(IndexError::NotFound(file_id.to_string()));
        };

        self.relocate(&mut record, new_path).await?;
        if converted_info.is_some() {
            record.converted_info = converted_info;
        }
        record.last_accessed = Utc::now();
        self.persist_record(&record).await
    }

    /// Delete a record and its indices and retire the id. Returns whether a record
    /// existed; deleting twice is harmless.
    pub async fn delete(&self, file_id: &str) -> bool {
        match self.lock_record(file_id).await {
            Some((_guard, record)) => {
                self.remove_record(&record).await;
                tracing::info!(file_id = %file_id, "Deleted file record");
                true
            }
            None => {
                self.cache.delete_id_mapping(file_id).await;
                self.cache.retire_file_id(file_id).await;
                false
            }
        }
    }

    async fn remove_record(&self, record: &FileRecord) {
        self.remove_indices(record).await;
        self.cache.delete_file_info(&record.file_id).await;
        self.cache.retire_file_id(&record.file_id).await;

        if record.path.starts_with(&self.storage_dir) {
            match tokio::fs::remove_file(&record.path).await {
                Ok(()) => {
                    tracing::debug!(path = %record.path.display(), "Removed stored artifact")
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %record.path.display(), error = %e, "Failed to remove stored artifact")
                }
            }
        }
    }

    /// Removes index entries that still point at this record.
    async fn remove_indices(&self, record: &FileRecord) {
        let id = record.file_id.as_str();

        if self.cache.get_file_id_by_md5(&record.content_hash).await.as_deref() == Some(id) {
            self.cache.delete_md5_mapping(&record.content_hash).await;
        }

        if self.cache.get_content_path(&record.content_hash).await.as_deref()
            == Some(record.path.as_path())
        {
            self.cache.delete_content_path(&record.content_hash).await;
        }

        if let Some(url) = record.source_url.as_deref() {
            if self.cache.get_file_id_by_url(url).await.as_deref() == Some(id) {
                self.cache.delete_url_mapping(url).await;
            }
        }

        self.cache.delete_id_mapping(id).await;
    }

    async fn all_records(&self) -> Vec<FileRecord> {
        let ids = self.cache.list_file_ids().await;
        self.cache
            .get_file_infos::<FileRecord>(&ids)
            .await
            .into_iter()
            .map(|(_, record)| record)
            .collect()
    }

    /// Delete records not accessed within the retention window (configured default
    /// when `retention_days` is `None`). Returns the number removed.
    pub async fn cleanup(&self, retention_days: Option<u32>) -> usize {
        let days = retention_days.unwrap_or(self.retention_days);
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));

        let mut removed = 0;
        for record in self.all_records().await {
            if record.last_accessed >= cutoff {
                continue;
            }
            // Re-check under the lock; the record may have been read since.
            let Some((_guard, current)) = self.lock_record(&record.file_id).await else {
                continue;
            };
            if current.last_accessed < cutoff {
                self.remove_record(&current).await;
                removed += 1;
            }
        }

        tracing::info!(removed = removed, retention_days = days, "File retention cleanup completed");
        removed
    }

    /// Live records matching `filter`, most recently accessed first. Records whose
    /// artifact is gone are purged on the way.
    pub async fn list_files(&self, limit: usize, offset: usize, filter: &FileFilter) -> FilePage {
        let mut matching: Vec<FileRecord> = Vec::new();
        for record in self.all_records().await {
            if !filter.matches(&record) {
                continue;
            }
            if record.is_live().await {
                matching.push(record);
                continue;
            }
            if let Some((_guard, current)) = self.lock_record(&record.file_id).await {
                if !current.is_live().await {
                    tracing::info!(file_id = %current.file_id, "Stored file vanished, dropping record");
                    self.remove_record(&current).await;
                }
            }
        }

        matching.sort_by(|a, b| {
            b.last_accessed
                .cmp(&a.last_accessed)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });

        let total = matching.len();
        let items = matching.into_iter().skip(offset).take(limit).collect();

        FilePage { items, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docview_core::Config;
    use docview_storage::FileCacheBackend;
    use tempfile::tempdir;

    async fn mapping(dir: &Path) -> FileIdentityMapping {
        let backend = Arc::new(FileCacheBackend::new(dir.join("cache")).await.unwrap());
        let cache = Arc::new(CacheManager::new(backend, &Config::default().cache));
        FileIdentityMapping::new(cache, dir.join("storage"))
    }

    #[tokio::test]
    async fn test_storage_path_is_sharded() {
        let dir = tempdir().unwrap();
        let m = mapping(dir.path()).await;
        let path = m.storage_path_for("abcdef", ".pdf");
        assert_eq!(path, dir.path().join("storage").join("ab").join("abcdef.pdf"));
    }

    #[tokio::test]
    async fn test_retired_ids_are_not_handed_out_again() {
        let dir = tempdir().unwrap();
        let m = mapping(dir.path()).await;

        let id = m.generate_file_id().await.unwrap();
        // Reserved ids are refused until released.
        assert!(!m.reserve(&id));
        m.release_file_id(&id);
        assert!(m.reserve(&id));
        m.release_file_id(&id);

        m.delete(&id).await;
        assert!(m.cache().is_file_id_retired(&id).await);
    }

    #[test]
    fn test_filter_normalizes_extension() {
        let now = Utc::now();
        let record = FileRecord {
            file_id: "x".to_string(),
            content_hash: "h".to_string(),
            path: PathBuf::from("/s/h.pdf"),
            original_name: None,
            file_type: FileType::Pdf,
            extension: ".pdf".to_string(),
            size: 1,
            mime_type: "application/pdf".to_string(),
            source_url: None,
            download_info: None,
            original_file_info: None,
            converted_info: None,
            creation_time: now,
            last_accessed: now,
        };

        let filter = FileFilter {
            extension: Some("PDF".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&record));

        let filter = FileFilter {
            file_type: Some(FileType::Word),
            ..Default::default()
        };
        assert!(!filter.matches(&record));
    }
}
