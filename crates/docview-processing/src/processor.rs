//! File processor
//!
//! Request flow: hash the content, answer from the identity mapping when the hash
//! is known, otherwise route by extension, convert (or copy) into canonical storage
//! and register the result. Nothing is registered for a failed request.

use crate::response::ProcessResponse;
use crate::routing::ConversionRoute;
use crate::traits::{Converter, Downloader};
use chrono::Utc;
use docview_core::file_utils::{self, md5_file, md5_str};
use docview_core::{AppError, Config, ConvertedInfo, DownloadInfo, FileRecord, OriginalFileInfo};
use docview_index::{FileIdentityMapping, NewFile};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Where a file came from, carried into its record.
#[derive(Debug, Default)]
struct Source {
    original_name: Option<String>,
    source_url: Option<String>,
    download_info: Option<DownloadInfo>,
}

struct Processed {
    record: FileRecord,
    cached: bool,
}

pub struct FileProcessor {
    mapping: Arc<FileIdentityMapping>,
    converter: Arc<dyn Converter>,
    downloader: Arc<dyn Downloader>,
    config: Arc<Config>,
}

impl FileProcessor {
    pub fn new(
        mapping: Arc<FileIdentityMapping>,
        converter: Arc<dyn Converter>,
        downloader: Arc<dyn Downloader>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            mapping,
            converter,
            downloader,
            config,
        }
    }

    pub fn mapping(&self) -> &Arc<FileIdentityMapping> {
        &self.mapping
    }

    /// Process a local file. `original_name` defaults to the file's own name.
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub async fn process_file(&self, path: &Path, original_name: Option<&str>) -> ProcessResponse {
        let source = Source {
            original_name: original_name.map(str::to_string),
            ..Default::default()
        };
        Self::respond(self.process_local(path, source).await)
    }

    /// Download and process a remote document.
    #[tracing::instrument(skip(self))]
    pub async fn process_url(&self, url: &str) -> ProcessResponse {
        Self::respond(self.process_remote(url.trim()).await)
    }

    /// Process uploaded bytes saved under the upload directory.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn process_upload(&self, data: &[u8], filename: &str) -> ProcessResponse {
        Self::respond(self.process_uploaded(data, filename).await)
    }

    /// Details and URLs of a registered file.
    pub async fn get_file_by_id(&self, file_id: &str) -> ProcessResponse {
        match self.mapping.get_record(file_id).await {
            Some(record) => ProcessResponse::from_record(&record, "File found", true),
            None => ProcessResponse::failed(&AppError::NotFound("File not found".to_string())),
        }
    }

    fn respond(result: Result<Processed, AppError>) -> ProcessResponse {
        match result {
            Ok(Processed { record, cached }) => {
                let message = if cached {
                    "File already processed"
                } else {
                    "File processed successfully"
                };
                ProcessResponse::from_record(&record, message, cached)
            }
            Err(e) => ProcessResponse::failed(&e),
        }
    }

    async fn process_local(&self, path: &Path, source: Source) -> Result<Processed, AppError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(AppError::NotFound("File not found".to_string()));
        }

        let extension = file_utils::extension_of(path);
        let content_hash = md5_file(path).await?;
        let original_name = source.original_name.clone().or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        });

        if let Some(file_id) = self.mapping.get_id_by_md5(&content_hash).await {
            tracing::info!(file_id = %file_id, content_hash = %content_hash, "Content already registered");
            self.mapping
                .add(NewFile {
                    content_hash: content_hash.clone(),
                    original_name,
                    source_url: source.source_url,
                    download_info: source.download_info,
                    ..Default::default()
                })
                .await?;
            return self.load(&file_id, true).await;
        }

        // Only content that still needs converting is held to the allow-list.
        if !self.config.is_supported_extension(&extension) {
            return Err(AppError::UnsupportedFormat(display_extension(&extension)));
        }
        let route = ConversionRoute::for_extension(&extension)
            .ok_or_else(|| AppError::UnsupportedFormat(display_extension(&extension)))?;

        let original_info = original_file_info(path, &content_hash).await?;
        let (artifact, converted_info) = self
            .produce_artifact(path, &content_hash, &extension, route)
            .await?;

        let file_id = self
            .mapping
            .add(NewFile {
                content_hash,
                path: artifact,
                original_name,
                source_url: source.source_url,
                download_info: source.download_info,
                original_info: Some(original_info),
                converted_info: Some(converted_info),
            })
            .await?;

        self.load(&file_id, false).await
    }

    async fn load(&self, file_id: &str, cached: bool) -> Result<Processed, AppError> {
        let record = self
            .mapping
            .get_record(file_id)
            .await
            .ok_or_else(|| AppError::Internal(format!("Record {} vanished after registration", file_id)))?;
        Ok(Processed { record, cached })
    }

    /// Convert or copy `input` into canonical storage, reusing a previous
    /// conversion of the same content when its artifact still exists.
    async fn produce_artifact(
        &self,
        input: &Path,
        content_hash: &str,
        extension: &str,
        route: ConversionRoute,
    ) -> Result<(PathBuf, ConvertedInfo), AppError> {
        let cache = self.mapping.cache();
        let method = route.cache_method();

        if let Some(existing) = cache.get_conversion(method, content_hash).await {
            if tokio::fs::try_exists(&existing).await.unwrap_or(false) {
                tracing::debug!(path = %existing.display(), method = method, "Reusing conversion result");
                let info = converted_info(&existing, route, 0).await?;
                return Ok((existing, info));
            }
            cache.delete_conversion(method, content_hash).await;
        }

        let target_extension = route.target().map_or(extension, |t| t.extension());
        let dest = self.mapping.storage_path_for(content_hash, target_extension);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let start = Instant::now();
        match route.target() {
            Some(target) => {
                let output = self.converter.convert(input, target).await?;
                move_file(&output, &dest).await?;
                self.remove_job_dir(&output).await;
            }
            None => {
                tokio::fs::copy(input, &dest).await?;
            }
        }
        let duration_ms = start.elapsed().as_millis() as u64;

        if !cache.put_conversion(method, content_hash, &dest).await {
            tracing::warn!(content_hash = %content_hash, method = method, "Failed to cache conversion result");
        }

        let info = converted_info(&dest, route, duration_ms).await?;
        tracing::info!(
            path = %dest.display(),
            method = route.method_name(),
            duration_ms = duration_ms,
            "Stored artifact"
        );
        Ok((dest, info))
    }

    /// Removes the converter's job directory once its output has been moved away.
    async fn remove_job_dir(&self, output: &Path) {
        if let Some(job_dir) = output.parent() {
            if job_dir.starts_with(&self.config.directories.convert) && job_dir != self.config.directories.convert {
                if let Err(e) = tokio::fs::remove_dir_all(job_dir).await {
                    tracing::debug!(job_dir = %job_dir.display(), error = %e, "Failed to remove job directory");
                }
            }
        }
    }

    async fn process_remote(&self, url: &str) -> Result<Processed, AppError> {
        if url.is_empty() {
            return Err(AppError::InvalidInput("URL is required".to_string()));
        }

        if let Some(file_id) = self.mapping.get_id_by_url(url).await {
            tracing::info!(file_id = %file_id, "URL already registered");
            return self.load(&file_id, true).await;
        }

        let local = self.downloader.fetch(url).await?;
        let source = Source {
            original_name: local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            source_url: Some(url.to_string()),
            download_info: Some(DownloadInfo {
                url: url.to_string(),
                url_hash: md5_str(url),
                download_time: Utc::now(),
            }),
        };

        let result = self.process_local(&local, source).await;
        remove_temp(&local, &self.config.directories.download).await;
        result
    }

    async fn process_uploaded(&self, data: &[u8], filename: &str) -> Result<Processed, AppError> {
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::InvalidInput("Filename is required".to_string()))?;

        let dir = self
            .config
            .directories
            .upload
            .join(Uuid::new_v4().simple().to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&name);
        tokio::fs::write(&path, data).await?;

        let source = Source {
            original_name: Some(name),
            ..Default::default()
        };
        let result = self.process_local(&path, source).await;
        remove_temp(&path, &self.config.directories.upload).await;
        result
    }
}

fn display_extension(extension: &str) -> String {
    if extension.is_empty() {
        "(none)".to_string()
    } else {
        extension.to_string()
    }
}

async fn original_file_info(path: &Path, content_hash: &str) -> Result<OriginalFileInfo, AppError> {
    let info = file_utils::file_info(path).await?;
    Ok(OriginalFileInfo {
        path: path.to_path_buf(),
        filename: info.filename,
        extension: info.extension,
        size: info.size,
        last_modified: info.modified,
        md5: content_hash.to_string(),
    })
}

async fn converted_info(
    path: &Path,
    route: ConversionRoute,
    duration_ms: u64,
) -> Result<ConvertedInfo, AppError> {
    let info = file_utils::file_info(path).await?;
    Ok(ConvertedInfo {
        path: path.to_path_buf(),
        filename: info.filename,
        extension: info.extension,
        size: info.size,
        conversion_method: route.method_name().to_string(),
        conversion_time: Utc::now(),
        conversion_duration_ms: duration_ms,
        md5: md5_file(path).await?,
        mime_type: info.mime_type,
    })
}

/// Rename, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

/// Delete a temporary input and its per-request directory under `root`.
async fn remove_temp(path: &Path, root: &Path) {
    let target = match path.parent() {
        Some(dir) if dir.starts_with(root) && dir != root => dir,
        _ => path,
    };
    let result = if target == path {
        tokio::fs::remove_file(target).await
    } else {
        tokio::fs::remove_dir_all(target).await
    };
    if let Err(e) = result {
        tracing::debug!(path = %target.display(), error = %e, "Failed to remove temporary file");
    }
}
