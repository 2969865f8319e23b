//! Wiring shared by the `docview` binary: builds the cache, identity mapping,
//! processor and task runner from a [`Config`].

use anyhow::Context;
use docview_core::{Config, FileType};
use docview_index::{FileFilter, FileIdentityMapping};
use docview_processing::{FileProcessor, HttpDownloader, LibreOfficeConverter};
use docview_storage::{create_backend, CacheManager};
use docview_worker::{CleanupService, ConversionTaskRunner, TaskStore};
use serde::Serialize;
use std::sync::Arc;

pub struct App {
    pub config: Arc<Config>,
    pub cache: Arc<CacheManager>,
    pub mapping: Arc<FileIdentityMapping>,
    pub processor: Arc<FileProcessor>,
    pub tasks: Arc<TaskStore>,
    pub runner: ConversionTaskRunner,
}

impl App {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        config
            .ensure_directories()
            .await
            .context("Failed to create working directories")?;
        let config = Arc::new(config);

        let backend = create_backend(&config)
            .await
            .context("Failed to open cache backend")?;
        let cache = Arc::new(CacheManager::new(backend, &config.cache));
        let mapping = Arc::new(FileIdentityMapping::new(
            cache.clone(),
            &config.directories.storage,
        ));

        let converter = Arc::new(LibreOfficeConverter::new(
            &config.conversion,
            &config.directories.convert,
        )?);
        let downloader = Arc::new(HttpDownloader::new(
            &config.directories.download,
            config.download.timeout,
        )?);

        let processor = Arc::new(FileProcessor::new(
            mapping.clone(),
            converter,
            downloader,
            config.clone(),
        ));
        let tasks = Arc::new(TaskStore::new());
        let runner = ConversionTaskRunner::new(processor.clone(), tasks.clone(), &config.tasks);

        Ok(Self {
            config,
            cache,
            mapping,
            processor,
            tasks,
            runner,
        })
    }

    pub fn cleanup_service(&self) -> CleanupService {
        CleanupService::new(self.mapping.clone(), Some(self.tasks.clone()), &self.config.tasks)
    }
}

/// Build a list filter from optional CLI arguments.
pub fn file_filter(
    file_type: Option<&str>,
    extension: Option<&str>,
    source_url: Option<String>,
) -> anyhow::Result<FileFilter> {
    let file_type = file_type
        .map(str::parse::<FileType>)
        .transpose()
        .context("Invalid --type")?;

    Ok(FileFilter {
        file_type,
        extension: extension.map(docview_core::config::normalize_extension),
        source_url,
    })
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}
