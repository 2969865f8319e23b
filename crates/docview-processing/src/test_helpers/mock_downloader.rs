//! Mock Downloader implementation for testing

use crate::error::FetchError;
use crate::traits::Downloader;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Serves registered URLs from memory; unknown URLs answer 404.
pub struct MockDownloader {
    download_dir: PathBuf,
    files: Mutex<HashMap<String, (String, Vec<u8>)>>,
    calls: AtomicUsize,
}

impl MockDownloader {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            files: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Register `url` to download as `filename` with `data`.
    pub fn set_file(&self, url: &str, filename: &str, data: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), (filename.to_string(), data));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn fetch(&self, url: &str) -> Result<PathBuf, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let entry = self.files.lock().unwrap().get(url).cloned();
        let Some((filename, data)) = entry else {
            return Err(FetchError::Status(404));
        };

        let dir = self.download_dir.join(Uuid::new_v4().simple().to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }
}
