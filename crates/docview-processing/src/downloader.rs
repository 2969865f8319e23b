use crate::error::FetchError;
use crate::traits::Downloader;
use async_trait::async_trait;
use docview_core::constants::DEFAULT_DOWNLOAD_FILENAME;
use docview_core::file_utils::{extension_for_mime, extension_of};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// HTTP(S) downloader. Single attempt, bounded by the client timeout.
///
/// Each download lands in its own `<download_dir>/<uuid>/` directory under the
/// filename taken from the URL path.
pub struct HttpDownloader {
    client: reqwest::Client,
    download_dir: PathBuf,
}

impl HttpDownloader {
    pub fn new(download_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            download_dir: download_dir.into(),
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }
}

/// Last non-empty path segment, percent-decoded and stripped of separators.
pub fn filename_from_url(url: &reqwest::Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(|name| {
            urlencoding::decode(name)
                .map(|n| n.into_owned())
                .unwrap_or_else(|_| name.to_string())
        })
        .map(|name| name.replace(['/', '\\'], "_"))
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_FILENAME.to_string())
}

#[async_trait]
impl Downloader for HttpDownloader {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<PathBuf, FetchError> {
        let parsed = reqwest::Url::parse(url.trim())
            .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidUrl(format!(
                "Only HTTP and HTTPS URLs are allowed: {}",
                url
            )));
        }

        let start = Instant::now();
        let mut response = self.client.get(parsed.clone()).send().await.map_err(|e| {
            tracing::warn!(error = %e, "Download request failed");
            FetchError::from(e)
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let mut filename = filename_from_url(&parsed);
        if extension_of(Path::new(&filename)).is_empty() {
            if let Some(ext) = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|h| h.to_str().ok())
                .and_then(extension_for_mime)
            {
                filename.push_str(ext);
            }
        }

        let dir = self.download_dir.join(Uuid::new_v4().simple().to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&filename);

        let mut file = tokio::fs::File::create(&path).await?;
        let mut size_bytes: u64 = 0;
        let result: Result<(), FetchError> = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                size_bytes += chunk.len() as u64;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            drop(file);
            let _ = tokio::fs::remove_dir_all(&dir).await;
            tracing::warn!(error = %e, "Download interrupted");
            return Err(e);
        }

        tracing::info!(
            path = %path.display(),
            size_bytes = size_bytes,
            duration_ms = start.elapsed().as_millis() as u64,
            "Downloaded file"
        );

        Ok(path)
    }
}
