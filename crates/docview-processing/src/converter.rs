//! LibreOffice converter - headless office document conversion

use crate::error::ConversionError;
use crate::traits::{Converter, TargetFormat};
use async_trait::async_trait;
use docview_core::ConversionConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use uuid::Uuid;

/// Runs `<binary> --headless --convert-to <fmt> --outdir <job dir> <input>`.
///
/// Each call gets a fresh job directory under `convert_dir`. An attempt that
/// exceeds `timeout` is killed; up to `retry_times` attempts are made.
pub struct LibreOfficeConverter {
    binary: String,
    convert_dir: PathBuf,
    timeout: Duration,
    retry_times: u32,
}

impl LibreOfficeConverter {
    pub fn new(config: &ConversionConfig, convert_dir: impl Into<PathBuf>) -> Result<Self, ConversionError> {
        let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
        if config.libreoffice_path.chars().any(|c| dangerous_chars.contains(&c)) {
            return Err(ConversionError::Spawn(
                "Invalid converter path: contains dangerous characters".to_string(),
            ));
        }

        Ok(Self {
            binary: config.libreoffice_path.clone(),
            convert_dir: convert_dir.into(),
            timeout: config.timeout,
            retry_times: config.retry_times.max(1),
        })
    }

    pub fn convert_dir(&self) -> &Path {
        &self.convert_dir
    }

    fn expected_output(job_dir: &Path, input: &Path, target: TargetFormat) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        job_dir.join(format!("{}{}", stem, target.extension()))
    }

    async fn attempt(
        &self,
        input: &Path,
        job_dir: &Path,
        target: TargetFormat,
    ) -> Result<PathBuf, ConversionError> {
        let child = Command::new(&self.binary)
            .arg("--headless")
            .arg("--convert-to")
            .arg(target.to_string())
            .arg("--outdir")
            .arg(job_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConversionError::Spawn(format!("{}: {}", self.binary, e)))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConversionError::Timeout {
                    timeout: self.timeout,
                    attempts: 1,
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConversionError::Failed(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let produced = Self::expected_output(job_dir, input, target);
        if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            return Err(ConversionError::MissingOutput(produced.display().to_string()));
        }

        Ok(produced)
    }
}

#[async_trait]
impl Converter for LibreOfficeConverter {
    #[tracing::instrument(skip(self), fields(input = %input.display(), target = %target))]
    async fn convert(&self, input: &Path, target: TargetFormat) -> Result<PathBuf, ConversionError> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(ConversionError::InputMissing(input.display().to_string()));
        }

        let job_dir = self.convert_dir.join(Uuid::new_v4().simple().to_string());
        tokio::fs::create_dir_all(&job_dir).await?;

        let start = Instant::now();
        let mut last_error = None;

        for attempt in 1..=self.retry_times {
            match self.attempt(input, &job_dir, target).await {
                Ok(output) => {
                    tracing::info!(
                        output = %output.display(),
                        attempt = attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Document converted"
                    );
                    return Ok(output);
                }
                // A missing binary will not appear on retry.
                Err(e @ ConversionError::Spawn(_)) => {
                    tracing::error!(error = %e, "Failed to start converter");
                    last_error = Some(e);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = self.retry_times,
                        error = %e,
                        "Conversion attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(&job_dir).await {
            tracing::debug!(job_dir = %job_dir.display(), error = %e, "Failed to remove job directory");
        }

        let err = match last_error {
            Some(ConversionError::Timeout { timeout, .. }) => ConversionError::Timeout {
                timeout,
                attempts: self.retry_times,
            },
            Some(e) => e,
            None => ConversionError::Failed("no conversion attempt was made".to_string()),
        };

        tracing::error!(error = %err, duration_ms = start.elapsed().as_millis() as u64, "Conversion failed");
        Err(err)
    }
}
