//! Mock Converter implementation for testing

use crate::error::ConversionError;
use crate::traits::{Converter, TargetFormat};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// What the next conversions do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    /// Write `converted:<target>:` followed by the input bytes
    Succeed,
    Fail,
    Timeout,
}

/// Converter that writes a deterministic output file and counts calls.
pub struct MockConverter {
    output_dir: PathBuf,
    outcome: Mutex<MockOutcome>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockConverter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            outcome: Mutex::new(MockOutcome::Succeed),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleep this long inside every conversion.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_outcome(&self, outcome: MockOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for MockConverter {
    async fn convert(&self, input: &Path, target: TargetFormat) -> Result<PathBuf, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = *self.outcome.lock().unwrap();
        match outcome {
            MockOutcome::Fail => Err(ConversionError::Failed("mock failure".to_string())),
            MockOutcome::Timeout => Err(ConversionError::Timeout {
                timeout: Duration::from_millis(1),
                attempts: 1,
            }),
            MockOutcome::Succeed => {
                let data = tokio::fs::read(input)
                    .await
                    .map_err(|_| ConversionError::InputMissing(input.display().to_string()))?;

                let job_dir = self.output_dir.join(Uuid::new_v4().simple().to_string());
                tokio::fs::create_dir_all(&job_dir).await?;
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "output".to_string());
                let output = job_dir.join(format!("{}{}", stem, target.extension()));

                let mut content = format!("converted:{}:", target).into_bytes();
                content.extend_from_slice(&data);
                tokio::fs::write(&output, content).await?;
                Ok(output)
            }
        }
    }
}
