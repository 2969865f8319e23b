//! Background conversion tasks.
//!
//! Each submission gets a task id right away; the work runs on a spawned task
//! bounded by a semaphore, and progress is written to the [`TaskStore`].

use crate::tasks::TaskStore;
use docview_core::{TaskConfig, TaskStatus};
use docview_processing::{FileProcessor, ProcessResponse};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Input of a background conversion.
#[derive(Debug, Clone)]
pub enum ConversionJob {
    /// Already-registered file; the task resolves to its record.
    Existing { file_id: String },
    File {
        path: PathBuf,
        original_name: Option<String>,
    },
    Url { url: String },
    Upload { data: Vec<u8>, filename: String },
}

impl ConversionJob {
    fn kind(&self) -> &'static str {
        match self {
            ConversionJob::Existing { .. } => "existing",
            ConversionJob::File { .. } => "file",
            ConversionJob::Url { .. } => "url",
            ConversionJob::Upload { .. } => "upload",
        }
    }
}

#[derive(Clone)]
pub struct ConversionTaskRunner {
    processor: Arc<FileProcessor>,
    store: Arc<TaskStore>,
    semaphore: Arc<Semaphore>,
}

impl ConversionTaskRunner {
    pub fn new(processor: Arc<FileProcessor>, store: Arc<TaskStore>, config: &TaskConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        tracing::info!(max_concurrent = max_concurrent, "Conversion task runner created");

        Self {
            processor,
            store,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Register a task for `job` and start it. The returned response only carries
    /// the task id; poll the store for the outcome.
    pub async fn submit(&self, job: ConversionJob) -> ProcessResponse {
        let (task_id, _) = self.spawn(job).await;
        ProcessResponse::submitted(task_id)
    }

    /// Like [`submit`](Self::submit) but also hands back the worker handle.
    pub async fn spawn(&self, job: ConversionJob) -> (String, JoinHandle<()>) {
        let task_id = self.store.create().await;
        tracing::info!(task_id = %task_id, kind = job.kind(), "Conversion task submitted");

        let runner = self.clone();
        let id = task_id.clone();
        let handle = tokio::spawn(async move {
            runner.run(&id, job).await;
        });

        (task_id, handle)
    }

    async fn run(&self, task_id: &str, job: ConversionJob) {
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %e, "Task runner closed");
                self.fail(task_id, "Task runner unavailable", "INTERNAL_ERROR").await;
                return;
            }
        };

        self.store
            .set_progress(task_id, TaskStatus::Processing, 10, "Processing started")
            .await;

        let response = match job {
            ConversionJob::Existing { file_id } => self.processor.get_file_by_id(&file_id).await,
            ConversionJob::File {
                path,
                original_name,
            } => {
                self.store
                    .set_progress(task_id, TaskStatus::Processing, 50, "Converting file")
                    .await;
                self.processor
                    .process_file(&path, original_name.as_deref())
                    .await
            }
            ConversionJob::Url { url } => {
                self.store
                    .set_progress(task_id, TaskStatus::Processing, 30, "Downloading file")
                    .await;
                self.processor.process_url(&url).await
            }
            ConversionJob::Upload { data, filename } => {
                self.store
                    .set_progress(task_id, TaskStatus::Processing, 50, "Converting upload")
                    .await;
                self.processor.process_upload(&data, &filename).await
            }
        };

        if response.is_success() {
            self.store
                .update(task_id, |task| {
                    task.status = TaskStatus::Completed;
                    task.progress = 100;
                    task.message = Some(response.message.clone());
                    task.file_id = response.file_id.clone();
                    task.preview_url = response.preview_url.clone();
                    task.download_url = response.download_url.clone();
                })
                .await;
            tracing::info!(task_id = %task_id, file_id = ?response.file_id, "Conversion task completed");
        } else {
            let code = response.error.as_deref().unwrap_or("INTERNAL_ERROR");
            self.fail(task_id, &response.message, code).await;
        }
    }

    async fn fail(&self, task_id: &str, message: &str, code: &str) {
        self.store
            .update(task_id, |task| {
                task.status = TaskStatus::Failed;
                task.progress = 100;
                task.message = Some(message.to_string());
                task.error = Some(code.to_string());
            })
            .await;
        tracing::warn!(task_id = %task_id, code = code, "Conversion task failed");
    }
}
