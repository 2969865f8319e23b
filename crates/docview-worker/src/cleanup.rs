use crate::tasks::TaskStore;
use docview_core::TaskConfig;
use docview_index::FileIdentityMapping;
use docview_storage::CleanupReport;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

/// Totals of one cleanup pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupSummary {
    pub files_removed: usize,
    pub cache: CleanupReport,
    pub tasks_removed: usize,
}

#[derive(Clone)]
pub struct CleanupService {
    mapping: Arc<FileIdentityMapping>,
    /// When set, finished tasks older than `task_retention` are dropped.
    tasks: Option<Arc<TaskStore>>,
    task_retention: Duration,
    every: Duration,
}

impl CleanupService {
    pub fn new(
        mapping: Arc<FileIdentityMapping>,
        tasks: Option<Arc<TaskStore>>,
        config: &TaskConfig,
    ) -> Self {
        Self {
            mapping,
            tasks,
            task_retention: config.retention,
            every: config.cleanup_interval,
        }
    }

    /// Start the periodic cleanup loop. The first pass runs immediately.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.every.max(Duration::from_secs(1)));

            loop {
                ticker.tick().await;
                tracing::info!("Starting scheduled cleanup");
                self.run_once().await;
            }
        })
    }

    /// Expire old file records, then trim the cache, then drop old tasks.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "all"))]
    pub async fn run_once(&self) -> CleanupSummary {
        let start = Instant::now();

        let files_removed = self.mapping.cleanup(None).await;
        let cache = self.mapping.cache().cleanup().await;
        let tasks_removed = match &self.tasks {
            Some(tasks) => tasks.purge_finished(self.task_retention).await,
            None => 0,
        };

        tracing::info!(
            files_removed = files_removed,
            cache_expired = cache.expired_removed,
            cache_evicted = cache.evicted,
            bytes_freed = cache.bytes_freed,
            tasks_removed = tasks_removed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cleanup completed"
        );

        CleanupSummary {
            files_removed,
            cache,
            tasks_removed,
        }
    }
}
