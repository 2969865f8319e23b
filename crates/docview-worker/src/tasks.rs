use chrono::{DateTime, Utc};
use docview_core::file_utils::generate_task_id;
use docview_core::{TaskRecord, TaskStatus};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory task store shared by the runner and its pollers.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<String, TaskRecord>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending task and return its id.
    pub async fn create(&self) -> String {
        let task_id = generate_task_id();
        self.tasks
            .write()
            .await
            .insert(task_id.clone(), TaskRecord::new(task_id.clone()));
        task_id
    }

    pub async fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// Apply `update` to a task and bump its `updated_at`. Returns false for
    /// unknown ids.
    pub async fn update<F>(&self, task_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut TaskRecord),
    {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(task_id) {
            Some(task) => {
                update(task);
                task.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn set_progress(&self, task_id: &str, status: TaskStatus, progress: u8, message: &str) -> bool {
        self.update(task_id, |task| {
            task.status = status;
            task.progress = progress.min(100);
            task.message = Some(message.to_string());
        })
        .await
    }

    pub async fn list(&self) -> Vec<TaskRecord> {
        let mut tasks: Vec<TaskRecord> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Drop finished tasks last updated more than `retention` ago.
    pub async fn purge_finished(&self, retention: Duration) -> usize {
        let cutoff: DateTime<Utc> = match chrono::Duration::from_std(retention) {
            Ok(d) => Utc::now() - d,
            Err(_) => return 0,
        };

        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| !(task.status.is_finished() && task.updated_at < cutoff));
        before - tasks.len()
    }
}
