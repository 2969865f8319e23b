use docview_core::{Config, TaskRecord, TaskStatus};
use docview_index::FileIdentityMapping;
use docview_processing::test_helpers::{MockConverter, MockDownloader, MockOutcome};
use docview_processing::FileProcessor;
use docview_storage::{CacheManager, FileCacheBackend};
use docview_worker::{CleanupService, ConversionJob, ConversionTaskRunner, TaskStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

struct Fixture {
    dir: TempDir,
    config: Config,
    converter: Arc<MockConverter>,
    downloader: Arc<MockDownloader>,
    mapping: Arc<FileIdentityMapping>,
    runner: ConversionTaskRunner,
}

async fn fixture_with(configure: impl FnOnce(&mut Config), delay: Option<Duration>) -> Fixture {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.directories.cache = dir.path().join("cache");
    config.directories.download = dir.path().join("download");
    config.directories.convert = dir.path().join("convert");
    config.directories.upload = dir.path().join("upload");
    config.directories.storage = dir.path().join("storage");
    configure(&mut config);
    config.ensure_directories().await.unwrap();

    let backend = Arc::new(FileCacheBackend::new(&config.directories.cache).await.unwrap());
    let cache = Arc::new(CacheManager::new(backend, &config.cache));
    let mapping = Arc::new(FileIdentityMapping::new(cache, &config.directories.storage));

    let mut converter = MockConverter::new(&config.directories.convert);
    if let Some(delay) = delay {
        converter = converter.with_delay(delay);
    }
    let converter = Arc::new(converter);
    let downloader = Arc::new(MockDownloader::new(&config.directories.download));

    let processor = Arc::new(FileProcessor::new(
        mapping.clone(),
        converter.clone(),
        downloader.clone(),
        Arc::new(config.clone()),
    ));
    let runner = ConversionTaskRunner::new(processor, Arc::new(TaskStore::new()), &config.tasks);

    Fixture {
        dir,
        config,
        converter,
        downloader,
        mapping,
        runner,
    }
}

async fn fixture() -> Fixture {
    fixture_with(|_| {}, None).await
}

impl Fixture {
    fn write(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.dir.path().join("inbox").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, data).unwrap();
        path
    }

    async fn run(&self, job: ConversionJob) -> TaskRecord {
        let (task_id, handle) = self.runner.spawn(job).await;
        handle.await.unwrap();
        self.runner.store().get(&task_id).await.unwrap()
    }
}

#[tokio::test]
async fn test_submit_returns_task_id_and_task_completes() {
    let fx = fixture().await;
    let input = fx.write("report.docx", b"quarterly numbers");

    let response = fx
        .runner
        .submit(ConversionJob::File {
            path: input,
            original_name: None,
        })
        .await;
    assert!(response.is_success());
    assert!(response.file_id.is_none());
    let task_id = response.task_id.unwrap();

    let mut task = fx.runner.store().get(&task_id).await.unwrap();
    for _ in 0..200 {
        if task.status.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        task = fx.runner.store().get(&task_id).await.unwrap();
    }

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100);
    let file_id = task.file_id.unwrap();
    assert_eq!(
        task.preview_url.as_deref(),
        Some(format!("/preview?file_id={}", file_id).as_str())
    );
    assert!(fx.mapping.get_by_id(&file_id).await.is_some());
}

#[tokio::test]
async fn test_failed_conversion_marks_task_failed() {
    let fx = fixture().await;
    fx.converter.set_outcome(MockOutcome::Fail);
    let input = fx.write("broken.pptx", b"not really slides");

    let task = fx
        .run(ConversionJob::File {
            path: input,
            original_name: None,
        })
        .await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("CONVERSION_FAILED"));
    assert_eq!(task.message.as_deref(), Some("Document conversion failed"));
    assert!(task.file_id.is_none());
}

#[tokio::test]
async fn test_url_and_upload_jobs_resolve_to_same_file() {
    let fx = fixture().await;
    let url = "https://files.example.com/handbook.docx";
    fx.downloader.set_file(url, "handbook.docx", b"handbook".to_vec());

    let from_url = fx.run(ConversionJob::Url { url: url.to_string() }).await;
    let from_upload = fx
        .run(ConversionJob::Upload {
            data: b"handbook".to_vec(),
            filename: "copy.docx".to_string(),
        })
        .await;

    assert_eq!(from_url.status, TaskStatus::Completed);
    assert_eq!(from_upload.status, TaskStatus::Completed);
    assert_eq!(from_url.file_id, from_upload.file_id);
    assert_eq!(fx.converter.calls(), 1);
}

#[tokio::test]
async fn test_existing_job_for_unknown_id_fails() {
    let fx = fixture().await;

    let task = fx
        .run(ConversionJob::Existing {
            file_id: "missing1".to_string(),
        })
        .await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("NOT_FOUND"));
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let fx = fixture_with(
        |config| config.tasks.max_concurrent = 1,
        Some(Duration::from_millis(200)),
    )
    .await;
    let first = fx.write("one.docx", b"first document");
    let second = fx.write("two.docx", b"second document");

    let (id1, h1) = fx
        .runner
        .spawn(ConversionJob::File {
            path: first,
            original_name: None,
        })
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let (id2, h2) = fx
        .runner
        .spawn(ConversionJob::File {
            path: second,
            original_name: None,
        })
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The second task waits for the only permit.
    let waiting = fx.runner.store().get(&id2).await.unwrap();
    assert_eq!(waiting.status, TaskStatus::Pending);

    h1.await.unwrap();
    h2.await.unwrap();
    for id in [id1, id2] {
        let task = fx.runner.store().get(&id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }
}

#[tokio::test]
async fn test_cleanup_service_removes_expired_files_and_old_tasks() {
    let fx = fixture_with(
        |config| {
            config.cache.retention_days = 0;
            config.tasks.retention = Duration::ZERO;
        },
        None,
    )
    .await;
    let input = fx.write("old.docx", b"old document");
    let task = fx
        .run(ConversionJob::File {
            path: input,
            original_name: None,
        })
        .await;
    let file_id = task.file_id.unwrap();
    let (artifact, _) = fx.mapping.get_by_id(&file_id).await.unwrap();
    assert!(artifact.exists());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let service = CleanupService::new(
        fx.mapping.clone(),
        Some(fx.runner.store().clone()),
        &fx.config.tasks,
    );
    let summary = service.run_once().await;

    assert_eq!(summary.files_removed, 1);
    assert_eq!(summary.tasks_removed, 1);
    assert!(fx.mapping.get_by_id(&file_id).await.is_none());
    assert!(!artifact.exists());
    assert!(fx.runner.store().list().await.is_empty());
}
