use bytes::Bytes;
use docview_core::CacheConfig;
use docview_core::Config;
use docview_storage::{CacheBackend, CacheManager, FileCacheBackend};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;

fn cache_config(max_size_bytes: u64) -> CacheConfig {
    let mut config = Config::default().cache;
    config.max_size_bytes = max_size_bytes;
    config
}

async fn manager_in(dir: &Path, max_size_bytes: u64) -> (Arc<FileCacheBackend>, CacheManager) {
    let backend = Arc::new(FileCacheBackend::new(dir).await.unwrap());
    let manager = CacheManager::new(backend.clone(), &cache_config(max_size_bytes));
    (backend, manager)
}

fn set_mtime(path: &Path, secs_ago: u64) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
        .unwrap();
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Info {
    name: String,
    size: u64,
}

#[tokio::test]
async fn test_index_round_trips() {
    let dir = tempdir().unwrap();
    let (_, manager) = manager_in(dir.path(), u64::MAX).await;

    let info = Info {
        name: "report.docx".to_string(),
        size: 42,
    };
    assert!(manager.put_file_info("id000001", &info, None).await);
    assert_eq!(manager.get_file_info::<Info>("id000001").await, Some(info));

    assert!(manager.put_md5_mapping("ab12", "id000001").await);
    assert_eq!(
        manager.get_file_id_by_md5("ab12").await.as_deref(),
        Some("id000001")
    );

    let path = PathBuf::from("/data/storage/ab/ab12.pdf");
    assert!(manager.put_id_mapping("id000001", &path).await);
    assert_eq!(manager.get_file_path_by_id("id000001").await, Some(path.clone()));

    assert!(manager.put_url_mapping("https://example.com/a.docx", "id000001").await);
    assert_eq!(
        manager
            .get_file_id_by_url("https://example.com/a.docx")
            .await
            .as_deref(),
        Some("id000001")
    );
    assert!(manager.get_file_id_by_url("https://example.com/b.docx").await.is_none());

    assert!(manager.put_conversion("pdf", "ab12", &path).await);
    assert_eq!(manager.get_conversion("pdf", "ab12").await, Some(path.clone()));
    assert!(manager.get_conversion("xlsx", "ab12").await.is_none());

    assert!(!manager.is_file_id_retired("id000001").await);
    assert!(manager.retire_file_id("id000001").await);
    assert!(manager.is_file_id_retired("id000001").await);

    assert_eq!(manager.list_file_ids().await, vec!["id000001".to_string()]);
}

#[tokio::test]
async fn test_batch_file_info_skips_missing_and_corrupt() {
    let dir = tempdir().unwrap();
    let (backend, manager) = manager_in(dir.path(), u64::MAX).await;

    for id in ["a", "b"] {
        manager
            .put_file_info(
                id,
                &Info {
                    name: id.to_string(),
                    size: 1,
                },
                None,
            )
            .await;
    }
    backend
        .set("file_info:c", Bytes::from_static(b"{broken"), None)
        .await;

    let ids = vec![
        "a".to_string(),
        "b".to_string(),
        "c".to_string(),
        "missing".to_string(),
    ];
    let infos = manager.get_file_infos::<Info>(&ids).await;
    let found: Vec<&str> = infos.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(found, vec!["a", "b"]);
}

#[tokio::test]
async fn test_cleanup_removes_expired_entries() {
    let dir = tempdir().unwrap();
    let (backend, manager) = manager_in(dir.path(), u64::MAX).await;

    backend
        .set("short", Bytes::from_static(b"x"), Some(Duration::from_millis(10)))
        .await;
    backend.set("long", Bytes::from_static(b"y"), None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = manager.cleanup().await;
    assert_eq!(report.expired_removed, 1);
    assert_eq!(report.evicted, 0);
    assert!(report.bytes_freed > 0);
    assert_eq!(backend.keys("*").await, vec!["long".to_string()]);
}

#[tokio::test]
async fn test_cleanup_evicts_oldest_first_until_under_budget() {
    let dir = tempdir().unwrap();
    // Three 100-byte entries against a 250-byte budget: only the oldest goes.
    let (backend, manager) = manager_in(dir.path(), 250).await;

    let payload = Bytes::from(vec![0u8; 100]);
    for key in ["newest", "middle", "oldest"] {
        assert!(backend.set(key, payload.clone(), None).await);
    }
    set_mtime(&backend.entry_path("oldest").unwrap(), 300);
    set_mtime(&backend.entry_path("middle").unwrap(), 200);
    set_mtime(&backend.entry_path("newest").unwrap(), 100);

    let report = manager.cleanup().await;
    assert_eq!(report.evicted, 1);
    assert_eq!(report.bytes_freed, 100);
    assert_eq!(report.remaining_bytes, 200);
    assert_eq!(
        backend.keys("*").await,
        vec!["middle".to_string(), "newest".to_string()]
    );

    // Already within budget: nothing more to do.
    let report = manager.cleanup().await;
    assert_eq!(report.evicted, 0);
    assert_eq!(report.remaining_bytes, 200);
}

#[tokio::test]
async fn test_cleanup_never_evicts_identity_entries() {
    let dir = tempdir().unwrap();
    let (backend, manager) = manager_in(dir.path(), 50).await;

    let path = PathBuf::from("/storage/ab/abcd.pdf");
    assert!(manager.put_md5_mapping("abcd", "id000001").await);
    assert!(manager.put_id_mapping("id000001", &path).await);
    assert!(manager.put_content_path("abcd", &path).await);
    assert!(manager.put_conversion("pdf", "abcd", &path).await);
    assert!(backend.set("scratch", Bytes::from(vec![0u8; 100]), None).await);
    for key in ["md5:abcd", "id:id000001", "file:abcd"] {
        set_mtime(&backend.entry_path(key).unwrap(), 600);
    }

    let report = manager.cleanup().await;
    // Only the conversion entry and the scratch entry are evictable.
    assert_eq!(report.evicted, 2);
    assert_eq!(
        backend.keys("*").await,
        vec![
            "file:abcd".to_string(),
            "id:id000001".to_string(),
            "md5:abcd".to_string(),
        ]
    );
    assert_eq!(manager.get_file_id_by_md5("abcd").await.as_deref(), Some("id000001"));
    assert_eq!(manager.get_content_path("abcd").await, Some(path));
}

#[tokio::test]
async fn test_cleanup_counts_sidecars_toward_budget() {
    let dir = tempdir().unwrap();
    let (backend, manager) = manager_in(dir.path(), 100).await;

    backend
        .set("a", Bytes::from(vec![1u8; 100]), Some(Duration::from_secs(3600)))
        .await;

    let report = manager.cleanup().await;
    assert_eq!(report.evicted, 1);
    assert_eq!(report.remaining_bytes, 0);
}

#[tokio::test]
async fn test_statistics_include_budget() {
    let dir = tempdir().unwrap();
    let (backend, manager) = manager_in(dir.path(), 4096).await;
    backend.set("a", Bytes::from_static(b"abc"), None).await;

    let stats = manager.get_statistics().await;
    assert_eq!(stats.backend.count, 1);
    assert_eq!(stats.backend.size_bytes, 3);
    assert_eq!(stats.max_size_bytes, 4096);
    assert_eq!(stats.retention_days, 7);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["backend"], "file");
    assert_eq!(json["count"], 1);
}
