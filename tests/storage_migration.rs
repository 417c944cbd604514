// tests/storage_migration.rs

use std::fs;

use changewatch::storage::{
    CacheLocation, LastRunState, MemoryStorage, SnapshotReader, SnapshotWriter, SqliteStorage,
    StateUpdate,
};
use changewatch::{errors::ChangewatchError, migrate};
use changewatch_test_utils::init_tracing;
use tempfile::tempdir;

async fn seeded_memory() -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.save("g1", "one", 1.0).await.unwrap();
    storage.save("g1", "two", 2.0).await.unwrap();
    storage.save("g1", "three", 3.0).await.unwrap();
    storage
        .update(
            "g1",
            StateUpdate::new()
                .name("first")
                .location("https://example.org/")
                .last_checked(3.5)
                .tries(2)
                .etag(Some("\"e\"".into())),
        )
        .await
        .unwrap();
    storage.save("g2", "only", 10.0).await.unwrap();
    storage
}

#[tokio::test]
async fn backup_restore_memory_to_sqlite_preserves_history() {
    init_tracing();
    let source = seeded_memory().await;
    let backup = source.backup().await.unwrap();

    let target = SqliteStorage::in_memory().await.unwrap();
    target.restore(backup.clone()).await.unwrap();

    assert_eq!(target.backup().await.unwrap(), backup);
    let loaded = target.load("g1", Some(1)).await.unwrap();
    assert_eq!(loaded.snapshots[0].data, "three");
    assert_eq!(
        loaded.state,
        LastRunState {
            name: Some("first".into()),
            location: Some("https://example.org/".into()),
            last_checked: Some(3.5),
            tries: 2,
            etag: Some("\"e\"".into()),
        }
    );
}

#[tokio::test]
async fn sqlite_file_survives_reopen() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
        let storage = SqliteStorage::open(&path).await.unwrap();
        storage.save("g", "persisted", 5.0).await.unwrap();
        storage.close().await.unwrap();
    }

    let storage = SqliteStorage::open(&path).await.unwrap();
    let loaded = storage.load("g", None).await.unwrap();
    assert_eq!(loaded.snapshots.len(), 1);
    assert_eq!(loaded.snapshots[0].data, "persisted");
    storage.close().await.unwrap();
}

#[tokio::test]
async fn directory_cache_migrates_into_memory() {
    init_tracing();
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("abc"), "legacy payload").unwrap();
    fs::write(dir.path().join("def"), "other").unwrap();

    let target = CacheLocation::Memory.open().await.unwrap();
    let source = format!("dir:{}", dir.path().display());
    let copied = migrate(&source, &target).await.unwrap();
    assert_eq!(copied, 2);

    let reader = target.reader();
    let guids: Vec<String> = reader.get_guids().await.unwrap().into_iter().collect();
    assert_eq!(guids, vec!["abc".to_string(), "def".to_string()]);
    let loaded = reader.load("abc", None).await.unwrap();
    assert_eq!(loaded.snapshots[0].data, "legacy payload");
}

#[tokio::test]
async fn directory_cache_cannot_be_written() {
    let dir = tempdir().unwrap();
    let backend = CacheLocation::parse(dir.path().to_str().unwrap())
        .open()
        .await
        .unwrap();
    assert!(!backend.is_writable());
    assert!(matches!(
        backend.writer(),
        Err(ChangewatchError::ReadOnlyBackend("directory"))
    ));
}

#[tokio::test]
#[ignore] // Requires a redis server at CHANGEWATCH_TEST_REDIS (e.g. redis://127.0.0.1/)
async fn redis_round_trip() {
    init_tracing();
    let Ok(url) = std::env::var("CHANGEWATCH_TEST_REDIS") else {
        return;
    };
    let backend = CacheLocation::parse(&url).open().await.unwrap();
    let writer = backend.writer().unwrap();

    let guid = "changewatch-test-guid";
    writer.delete(guid).await.unwrap();
    writer.save(guid, "a", 1.0).await.unwrap();
    writer.save(guid, "b", 2.0).await.unwrap();
    writer.update(guid, StateUpdate::new().tries(1)).await.unwrap();

    let loaded = writer.load(guid, None).await.unwrap();
    assert_eq!(loaded.snapshots.len(), 2);
    assert_eq!(loaded.snapshots[0].data, "b");
    assert_eq!(loaded.state.tries, 1);

    assert_eq!(writer.clean(guid).await.unwrap(), 1);
    writer.delete(guid).await.unwrap();
    backend.close().await.unwrap();
}
