use bytes::Bytes;
use study_sets::file_store::{FileStore, FileStoreError, LocalFileStore};

#[tokio::test]
async fn test_local_store_put_creates_parents() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileStore::new(dir.path()).unwrap();

    store
        .put("tmp/upload.pdf", Bytes::from("hello world"))
        .await
        .unwrap();

    assert!(store.exists("tmp/upload.pdf").await.unwrap());
    let on_disk = std::fs::read(store.resolve("tmp/upload.pdf").unwrap()).unwrap();
    assert_eq!(on_disk, b"hello world");
}

#[tokio::test]
async fn test_local_store_ensure_directory_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileStore::new(dir.path()).unwrap();

    store.ensure_directory("1/2").await.unwrap();
    store.ensure_directory("1/2").await.unwrap();
    assert!(store.exists("1/2").await.unwrap());
}

#[tokio::test]
async fn test_local_store_move_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileStore::new(dir.path()).unwrap();

    store.put("tmp/a.pdf", Bytes::from("data")).await.unwrap();
    let final_path = store.move_file("tmp/a.pdf", "1/2/a.pdf").await.unwrap();

    assert!(final_path.ends_with("1/2/a.pdf"));
    assert!(final_path.is_absolute());
    assert!(!store.exists("tmp/a.pdf").await.unwrap());
    assert!(store.exists("1/2/a.pdf").await.unwrap());
}

#[tokio::test]
async fn test_local_store_move_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileStore::new(dir.path()).unwrap();

    let result = store.move_file("tmp/missing.pdf", "1/2/missing.pdf").await;
    assert!(matches!(result, Err(FileStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_local_store_delete_nonexistent() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileStore::new(dir.path()).unwrap();

    // Deleting a nonexistent key should not error
    store.delete_file("nonexistent").await.unwrap();
    store.delete_directory_recursive("nowhere").await.unwrap();
}

#[tokio::test]
async fn test_local_store_delete_directory_recursive() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileStore::new(dir.path()).unwrap();

    store.put("1/2/a.pdf", Bytes::from("a")).await.unwrap();
    store.put("1/2/nested/b.pdf", Bytes::from("b")).await.unwrap();

    store.delete_directory_recursive("1/2").await.unwrap();
    assert!(!store.exists("1/2").await.unwrap());
    assert!(store.exists("1").await.unwrap());
}

#[tokio::test]
async fn test_local_store_rejects_escaping_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileStore::new(dir.path()).unwrap();

    for key in ["../outside", "/etc/passwd", "1/../../x", ""] {
        let result = store.put(key, Bytes::from("x")).await;
        assert!(
            matches!(result, Err(FileStoreError::InvalidKey(_))),
            "key {key:?} should be rejected"
        );
    }
}
