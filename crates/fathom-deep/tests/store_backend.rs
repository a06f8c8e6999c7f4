use std::sync::Arc;

use fathom_deep::backend::{Backend, FsError, GrepOptions, PathError, StoreBackend};
use fathom_store::InMemoryStore;

fn backend() -> StoreBackend {
    StoreBackend::new(Arc::new(InMemoryStore::new()), vec!["workspace".to_string()])
}

#[tokio::test]
async fn write_and_read_file() {
    let backend = backend();
    backend.write("/hello.txt", "Hello World").await.unwrap();
    let content = backend.read("/hello.txt", 0, None).await.unwrap();
    assert_eq!(content, "Hello World");
}

#[tokio::test]
async fn writes_survive_a_new_handle_on_the_same_store() {
    let store = Arc::new(InMemoryStore::new());
    let first = StoreBackend::new(store.clone(), vec!["ws".to_string()]);
    first.write("/persist.txt", "kept").await.unwrap();

    let second = StoreBackend::new(store, vec!["ws".to_string()]);
    assert_eq!(second.read("/persist.txt", 0, None).await.unwrap(), "kept");
}

#[tokio::test]
async fn namespaces_are_isolated() {
    let store = Arc::new(InMemoryStore::new());
    let a = StoreBackend::new(store.clone(), vec!["a".to_string()]);
    let b = StoreBackend::new(store, vec!["b".to_string()]);

    a.write("/f.txt", "from a").await.unwrap();
    let err = b.read("/f.txt", 0, None).await.unwrap_err();
    assert!(matches!(err, FsError::Path(PathError::NotFound(_))));
}

#[tokio::test]
async fn edit_preserves_created_at() {
    let backend = backend();
    backend.write("/test.txt", "Hello World").await.unwrap();
    backend
        .edit("/test.txt", "World", "Rust", false)
        .await
        .unwrap();
    assert_eq!(
        backend.read("/test.txt", 0, None).await.unwrap(),
        "Hello Rust"
    );
}

#[tokio::test]
async fn edit_nonexistent_file_errors() {
    let backend = backend();
    let err = backend
        .edit("/missing.txt", "old", "new", false)
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::Path(PathError::NotFound(_))));
}

#[tokio::test]
async fn ls_is_a_prefix_scan() {
    let backend = backend();
    backend.write("/src/main.rs", "fn main() {}").await.unwrap();
    backend.write("/README.md", "# hi").await.unwrap();

    let entries = backend.ls_info("/").await.unwrap();
    let dir_entry = entries.iter().find(|e| e.name == "src").unwrap();
    assert!(dir_entry.is_dir);
    let file_entry = entries.iter().find(|e| e.name == "README.md").unwrap();
    assert!(!file_entry.is_dir);
}

#[tokio::test]
async fn glob_pattern_matching() {
    let backend = backend();
    backend.write("/src/main.rs", "fn main() {}").await.unwrap();
    backend.write("/src/lib.rs", "pub mod lib;").await.unwrap();
    backend.write("/README.md", "# Hello").await.unwrap();

    let matches = backend.glob("*.rs", "/src").await.unwrap();
    assert_eq!(
        matches,
        vec!["/src/lib.rs".to_string(), "/src/main.rs".to_string()]
    );
}

#[tokio::test]
async fn grep_content() {
    let backend = backend();
    backend
        .write("/test.txt", "hello world\nfoo bar\nhello again")
        .await
        .unwrap();

    let hits = backend
        .grep("hello", "/", GrepOptions::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].line_no, 1);
    assert_eq!(hits[1].line_no, 3);
}

#[tokio::test]
async fn no_execution_support() {
    let backend = backend();
    assert!(!backend.supports_execution());
    let err = backend.execute("echo hello", None, None).await.unwrap_err();
    assert_eq!(err.kind(), "CapabilityUnavailable");
}

#[tokio::test]
async fn read_with_byte_offset() {
    let backend = backend();
    backend.write("/lines.txt", "abcdefgh").await.unwrap();
    assert_eq!(backend.read("/lines.txt", 2, Some(3)).await.unwrap(), "cde");
    assert_eq!(backend.read("/lines.txt", 100, None).await.unwrap(), "");
}

#[tokio::test]
async fn write_overwrites_existing_file() {
    let backend = backend();
    backend.write("/f.txt", "original").await.unwrap();
    backend.write("/f.txt", "updated").await.unwrap();
    assert_eq!(backend.read("/f.txt", 0, None).await.unwrap(), "updated");
}
