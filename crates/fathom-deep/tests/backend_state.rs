use fathom_deep::backend::{Backend, EditError, FsError, GrepOptions, PathError, StateBackend};

#[tokio::test]
async fn write_and_read_file() {
    let backend = StateBackend::new();
    backend
        .write("/hello.txt", "line1\nline2\nline3")
        .await
        .unwrap();
    let content = backend.read("/hello.txt", 0, None).await.unwrap();
    assert_eq!(content, "line1\nline2\nline3");
}

#[tokio::test]
async fn read_is_byte_addressed() {
    let backend = StateBackend::new();
    backend
        .write("/nums.txt", "line1\nline2\nline3")
        .await
        .unwrap();

    let chunk = backend.read("/nums.txt", 6, Some(5)).await.unwrap();
    assert_eq!(chunk, "line2");

    let tail = backend.read("/nums.txt", 12, None).await.unwrap();
    assert_eq!(tail, "line3");

    let past_end = backend.read("/nums.txt", 100, Some(10)).await.unwrap();
    assert_eq!(past_end, "");
}

#[tokio::test]
async fn read_file_not_found() {
    let backend = StateBackend::new();
    let err = backend.read("/missing.txt", 0, None).await.unwrap_err();
    assert!(matches!(err, FsError::Path(PathError::NotFound(_))));
}

#[tokio::test]
async fn relative_path_is_rejected() {
    let backend = StateBackend::new();
    let err = backend.read("missing.txt", 0, None).await.unwrap_err();
    assert!(matches!(err, FsError::Path(PathError::NotAbsolute(_))));
}

#[tokio::test]
async fn edit_requires_unique_old_string() {
    let backend = StateBackend::new();
    backend.write("/x.txt", "foo foo").await.unwrap();

    let err = backend.edit("/x.txt", "foo", "bar", false).await.unwrap_err();
    assert!(matches!(err, FsError::Edit(EditError::OldNotUnique(2))));

    let count = backend.edit("/x.txt", "foo", "bar", true).await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(backend.read("/x.txt", 0, None).await.unwrap(), "bar bar");
}

#[tokio::test]
async fn edit_single_replacement() {
    let backend = StateBackend::new();
    backend.write("/f.txt", "hello world").await.unwrap();
    let count = backend.edit("/f.txt", "hello", "hi", false).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(backend.read("/f.txt", 0, None).await.unwrap(), "hi world");
}

#[tokio::test]
async fn edit_empty_or_identical_strings_fail() {
    let backend = StateBackend::new();
    backend.write("/f.txt", "content").await.unwrap();

    let err = backend.edit("/f.txt", "", "x", false).await.unwrap_err();
    assert!(matches!(err, FsError::Edit(EditError::EmptyOldString)));

    let err = backend.edit("/f.txt", "content", "content", false).await.unwrap_err();
    assert!(matches!(err, FsError::Edit(EditError::NoChange)));
}

#[tokio::test]
async fn ls_lists_files_and_directories() {
    let backend = StateBackend::new();
    backend.write("/a.txt", "").await.unwrap();
    backend.write("/dir/b.txt", "").await.unwrap();
    backend.write("/dir/c.txt", "").await.unwrap();

    let entries = backend.ls_info("/").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "a.txt");
    assert!(!entries[0].is_dir);
    assert_eq!(entries[0].path, "/a.txt");
    assert_eq!(entries[1].name, "dir");
    assert!(entries[1].is_dir);
    assert_eq!(entries[1].path, "/dir");
}

#[tokio::test]
async fn ls_subdirectory() {
    let backend = StateBackend::new();
    backend.write("/src/main.rs", "fn main() {}").await.unwrap();
    backend.write("/src/lib.rs", "").await.unwrap();
    backend.write("/src/utils/helper.rs", "").await.unwrap();

    let entries = backend.ls_info("/src").await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].name, "lib.rs");
    assert_eq!(entries[1].name, "main.rs");
    assert_eq!(entries[2].name, "utils");
    assert!(entries[2].is_dir);
}

#[tokio::test]
async fn ls_on_a_file_is_not_directory() {
    let backend = StateBackend::new();
    backend.write("/f.txt", "x").await.unwrap();
    let err = backend.ls_info("/f.txt").await.unwrap_err();
    assert!(matches!(err, FsError::Path(PathError::NotDirectory(_))));
}

#[tokio::test]
async fn glob_star_within_directory() {
    let backend = StateBackend::new();
    backend.write("/src/main.rs", "").await.unwrap();
    backend.write("/src/lib.rs", "").await.unwrap();
    backend.write("/src/test.txt", "").await.unwrap();

    let matches = backend.glob("*.rs", "/src").await.unwrap();
    assert_eq!(matches, vec!["/src/lib.rs".to_string(), "/src/main.rs".to_string()]);
}

#[tokio::test]
async fn glob_doublestar_matches_zero_or_more_segments() {
    let backend = StateBackend::new();
    backend.write("/a.rs", "").await.unwrap();
    backend.write("/src/b.rs", "").await.unwrap();
    backend.write("/src/deep/c.rs", "").await.unwrap();
    backend.write("/src/d.txt", "").await.unwrap();

    let matches = backend.glob("**/*.rs", "/").await.unwrap();
    assert_eq!(
        matches,
        vec![
            "/a.rs".to_string(),
            "/src/b.rs".to_string(),
            "/src/deep/c.rs".to_string()
        ]
    );
}

#[tokio::test]
async fn grep_returns_hits_in_path_then_line_order() {
    let backend = StateBackend::new();
    backend.write("/b.txt", "match here\nand match again").await.unwrap();
    backend.write("/a.txt", "no\nmatch\nlines").await.unwrap();
    backend.write("/c.txt", "nothing").await.unwrap();

    let hits = backend
        .grep("match", "/", GrepOptions::default())
        .await
        .unwrap();
    let rendered: Vec<String> = hits
        .iter()
        .map(|h| format!("{}:{}:{}", h.path, h.line_no, h.line))
        .collect();
    assert_eq!(
        rendered,
        vec![
            "/a.txt:2:match",
            "/b.txt:1:match here",
            "/b.txt:2:and match again"
        ]
    );
}

#[tokio::test]
async fn grep_with_include_and_case_insensitive() {
    let backend = StateBackend::new();
    backend.write("/src/a.rs", "fn Main()").await.unwrap();
    backend.write("/src/b.txt", "fn main()").await.unwrap();

    let hits = backend
        .grep(
            "main",
            "/",
            GrepOptions {
                include: Some("*.rs".to_string()),
                case_insensitive: true,
                max_hits: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "/src/a.rs");
}

#[tokio::test]
async fn grep_respects_max_hits() {
    let backend = StateBackend::new();
    backend.write("/f.txt", "x\nx\nx\nx").await.unwrap();

    let hits = backend
        .grep(
            "x",
            "/",
            GrepOptions {
                max_hits: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn exists_for_files_and_directories() {
    let backend = StateBackend::new();
    backend.write("/dir/f.txt", "x").await.unwrap();

    assert!(backend.exists("/dir/f.txt").await.unwrap());
    assert!(backend.exists("/dir").await.unwrap());
    assert!(backend.exists("/").await.unwrap());
    assert!(!backend.exists("/other").await.unwrap());
}

#[tokio::test]
async fn execute_not_supported() {
    let backend = StateBackend::new();
    assert!(!backend.supports_execution());
    let err = backend.execute("ls", None, None).await.unwrap_err();
    assert_eq!(err.kind(), "CapabilityUnavailable");
}

#[tokio::test]
async fn write_then_read_roundtrips_exactly() {
    let backend = StateBackend::new();
    let content = "héllo wörld\n\ttabs and \"quotes\"\n";
    backend.write("/u.txt", content).await.unwrap();
    assert_eq!(backend.read("/u.txt", 0, None).await.unwrap(), content);
}

#[tokio::test]
async fn snapshot_and_restore_roundtrip() {
    let backend = StateBackend::new();
    backend.write("/a.txt", "one").await.unwrap();

    let snapshot = backend.snapshot_files().unwrap();
    assert_eq!(snapshot.len(), 1);

    let other = StateBackend::new();
    other.restore_files(&snapshot);
    assert_eq!(other.read("/a.txt", 0, None).await.unwrap(), "one");
}

#[tokio::test]
async fn path_normalization_collapses_dots() {
    let backend = StateBackend::new();
    backend.write("/a/./b.txt", "content").await.unwrap();
    let content = backend.read("/a//b.txt", 0, None).await.unwrap();
    assert_eq!(content, "content");
}
