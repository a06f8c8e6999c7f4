//! The filesystem backend contract and its implementations.
//!
//! A backend owns its storage exclusively and validates the virtual-path
//! invariants (absolute, normalized, no traversal) before touching it.
//! Four implementations ship here: in-memory state, real disk, key-value
//! store, and a longest-prefix composite router.

mod composite;
mod disk;
mod error;
mod state;
mod store;

pub use composite::CompositeBackend;
pub use disk::FilesystemBackend;
pub use error::{BackendError, EditError, FsError, PathError};
pub use state::StateBackend;
pub use store::StoreBackend;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use fathom_core::FileData;
use serde::{Deserialize, Serialize};

use crate::pathutil;

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<String>,
}

/// Options for [`Backend::grep`].
#[derive(Debug, Clone, Default)]
pub struct GrepOptions {
    /// Glob filter on file names (or relative paths when it contains `/`).
    pub include: Option<String>,
    pub case_insensitive: bool,
    pub max_hits: Option<usize>,
}

/// One grep match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepHit {
    pub path: String,
    /// 1-based line number.
    pub line_no: usize,
    pub line: String,
}

/// Result of an `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Uniform file operations over heterogeneous storage.
#[async_trait]
pub trait Backend: Send + Sync {
    /// List entries directly under a directory, sorted by name.
    async fn ls_info(&self, path: &str) -> Result<Vec<FileEntry>, FsError>;

    /// Byte-addressed read. `offset`/`limit` are byte positions clamped to
    /// char boundaries; line addressing is derived above the backend.
    async fn read(&self, path: &str, offset: usize, limit: Option<usize>)
        -> Result<String, FsError>;

    /// Replace file content atomically from the caller's viewpoint,
    /// creating parent directories as needed.
    async fn write(&self, path: &str, content: &str) -> Result<(), FsError>;

    /// Exact string replacement; returns the replacement count.
    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<usize, FsError>;

    /// Doublestar glob under `root`; absolute paths sorted lexicographically.
    async fn glob(&self, pattern: &str, root: &str) -> Result<Vec<String>, FsError>;

    /// Regex search under `root`; hits ordered by (path, line_no).
    async fn grep(
        &self,
        pattern: &str,
        root: &str,
        options: GrepOptions,
    ) -> Result<Vec<GrepHit>, FsError>;

    async fn exists(&self, path: &str) -> Result<bool, FsError>;

    /// Whether the `execute` capability is available.
    fn supports_execution(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        _command: &str,
        _cwd: Option<&str>,
        _timeout: Option<Duration>,
    ) -> Result<ExecResult, FsError> {
        Err(BackendError::CapabilityUnavailable.into())
    }

    /// Snapshot of state-backed storage, mirrored into `AgentState.files`
    /// at step boundaries. Non-state backends return `None`.
    fn snapshot_files(&self) -> Option<BTreeMap<String, FileData>> {
        None
    }

    /// Reseed state-backed storage from a checkpointing snapshot.
    fn restore_files(&self, _files: &BTreeMap<String, FileData>) {}
}

// ---------------------------------------------------------------------------
// Shared logic for map-shaped backends (state, store)
// ---------------------------------------------------------------------------

/// Build a directory listing from a set of absolute file paths.
pub(crate) fn ls_from_paths<'a>(
    dir: &str,
    files: impl Iterator<Item = (&'a String, &'a FileData)>,
) -> Vec<FileEntry> {
    let mut entries: BTreeMap<String, FileEntry> = BTreeMap::new();
    for (path, data) in files {
        let Some(relative) = pathutil::relative_to(dir, path) else {
            continue;
        };
        match relative.split_once('/') {
            None => {
                entries.insert(
                    relative.clone(),
                    FileEntry {
                        name: relative.clone(),
                        path: path.clone(),
                        is_dir: false,
                        size: Some(data.content.len() as u64),
                        mtime: Some(data.modified_at.clone()),
                    },
                );
            }
            Some((child_dir, _)) => {
                let dir_path = if dir == "/" {
                    format!("/{child_dir}")
                } else {
                    format!("{}/{}", dir.trim_end_matches('/'), child_dir)
                };
                entries
                    .entry(child_dir.to_string())
                    .or_insert_with(|| FileEntry {
                        name: child_dir.to_string(),
                        path: dir_path,
                        is_dir: true,
                        size: None,
                        mtime: None,
                    });
            }
        }
    }
    entries.into_values().collect()
}

/// Glob over a set of absolute file paths.
pub(crate) fn glob_paths<'a>(
    pattern: &str,
    root: &str,
    paths: impl Iterator<Item = &'a String>,
) -> Vec<String> {
    let mut matches: Vec<String> = paths
        .filter(|p| pathutil::is_under(root, p))
        .filter(|p| pathutil::glob_matches(pattern, root, p))
        .cloned()
        .collect();
    matches.sort();
    matches
}

/// Grep over (path, content) pairs; paths must iterate in sorted order.
pub(crate) fn grep_files<'a>(
    regex: &regex::Regex,
    root: &str,
    options: &GrepOptions,
    files: impl Iterator<Item = (&'a String, &'a String)>,
) -> Vec<GrepHit> {
    let mut hits = Vec::new();
    for (path, content) in files {
        if !pathutil::is_under(root, path) {
            continue;
        }
        if !include_matches(options, root, path) {
            continue;
        }
        for (i, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                hits.push(GrepHit {
                    path: path.clone(),
                    line_no: i + 1,
                    line: line.to_string(),
                });
                if let Some(max) = options.max_hits {
                    if hits.len() >= max {
                        return hits;
                    }
                }
            }
        }
    }
    hits
}

/// Apply the grep `include` filter: bare patterns match the file name,
/// patterns with `/` match the path relative to `root`.
pub(crate) fn include_matches(options: &GrepOptions, root: &str, path: &str) -> bool {
    let Some(include) = &options.include else {
        return true;
    };
    if include.contains('/') {
        pathutil::glob_matches(include, root, path)
    } else {
        let name = path.rsplit('/').next().unwrap_or(path);
        pathutil::doublestar_match(include, name)
    }
}

/// Compile the grep pattern with the requested case sensitivity.
pub(crate) fn build_regex(pattern: &str, case_insensitive: bool) -> Result<regex::Regex, FsError> {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| BackendError::Io(format!("invalid pattern: {e}")).into())
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
