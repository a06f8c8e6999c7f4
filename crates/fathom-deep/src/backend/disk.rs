//! Real-disk backend rooted at a directory.
//!
//! Virtual `/` maps to the root; after symlink resolution every touched
//! path must remain beneath it. `execute` is available only when enabled
//! at construction time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::pathutil;

use super::{
    build_regex, include_matches, Backend, BackendError, ExecResult, FileEntry, FsError, GrepHit,
    GrepOptions, PathError,
};

pub struct FilesystemBackend {
    root: PathBuf,
    execute_enabled: bool,
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            execute_enabled: false,
        }
    }

    /// Enable the `execute` capability (commands run under the root via
    /// `sh -c`).
    pub fn with_execution(mut self) -> Self {
        self.execute_enabled = true;
        self
    }

    /// Resolve a virtual path to an OS path, enforcing the root guard.
    ///
    /// Symlinks on the existing prefix are resolved; the realpath must
    /// stay beneath the canonical root.
    async fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let joined = pathutil::safe_join(&self.root, path)?;

        let canonical_root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| BackendError::Io(format!("root not accessible: {e}")))?;

        // Canonicalize the deepest existing ancestor so symlinks cannot
        // smuggle the path outside the root.
        let mut existing = joined.clone();
        let mut suffix = Vec::new();
        while !existing.exists() {
            let Some(parent) = existing.parent() else {
                break;
            };
            if let Some(name) = existing.file_name() {
                suffix.push(name.to_os_string());
            }
            existing = parent.to_path_buf();
        }
        let mut canonical = tokio::fs::canonicalize(&existing).await.map_err(FsError::from)?;
        for part in suffix.iter().rev() {
            canonical.push(part);
        }

        if !canonical.starts_with(&canonical_root) {
            return Err(PathError::PathOutsideRoot(path.to_string()).into());
        }
        Ok(joined)
    }

    /// The virtual path of an OS path under the root.
    fn virtual_path(&self, os_path: &Path) -> String {
        let relative = os_path.strip_prefix(&self.root).unwrap_or(os_path);
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        format!("/{joined}")
    }

    /// Collect every regular file under `dir`, depth-first, sorted by
    /// virtual path.
    async fn walk(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        let mut files = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await.map_err(FsError::from)? {
                let file_type = entry.file_type().await.map_err(FsError::from)?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else {
                    files.push(entry.path());
                }
            }
        }
        files.sort_by_key(|p| self.virtual_path(p));
        Ok(files)
    }
}

fn mtime_string(metadata: &std::fs::Metadata) -> Option<String> {
    metadata
        .modified()
        .ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339())
}

#[async_trait]
impl Backend for FilesystemBackend {
    async fn ls_info(&self, path: &str) -> Result<Vec<FileEntry>, FsError> {
        let dir = self.resolve(path).await?;
        let metadata = tokio::fs::metadata(&dir)
            .await
            .map_err(|_| PathError::NotFound(path.to_string()))?;
        if !metadata.is_dir() {
            return Err(PathError::NotDirectory(path.to_string()).into());
        }

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(FsError::from)?;
        while let Some(entry) = reader.next_entry().await.map_err(FsError::from)? {
            let metadata = entry.metadata().await.map_err(FsError::from)?;
            let name = entry.file_name().to_string_lossy().to_string();
            entries.push(FileEntry {
                path: self.virtual_path(&entry.path()),
                is_dir: metadata.is_dir(),
                size: (!metadata.is_dir()).then(|| metadata.len()),
                mtime: mtime_string(&metadata),
                name,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read(
        &self,
        path: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<String, FsError> {
        let os_path = self.resolve(path).await?;
        let metadata = tokio::fs::metadata(&os_path)
            .await
            .map_err(|_| PathError::NotFound(path.to_string()))?;
        if metadata.is_dir() {
            return Err(PathError::IsDirectory(path.to_string()).into());
        }
        let content = tokio::fs::read_to_string(&os_path).await.map_err(FsError::from)?;
        Ok(pathutil::byte_slice(&content, offset, limit).to_string())
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), FsError> {
        let os_path = self.resolve(path).await?;
        if let Some(parent) = os_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(FsError::from)?;
        }
        tokio::fs::write(&os_path, content).await.map_err(FsError::from)
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<usize, FsError> {
        let os_path = self.resolve(path).await?;
        let content = tokio::fs::read_to_string(&os_path)
            .await
            .map_err(|_| PathError::NotFound(path.to_string()))?;
        let (updated, count) = pathutil::apply_edit(&content, old, new, replace_all)?;
        tokio::fs::write(&os_path, updated).await.map_err(FsError::from)?;
        Ok(count)
    }

    async fn glob(&self, pattern: &str, root: &str) -> Result<Vec<String>, FsError> {
        let normalized_root = pathutil::normalize(root)?;
        let dir = self.resolve(root).await?;
        let mut matches: Vec<String> = self
            .walk(&dir)
            .await?
            .iter()
            .map(|p| self.virtual_path(p))
            .filter(|p| pathutil::glob_matches(pattern, &normalized_root, p))
            .collect();
        matches.sort();
        Ok(matches)
    }

    async fn grep(
        &self,
        pattern: &str,
        root: &str,
        options: GrepOptions,
    ) -> Result<Vec<GrepHit>, FsError> {
        let normalized_root = pathutil::normalize(root)?;
        let regex = build_regex(pattern, options.case_insensitive)?;
        let dir = self.resolve(root).await?;

        let mut hits = Vec::new();
        for os_path in self.walk(&dir).await? {
            let virtual_path = self.virtual_path(&os_path);
            if !include_matches(&options, &normalized_root, &virtual_path) {
                continue;
            }
            // Binary files are skipped.
            let Ok(content) = tokio::fs::read_to_string(&os_path).await else {
                continue;
            };
            for (i, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    hits.push(GrepHit {
                        path: virtual_path.clone(),
                        line_no: i + 1,
                        line: line.to_string(),
                    });
                    if let Some(max) = options.max_hits {
                        if hits.len() >= max {
                            return Ok(hits);
                        }
                    }
                }
            }
        }
        Ok(hits)
    }

    async fn exists(&self, path: &str) -> Result<bool, FsError> {
        match self.resolve(path).await {
            Ok(os_path) => Ok(os_path.exists()),
            Err(FsError::Path(PathError::NotFound(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn supports_execution(&self) -> bool {
        self.execute_enabled
    }

    async fn execute(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ExecResult, FsError> {
        if !self.execute_enabled {
            return Err(BackendError::CapabilityUnavailable.into());
        }

        let working_dir = match cwd {
            Some(dir) => self.resolve(dir).await?,
            None => self.root.clone(),
        };

        let mut child = tokio::process::Command::new("sh");
        child.arg("-c").arg(command).current_dir(&working_dir);

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, child.output())
                .await
                .map_err(|_| {
                    BackendError::Io(format!("command timed out after {}s", limit.as_secs()))
                })?,
            None => child.output().await,
        }
        .map_err(FsError::from)?;

        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
