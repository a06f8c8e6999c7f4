//! Longest-prefix router over child backends.
//!
//! Children see full absolute paths; nothing is stripped. Cross-backend
//! operations (glob, grep) fan out to the default and every mounted route
//! and merge with the standard tie-breaks (path, then line number).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fathom_core::FileData;

use crate::pathutil;

use super::{Backend, ExecResult, FileEntry, FsError, GrepHit, GrepOptions};

pub struct CompositeBackend {
    default: Arc<dyn Backend>,
    /// (normalized prefix with trailing '/', backend), longest prefix first.
    routes: Vec<(String, Arc<dyn Backend>)>,
}

impl CompositeBackend {
    pub fn new(default: Arc<dyn Backend>) -> Self {
        Self {
            default,
            routes: Vec::new(),
        }
    }

    /// Mount a backend under a path prefix (e.g. `/memories/`).
    pub fn with_route(mut self, prefix: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        let prefix = prefix.into();
        let normalized = format!("{}/", prefix.trim_end_matches('/'));
        self.routes.push((normalized, backend));
        self.routes
            .sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.len()));
        self
    }

    /// Longest-prefix route for a path; unmatched paths go to the default.
    fn route(&self, path: &str) -> &Arc<dyn Backend> {
        for (prefix, backend) in &self.routes {
            if path.starts_with(prefix.as_str()) || path == prefix.trim_end_matches('/') {
                return backend;
            }
        }
        &self.default
    }

    /// Backends that can hold paths under `root`: the default plus every
    /// route whose mount point is at or beneath it.
    fn backends_under<'a>(&'a self, root: &str) -> Vec<&'a Arc<dyn Backend>> {
        let mut backends = vec![&self.default];
        for (prefix, backend) in &self.routes {
            let mount = prefix.trim_end_matches('/');
            let mount = if mount.is_empty() { "/" } else { mount };
            if pathutil::is_under(root, mount) || pathutil::is_under(mount, root) {
                backends.push(backend);
            }
        }
        backends
    }
}

#[async_trait]
impl Backend for CompositeBackend {
    async fn ls_info(&self, path: &str) -> Result<Vec<FileEntry>, FsError> {
        let dir = pathutil::normalize(path)?;
        let mut entries = self.route(&dir).ls_info(&dir).await?;

        // Mount points directly under the listed directory appear as
        // synthetic directories.
        for (prefix, _) in &self.routes {
            let mount = prefix.trim_end_matches('/');
            let Some(relative) = pathutil::relative_to(&dir, mount) else {
                continue;
            };
            if relative.is_empty() || relative.contains('/') {
                continue;
            }
            if !entries.iter().any(|e| e.name == relative) {
                entries.push(FileEntry {
                    name: relative.clone(),
                    path: mount.to_string(),
                    is_dir: true,
                    size: None,
                    mtime: None,
                });
            }
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
        let path = pathutil::normalize(path)?;
        self.route(&path).read(&path, offset, limit).await
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), FsError> {
        let path = pathutil::normalize(path)?;
        self.route(&path).write(&path, content).await
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<usize, FsError> {
        let path = pathutil::normalize(path)?;
        self.route(&path).edit(&path, old, new, replace_all).await
    }

    async fn glob(&self, pattern: &str, root: &str) -> Result<Vec<String>, FsError> {
        let root = pathutil::normalize(root)?;
        let mut merged = Vec::new();
        for backend in self.backends_under(&root) {
            merged.extend(backend.glob(pattern, &root).await?);
        }
        merged.sort();
        merged.dedup();
        Ok(merged)
    }

    async fn grep(
        &self,
        pattern: &str,
        root: &str,
        options: GrepOptions,
    ) -> Result<Vec<GrepHit>, FsError> {
        let root = pathutil::normalize(root)?;
        let mut merged = Vec::new();
        for backend in self.backends_under(&root) {
            merged.extend(backend.grep(pattern, &root, options.clone()).await?);
        }
        merged.sort_by(|a, b| a.path.cmp(&b.path).then(a.line_no.cmp(&b.line_no)));
        merged.dedup();
        if let Some(max) = options.max_hits {
            merged.truncate(max);
        }
        Ok(merged)
    }

    async fn exists(&self, path: &str) -> Result<bool, FsError> {
        let path = pathutil::normalize(path)?;
        self.route(&path).exists(&path).await
    }

    fn supports_execution(&self) -> bool {
        self.default.supports_execution()
    }

    async fn execute(
        &self,
        command: &str,
        cwd: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ExecResult, FsError> {
        self.default.execute(command, cwd, timeout).await
    }

    fn snapshot_files(&self) -> Option<BTreeMap<String, FileData>> {
        let mut merged: Option<BTreeMap<String, FileData>> = None;
        for backend in std::iter::once(&self.default).chain(self.routes.iter().map(|(_, b)| b)) {
            if let Some(files) = backend.snapshot_files() {
                merged.get_or_insert_with(BTreeMap::new).extend(files);
            }
        }
        merged
    }

    fn restore_files(&self, files: &BTreeMap<String, FileData>) {
        // Partition by route so each state-backed child receives exactly
        // the files it owns.
        let mut default_files = BTreeMap::new();
        let mut route_files: Vec<BTreeMap<String, FileData>> =
            vec![BTreeMap::new(); self.routes.len()];

        'files: for (path, data) in files {
            for (i, (prefix, _)) in self.routes.iter().enumerate() {
                if path.starts_with(prefix.as_str()) {
                    route_files[i].insert(path.clone(), data.clone());
                    continue 'files;
                }
            }
            default_files.insert(path.clone(), data.clone());
        }

        if self.default.snapshot_files().is_some() {
            self.default.restore_files(&default_files);
        }
        for ((_, backend), files) in self.routes.iter().zip(route_files) {
            if backend.snapshot_files().is_some() {
                backend.restore_files(&files);
            }
        }
    }
}
