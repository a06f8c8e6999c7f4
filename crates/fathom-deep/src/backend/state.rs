//! In-memory backend whose contents mirror into `AgentState.files`.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use fathom_core::FileData;

use crate::pathutil;

use super::{
    build_regex, glob_paths, grep_files, ls_from_paths, now_rfc3339, Backend, BackendError,
    FileEntry, FsError, GrepHit, GrepOptions, PathError,
};

/// The default backend: an in-memory map keyed by absolute path.
///
/// Runs on it are hermetic and checkpointable — the filesystem middleware
/// snapshots the map into `AgentState.files` after every tool call and
/// reseeds it on resume.
#[derive(Default)]
pub struct StateBackend {
    files: RwLock<BTreeMap<String, FileData>>,
}

fn poisoned() -> FsError {
    BackendError::Io("files lock poisoned".to_string()).into()
}

impl StateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend pre-populated with the given files.
    pub fn seeded(files: BTreeMap<String, FileData>) -> Self {
        Self {
            files: RwLock::new(files),
        }
    }
}

#[async_trait]
impl Backend for StateBackend {
    async fn ls_info(&self, path: &str) -> Result<Vec<FileEntry>, FsError> {
        let dir = pathutil::normalize(path)?;
        let files = self.files.read().map_err(|_| poisoned())?;
        if files.contains_key(&dir) {
            return Err(PathError::NotDirectory(dir).into());
        }
        Ok(ls_from_paths(&dir, files.iter()))
    }

    async fn read(
        &self,
        path: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<String, FsError> {
        let path = pathutil::normalize(path)?;
        let files = self.files.read().map_err(|_| poisoned())?;
        let data = files
            .get(&path)
            .ok_or_else(|| PathError::NotFound(path.clone()))?;
        Ok(pathutil::byte_slice(&data.content, offset, limit).to_string())
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), FsError> {
        let path = pathutil::normalize(path)?;
        let mut files = self.files.write().map_err(|_| poisoned())?;
        let timestamp = now_rfc3339();
        match files.get_mut(&path) {
            Some(existing) => {
                existing.content = content.to_string();
                existing.modified_at = timestamp;
            }
            None => {
                files.insert(
                    path,
                    FileData {
                        content: content.to_string(),
                        created_at: timestamp.clone(),
                        modified_at: timestamp,
                    },
                );
            }
        }
        Ok(())
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<usize, FsError> {
        let path = pathutil::normalize(path)?;
        let mut files = self.files.write().map_err(|_| poisoned())?;
        let data = files
            .get_mut(&path)
            .ok_or_else(|| PathError::NotFound(path.clone()))?;
        let (content, count) = pathutil::apply_edit(&data.content, old, new, replace_all)?;
        data.content = content;
        data.modified_at = now_rfc3339();
        Ok(count)
    }

    async fn glob(&self, pattern: &str, root: &str) -> Result<Vec<String>, FsError> {
        let root = pathutil::normalize(root)?;
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(glob_paths(pattern, &root, files.keys()))
    }

    async fn grep(
        &self,
        pattern: &str,
        root: &str,
        options: GrepOptions,
    ) -> Result<Vec<GrepHit>, FsError> {
        let root = pathutil::normalize(root)?;
        let regex = build_regex(pattern, options.case_insensitive)?;
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(grep_files(
            &regex,
            &root,
            &options,
            files.iter().map(|(p, d)| (p, &d.content)),
        ))
    }

    async fn exists(&self, path: &str) -> Result<bool, FsError> {
        let path = pathutil::normalize(path)?;
        let files = self.files.read().map_err(|_| poisoned())?;
        if path == "/" || files.contains_key(&path) {
            return Ok(true);
        }
        Ok(files.keys().any(|p| pathutil::is_under(&path, p)))
    }

    fn snapshot_files(&self) -> Option<BTreeMap<String, FileData>> {
        self.files.read().ok().map(|files| files.clone())
    }

    fn restore_files(&self, files: &BTreeMap<String, FileData>) {
        if let Ok(mut guard) = self.files.write() {
            *guard = files.clone();
        }
    }
}
