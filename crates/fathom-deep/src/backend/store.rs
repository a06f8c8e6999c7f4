//! Backend over an external key-value store.
//!
//! Files live at keys `<namespace>/<path>`; listings are prefix scans.
//! The contract only promises read-your-writes through this handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fathom_core::{FileData, Store};

use crate::pathutil;

use super::{
    build_regex, glob_paths, grep_files, ls_from_paths, now_rfc3339, Backend, BackendError,
    FileEntry, FsError, GrepHit, GrepOptions, PathError,
};

const SCAN_LIMIT: usize = 10_000;

pub struct StoreBackend {
    store: Arc<dyn Store>,
    namespace: Vec<String>,
}

impl StoreBackend {
    pub fn new(store: Arc<dyn Store>, namespace: Vec<String>) -> Self {
        Self { store, namespace }
    }

    fn namespace_refs(&self) -> Vec<&str> {
        self.namespace.iter().map(String::as_str).collect()
    }

    async fn get_file(&self, path: &str) -> Result<Option<FileData>, FsError> {
        let item = self
            .store
            .get(&self.namespace_refs(), path)
            .await
            .map_err(store_err)?;
        match item {
            None => Ok(None),
            Some(item) => {
                let data: FileData = serde_json::from_value(item.value)
                    .map_err(|e| BackendError::Io(format!("corrupt store value: {e}")))?;
                Ok(Some(data))
            }
        }
    }

    async fn put_file(&self, path: &str, data: &FileData) -> Result<(), FsError> {
        let value = serde_json::to_value(data)
            .map_err(|e| BackendError::Io(format!("serialize: {e}")))?;
        self.store
            .put(&self.namespace_refs(), path, value)
            .await
            .map_err(store_err)
    }

    /// Scan every file in the namespace, sorted by path.
    async fn all_files(&self) -> Result<BTreeMap<String, FileData>, FsError> {
        let items = self
            .store
            .search(&self.namespace_refs(), None, SCAN_LIMIT)
            .await
            .map_err(store_err)?;
        let mut files = BTreeMap::new();
        for item in items {
            if let Ok(data) = serde_json::from_value::<FileData>(item.value) {
                files.insert(item.key, data);
            }
        }
        Ok(files)
    }
}

fn store_err(e: fathom_core::FathomError) -> FsError {
    BackendError::Io(e.to_string()).into()
}

#[async_trait]
impl Backend for StoreBackend {
    async fn ls_info(&self, path: &str) -> Result<Vec<FileEntry>, FsError> {
        let dir = pathutil::normalize(path)?;
        let files = self.all_files().await?;
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
        let data = self
            .get_file(&path)
            .await?
            .ok_or(PathError::NotFound(path))?;
        Ok(pathutil::byte_slice(&data.content, offset, limit).to_string())
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), FsError> {
        let path = pathutil::normalize(path)?;
        let timestamp = now_rfc3339();
        let data = match self.get_file(&path).await? {
            Some(existing) => FileData {
                content: content.to_string(),
                created_at: existing.created_at,
                modified_at: timestamp,
            },
            None => FileData {
                content: content.to_string(),
                created_at: timestamp.clone(),
                modified_at: timestamp,
            },
        };
        self.put_file(&path, &data).await
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<usize, FsError> {
        let path = pathutil::normalize(path)?;
        let data = self
            .get_file(&path)
            .await?
            .ok_or_else(|| PathError::NotFound(path.clone()))?;
        let (content, count) = pathutil::apply_edit(&data.content, old, new, replace_all)?;
        self.put_file(
            &path,
            &FileData {
                content,
                created_at: data.created_at,
                modified_at: now_rfc3339(),
            },
        )
        .await?;
        Ok(count)
    }

    async fn glob(&self, pattern: &str, root: &str) -> Result<Vec<String>, FsError> {
        let root = pathutil::normalize(root)?;
        let files = self.all_files().await?;
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
        let files = self.all_files().await?;
        Ok(grep_files(
            &regex,
            &root,
            &options,
            files.iter().map(|(p, d)| (p, &d.content)),
        ))
    }

    async fn exists(&self, path: &str) -> Result<bool, FsError> {
        let path = pathutil::normalize(path)?;
        if self.get_file(&path).await?.is_some() {
            return Ok(true);
        }
        let files = self.all_files().await?;
        Ok(path == "/" || files.keys().any(|p| pathutil::is_under(&path, p)))
    }
}
