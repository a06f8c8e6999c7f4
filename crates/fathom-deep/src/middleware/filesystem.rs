//! Filesystem middleware: contributes the file tools, keeps state-backed
//! storage mirrored into `AgentState.files`, and offloads oversized tool
//! results to the filesystem.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fathom_core::{AgentState, AnyTool, FathomError, FileData, ToolCall};
use fathom_middleware::{AgentMiddleware, ModelGate};
use serde_json::Value;

use crate::backend::Backend;
use crate::pathutil;
use crate::tools::create_filesystem_tools;

pub struct FilesystemMiddleware {
    backend: Arc<dyn Backend>,
    offload_threshold_bytes: usize,
    tool_output_dir: String,
    preview_bytes: usize,
    seeded: AtomicBool,
}

impl FilesystemMiddleware {
    pub fn new(
        backend: Arc<dyn Backend>,
        offload_threshold_bytes: usize,
        tool_output_dir: impl Into<String>,
        preview_bytes: usize,
    ) -> Self {
        Self {
            backend,
            offload_threshold_bytes,
            tool_output_dir: tool_output_dir.into(),
            preview_bytes,
            seeded: AtomicBool::new(false),
        }
    }

    /// Merge checkpointed state files and live backend contents, newest
    /// modification winning, and mirror the result both ways.
    fn sync_state_files(&self, state: &mut AgentState) {
        let Some(snapshot) = self.backend.snapshot_files() else {
            return;
        };
        let mut merged: BTreeMap<String, FileData> = snapshot;
        for (path, data) in &state.files {
            match merged.get(path) {
                Some(existing) if existing.modified_at >= data.modified_at => {}
                _ => {
                    merged.insert(path.clone(), data.clone());
                }
            }
        }
        if merged != state.files {
            self.backend.restore_files(&merged);
            state.files = merged;
        }
    }
}

fn sanitize_call_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl AgentMiddleware for FilesystemMiddleware {
    fn tools(&self) -> Vec<AnyTool> {
        create_filesystem_tools(self.backend.clone())
    }

    async fn before_model(&self, state: &mut AgentState) -> Result<ModelGate, FathomError> {
        // First call of a run: reseed state-backed storage from the
        // checkpointed files so resumed threads see their filesystem.
        if !self.seeded.swap(true, Ordering::SeqCst) && !state.files.is_empty() {
            self.backend.restore_files(&state.files);
        }
        Ok(ModelGate::Continue)
    }

    async fn after_tool_call(
        &self,
        state: &mut AgentState,
        call: &ToolCall,
        result: Value,
    ) -> Result<Value, FathomError> {
        let result = match result {
            Value::String(text) if text.len() > self.offload_threshold_bytes => {
                let path = format!(
                    "{}/{}",
                    self.tool_output_dir.trim_end_matches('/'),
                    sanitize_call_id(&call.id)
                );
                match self.backend.write(&path, &text).await {
                    Ok(()) => {
                        let preview = pathutil::byte_slice(&text, 0, Some(self.preview_bytes));
                        tracing::debug!(tool = %call.name, bytes = text.len(), path = %path, "offloaded tool result");
                        Value::String(format!(
                            "{} bytes written to {}; preview: {}",
                            text.len(),
                            path,
                            preview
                        ))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to offload tool result");
                        Value::String(text)
                    }
                }
            }
            other => other,
        };

        self.sync_state_files(state);
        Ok(result)
    }
}
