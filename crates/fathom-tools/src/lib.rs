//! Tool registry and executors.
//!
//! The registry maps tool names to [`Tool`] implementations. The serial
//! executor dispatches one call at a time; the parallel executor runs a
//! batch concurrently with bounded concurrency while preserving the order
//! of results.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use fathom_core::{FathomError, Tool};
use futures::StreamExt;
use serde_json::Value;

#[derive(Default, Clone)]
pub struct ToolRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), FathomError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|e| FathomError::Tool(format!("registry lock poisoned: {e}")))?;
        guard.insert(tool.name().to_string(), tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let guard = self.inner.read().ok()?;
        guard.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

#[derive(Clone)]
pub struct SerialToolExecutor {
    registry: ToolRegistry,
}

impl SerialToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<Value, FathomError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| FathomError::ToolNotFound(tool_name.to_string()))?;
        tool.call(args).await
    }
}

/// Executes a batch of tool calls concurrently with bounded concurrency.
///
/// Results come back in the same order as the input calls regardless of
/// completion order.
#[derive(Clone)]
pub struct ParallelToolExecutor {
    registry: ToolRegistry,
    max_concurrency: usize,
}

impl ParallelToolExecutor {
    pub fn new(registry: ToolRegistry, max_concurrency: usize) -> Self {
        Self {
            registry,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn execute_all(
        &self,
        calls: Vec<(String, Value)>,
    ) -> Vec<Result<Value, FathomError>> {
        futures::stream::iter(calls.into_iter().map(|(name, args)| {
            let registry = self.registry.clone();
            async move {
                let tool = registry
                    .get(&name)
                    .ok_or(FathomError::ToolNotFound(name))?;
                tool.call(args).await
            }
        }))
        .buffered(self.max_concurrency)
        .collect()
        .await
    }
}
