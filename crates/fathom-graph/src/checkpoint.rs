use std::collections::HashMap;

use async_trait::async_trait;
use fathom_core::FathomError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Configuration identifying a checkpoint thread.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    pub thread_id: String,
}

impl CheckpointConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
        }
    }
}

/// A durable snapshot of graph state at a step boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: serde_json::Value,
    /// Node scheduled to run next when this checkpoint was saved.
    pub next_node: Option<String>,
    /// Monotone step counter within the thread.
    #[serde(default)]
    pub step: usize,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Checkpoint {
    pub fn new(state: serde_json::Value, next_node: Option<String>, step: usize) -> Self {
        Self {
            state,
            next_node,
            step,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Trait for persisting graph state checkpoints.
///
/// Checkpoints are totally ordered per thread; `get` returns the latest.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: &Checkpoint,
    ) -> Result<(), FathomError>;
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>, FathomError>;
    async fn list(&self, config: &CheckpointConfig) -> Result<Vec<Checkpoint>, FathomError>;
}

/// In-memory checkpointer (for development/testing).
#[derive(Default)]
pub struct MemorySaver {
    store: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemorySaver {
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: &Checkpoint,
    ) -> Result<(), FathomError> {
        let mut store = self.store.write().await;
        store
            .entry(config.thread_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>, FathomError> {
        let store = self.store.read().await;
        Ok(store.get(&config.thread_id).and_then(|v| v.last().cloned()))
    }

    async fn list(&self, config: &CheckpointConfig) -> Result<Vec<Checkpoint>, FathomError> {
        let store = self.store.read().await;
        Ok(store.get(&config.thread_id).cloned().unwrap_or_default())
    }
}
