use std::collections::HashMap;
use std::sync::Arc;

use fathom_core::{CallbackHandler, CancelToken, FathomError, InterruptDescriptor, RunEvent};

use crate::checkpoint::{Checkpoint, CheckpointConfig, Checkpointer};
use crate::edge::{ConditionalEdge, Edge};
use crate::node::{Node, NodeOutput, RunContext};
use crate::state::State;
use crate::END;

/// Outcome of a graph invocation.
#[derive(Debug)]
pub enum GraphResult<S> {
    /// The run finished normally.
    Complete(S),
    /// The run suspended on a durable interrupt; resume by merging a
    /// decision into the thread's checkpoint and re-invoking.
    Interrupted {
        state: S,
        interrupt: InterruptDescriptor,
    },
    /// The run was cancelled; the terminal checkpoint is tagged `cancelled`.
    Cancelled(S),
}

impl<S> GraphResult<S> {
    pub fn into_state(self) -> S {
        match self {
            GraphResult::Complete(state)
            | GraphResult::Interrupted { state, .. }
            | GraphResult::Cancelled(state) => state,
        }
    }

    pub fn interrupt(&self) -> Option<&InterruptDescriptor> {
        match self {
            GraphResult::Interrupted { interrupt, .. } => Some(interrupt),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, GraphResult::Complete(_))
    }
}

/// Per-invocation options.
#[derive(Clone, Default)]
pub struct InvokeOptions {
    pub config: Option<CheckpointConfig>,
    pub cancel: CancelToken,
}

/// The compiled, executable graph.
pub struct CompiledGraph<S: State> {
    nodes: HashMap<String, Box<dyn Node<S>>>,
    edges: Vec<Edge>,
    conditional_edges: Vec<ConditionalEdge<S>>,
    entry_point: String,
    max_iterations: usize,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    callbacks: Option<Arc<dyn CallbackHandler>>,
}

impl<S: State> std::fmt::Debug for CompiledGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("entry_point", &self.entry_point)
            .field("node_count", &self.nodes.len())
            .field("edge_count", &self.edges.len())
            .field("conditional_edge_count", &self.conditional_edges.len())
            .finish()
    }
}

impl<S: State> CompiledGraph<S> {
    pub(crate) fn new(
        nodes: HashMap<String, Box<dyn Node<S>>>,
        edges: Vec<Edge>,
        conditional_edges: Vec<ConditionalEdge<S>>,
        entry_point: String,
        max_iterations: usize,
    ) -> Self {
        Self {
            nodes,
            edges,
            conditional_edges,
            entry_point,
            max_iterations,
            checkpointer: None,
            callbacks: None,
        }
    }

    /// Set a checkpointer for state persistence.
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Set the telemetry sink.
    pub fn with_callbacks(mut self, callbacks: Arc<dyn CallbackHandler>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer>> {
        self.checkpointer.as_ref()
    }

    /// Execute the graph with initial state.
    pub async fn invoke(&self, state: S) -> Result<GraphResult<S>, FathomError>
    where
        S: serde::Serialize + serde::de::DeserializeOwned,
    {
        self.invoke_with_options(state, InvokeOptions::default())
            .await
    }

    /// Execute with a checkpoint config for persistence and resumption.
    pub async fn invoke_with_config(
        &self,
        state: S,
        config: Option<CheckpointConfig>,
    ) -> Result<GraphResult<S>, FathomError>
    where
        S: serde::Serialize + serde::de::DeserializeOwned,
    {
        self.invoke_with_options(state, InvokeOptions { config, cancel: CancelToken::new() })
            .await
    }

    /// Execute with full per-invocation options.
    pub async fn invoke_with_options(
        &self,
        mut state: S,
        options: InvokeOptions,
    ) -> Result<GraphResult<S>, FathomError>
    where
        S: serde::Serialize + serde::de::DeserializeOwned,
    {
        let config = options.config;
        let ctx = RunContext {
            cancel: options.cancel,
            callbacks: self.callbacks.clone(),
        };

        // Resume from the latest checkpoint when one exists.
        let mut resume_from: Option<String> = None;
        let mut step = 0usize;
        if let (Some(checkpointer), Some(cfg)) = (&self.checkpointer, &config) {
            if let Some(checkpoint) = checkpointer.get(cfg).await? {
                state = serde_json::from_value(checkpoint.state).map_err(|e| {
                    FathomError::Graph(format!("failed to deserialize checkpoint state: {e}"))
                })?;
                resume_from = checkpoint.next_node;
                step = checkpoint.step + 1;
            }
        }
        if let Some(cfg) = &config {
            state.bind_thread(&cfg.thread_id);
        }

        ctx.emit(RunEvent::RunStarted {
            run_id: state.run_id().to_string(),
            thread_id: config
                .as_ref()
                .map(|c| c.thread_id.clone())
                .unwrap_or_default(),
        })
        .await;

        let mut current_node = resume_from.unwrap_or_else(|| self.entry_point.clone());
        let mut remaining = self.max_iterations;

        loop {
            if current_node == END {
                break;
            }
            if remaining == 0 {
                return Err(FathomError::Graph(format!(
                    "max iterations ({}) exceeded — possible infinite loop",
                    self.max_iterations
                )));
            }
            remaining -= 1;

            if ctx.cancel.is_cancelled() {
                self.save_checkpoint(&config, &state, Some(current_node), step, true)
                    .await?;
                ctx.emit(RunEvent::RunCancelled {
                    run_id: state.run_id().to_string(),
                })
                .await;
                return Ok(GraphResult::Cancelled(state));
            }

            ctx.emit(RunEvent::RunStep {
                run_id: state.run_id().to_string(),
                step,
            })
            .await;
            tracing::debug!(node = %current_node, step, "executing node");

            let node = self
                .nodes
                .get(&current_node)
                .ok_or_else(|| FathomError::Graph(format!("node '{current_node}' not found")))?;

            let run_id = state.run_id().to_string();
            match node.process(state, &ctx).await {
                Ok(NodeOutput::State(new_state)) => {
                    state = new_state;
                }
                Ok(NodeOutput::Interrupt {
                    state: new_state,
                    interrupt,
                }) => {
                    state = new_state;
                    // Re-enter the same node on resume so the suspended
                    // call is gated again with the decision present.
                    self.save_checkpoint(&config, &state, Some(current_node.clone()), step, false)
                        .await?;
                    ctx.emit(RunEvent::Interrupted {
                        run_id: state.run_id().to_string(),
                        tool_name: interrupt.call.name.clone(),
                    })
                    .await;
                    return Ok(GraphResult::Interrupted { state, interrupt });
                }
                Err(e) => {
                    ctx.emit(RunEvent::RunFailed {
                        run_id,
                        error: e.to_string(),
                    })
                    .await;
                    return Err(e);
                }
            }

            // Cancellation observed mid-node (the tool node answers
            // remaining calls before returning): persist a terminal
            // checkpoint rather than scheduling the next node.
            if ctx.cancel.is_cancelled() {
                self.save_checkpoint(&config, &state, None, step, true).await?;
                ctx.emit(RunEvent::RunCancelled {
                    run_id: state.run_id().to_string(),
                })
                .await;
                return Ok(GraphResult::Cancelled(state));
            }

            let next = self.find_next_node(&current_node, &state);
            self.save_checkpoint(&config, &state, Some(next.clone()), step, false)
                .await?;
            step += 1;
            current_node = next;
        }

        ctx.emit(RunEvent::RunFinished {
            run_id: state.run_id().to_string(),
            output: String::new(),
        })
        .await;
        Ok(GraphResult::Complete(state))
    }

    /// Update state on a suspended thread (for human-in-the-loop resume).
    pub async fn update_state(
        &self,
        config: &CheckpointConfig,
        update: S,
    ) -> Result<(), FathomError>
    where
        S: serde::Serialize + serde::de::DeserializeOwned,
    {
        let checkpointer = self
            .checkpointer
            .as_ref()
            .ok_or_else(|| FathomError::Graph("no checkpointer configured".to_string()))?;

        let checkpoint = checkpointer
            .get(config)
            .await?
            .ok_or_else(|| FathomError::Graph("no checkpoint found".to_string()))?;

        let mut current_state: S = serde_json::from_value(checkpoint.state)
            .map_err(|e| FathomError::Graph(format!("deserialize: {e}")))?;

        current_state.merge(update);

        let updated = Checkpoint::new(
            serde_json::to_value(&current_state)
                .map_err(|e| FathomError::Graph(format!("serialize: {e}")))?,
            checkpoint.next_node,
            checkpoint.step,
        )
        .with_metadata("source", serde_json::json!("update_state"));
        checkpointer.put(config, &updated).await?;

        Ok(())
    }

    /// Get the current state for a thread from the checkpointer.
    pub async fn get_state(&self, config: &CheckpointConfig) -> Result<Option<S>, FathomError>
    where
        S: serde::de::DeserializeOwned,
    {
        let checkpointer = self
            .checkpointer
            .as_ref()
            .ok_or_else(|| FathomError::Graph("no checkpointer configured".to_string()))?;

        match checkpointer.get(config).await? {
            Some(checkpoint) => {
                let state: S = serde_json::from_value(checkpoint.state).map_err(|e| {
                    FathomError::Graph(format!("failed to deserialize checkpoint state: {e}"))
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Get the state history for a thread (all checkpoints, oldest first).
    pub async fn get_state_history(
        &self,
        config: &CheckpointConfig,
    ) -> Result<Vec<(S, Option<String>)>, FathomError>
    where
        S: serde::de::DeserializeOwned,
    {
        let checkpointer = self
            .checkpointer
            .as_ref()
            .ok_or_else(|| FathomError::Graph("no checkpointer configured".to_string()))?;

        let checkpoints = checkpointer.list(config).await?;
        let mut history = Vec::with_capacity(checkpoints.len());

        for checkpoint in checkpoints {
            let state: S = serde_json::from_value(checkpoint.state).map_err(|e| {
                FathomError::Graph(format!("failed to deserialize checkpoint state: {e}"))
            })?;
            history.push((state, checkpoint.next_node));
        }

        Ok(history)
    }

    async fn save_checkpoint(
        &self,
        config: &Option<CheckpointConfig>,
        state: &S,
        next_node: Option<String>,
        step: usize,
        cancelled: bool,
    ) -> Result<(), FathomError>
    where
        S: serde::Serialize,
    {
        let (Some(checkpointer), Some(cfg)) = (&self.checkpointer, config) else {
            return Ok(());
        };
        let state_val = serde_json::to_value(state)
            .map_err(|e| FathomError::Graph(format!("serialize state: {e}")))?;
        let mut checkpoint = Checkpoint::new(state_val, next_node, step);
        if cancelled {
            checkpoint = checkpoint.with_metadata("status", serde_json::json!("cancelled"));
        }
        checkpointer.put(cfg, &checkpoint).await
    }

    fn find_next_node(&self, current: &str, state: &S) -> String {
        for ce in &self.conditional_edges {
            if ce.source == current {
                return (ce.router)(state);
            }
        }

        for edge in &self.edges {
            if edge.source == current {
                return edge.target.clone();
            }
        }

        // No outgoing edge means END
        END.to_string()
    }
}
