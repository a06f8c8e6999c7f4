use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use fathom_core::{
    error_payload, AgentState, FathomError, Message, RunEvent, RuntimeAwareTool, StateUpdate,
    Store, ToolCall, ToolOutput, ToolRuntime,
};
use fathom_middleware::{MiddlewareChain, ToolGate};
use fathom_tools::SerialToolExecutor;
use futures::StreamExt;
use serde_json::Value;

use crate::node::{Node, NodeOutput, RunContext};

/// Executes the tool calls of the last assistant message.
///
/// Calls run in declared order. They are dispatched sequentially unless
/// every pending call is parallel-safe, in which case they run concurrently
/// through a bounded ordered stream; either way the tool messages are
/// appended in declared order. Calls whose ids already have responses are
/// skipped, which makes re-entry after a suspension idempotent.
pub struct ToolNode {
    executor: SerialToolExecutor,
    runtime_tools: HashMap<String, Arc<dyn RuntimeAwareTool>>,
    middleware: Arc<MiddlewareChain>,
    store: Option<Arc<dyn Store>>,
    parallel_limit: usize,
}

impl ToolNode {
    pub fn new(executor: SerialToolExecutor, middleware: Arc<MiddlewareChain>) -> Self {
        Self {
            executor,
            runtime_tools: HashMap::new(),
            middleware,
            store: None,
            parallel_limit: 4,
        }
    }

    /// Set the store reference injected into runtime-aware tool calls.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a runtime-aware tool.
    pub fn with_runtime_tool(mut self, tool: Arc<dyn RuntimeAwareTool>) -> Self {
        self.runtime_tools.insert(tool.name().to_string(), tool);
        self
    }

    /// Bound for concurrent execution of parallel-safe calls.
    pub fn with_parallel_limit(mut self, limit: usize) -> Self {
        self.parallel_limit = limit.max(1);
        self
    }

    fn is_parallel_safe(&self, call: &ToolCall) -> bool {
        if let Some(tool) = self.runtime_tools.get(&call.name) {
            return tool.parallel_safe();
        }
        self.executor
            .registry()
            .get(&call.name)
            .map(|t| t.parallel_safe())
            .unwrap_or(false)
    }

    fn call_timeout(&self, call: &ToolCall) -> Option<std::time::Duration> {
        if let Some(tool) = self.runtime_tools.get(&call.name) {
            return tool.timeout();
        }
        self.executor
            .registry()
            .get(&call.name)
            .and_then(|t| t.timeout())
    }

    /// Execute one call. Tool-visible failures become `{error_kind, message}`
    /// payloads; pipeline errors propagate.
    async fn run_call(
        &self,
        call: &ToolCall,
        snapshot: AgentState,
        ctx: &RunContext,
    ) -> Result<(Value, StateUpdate), FathomError> {
        let fut = async {
            if let Some(tool) = self.runtime_tools.get(&call.name) {
                let runtime = ToolRuntime {
                    state: snapshot,
                    tool_call_id: call.id.clone(),
                    store: self.store.clone(),
                    cancel: ctx.cancel.clone(),
                };
                tool.call_with_runtime(call.arguments.clone(), runtime).await
            } else {
                self.executor
                    .execute(&call.name, call.arguments.clone())
                    .await
                    .map(ToolOutput::Value)
            }
        };

        let outcome = match self.call_timeout(call) {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(FathomError::Timeout(format!(
                    "tool '{}' exceeded {}ms",
                    call.name,
                    limit.as_millis()
                ))),
            },
            None => fut.await,
        };

        match outcome {
            Ok(ToolOutput::Value(value)) => Ok((value, StateUpdate::default())),
            Ok(ToolOutput::Command { content, update }) => Ok((content, update)),
            Err(e) if is_fatal(&e) => Err(e),
            Err(e) => {
                tracing::debug!(tool = %call.name, error = %e, "tool call failed");
                Ok((error_payload(e.kind(), &e.to_string()), StateUpdate::default()))
            }
        }
    }

    /// Answer a call: run after hooks and append the tool message.
    async fn finish_call(
        &self,
        state: &mut AgentState,
        call: &ToolCall,
        result: Value,
    ) -> Result<(), FathomError> {
        let result = self.middleware.after_tool_call(state, call, result).await?;
        state
            .messages
            .push(Message::tool(render_result(&result), &call.id).with_name(&call.name));
        Ok(())
    }
}

fn is_fatal(e: &FathomError) -> bool {
    matches!(
        e,
        FathomError::Graph(_) | FathomError::Validation(_) | FathomError::Config(_)
    )
}

/// Tool results render as plain text for string payloads, JSON otherwise.
fn render_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cancelled_payload() -> Value {
    serde_json::json!({ "status": "cancelled", "reason": "run cancelled before execution" })
}

#[async_trait]
impl Node<AgentState> for ToolNode {
    async fn process(
        &self,
        mut state: AgentState,
        ctx: &RunContext,
    ) -> Result<NodeOutput<AgentState>, FathomError> {
        let Some(last_ai) = state.messages.iter().rev().find(|m| m.is_ai()) else {
            return Err(FathomError::Graph("no assistant message in state".to_string()));
        };
        let calls = last_ai.tool_calls().to_vec();
        if calls.is_empty() {
            return Ok(state.into());
        }

        let answered: HashSet<String> = state.answered_call_ids().into_iter().collect();
        let pending: Vec<ToolCall> = calls
            .into_iter()
            .filter(|c| !answered.contains(&c.id))
            .collect();
        if pending.is_empty() {
            return Ok(state.into());
        }

        let run_parallel = pending.len() > 1 && pending.iter().all(|c| self.is_parallel_safe(c));
        if run_parallel {
            self.process_parallel(state, pending, ctx).await
        } else {
            self.process_sequential(state, pending, ctx).await
        }
    }
}

impl ToolNode {
    async fn process_sequential(
        &self,
        mut state: AgentState,
        pending: Vec<ToolCall>,
        ctx: &RunContext,
    ) -> Result<NodeOutput<AgentState>, FathomError> {
        let mut remaining = pending.into_iter();
        while let Some(mut call) = remaining.next() {
            if ctx.cancel.is_cancelled() {
                // Answer this call and the rest so the history stays valid.
                self.finish_call(&mut state, &call, cancelled_payload())
                    .await?;
                for c in remaining {
                    self.finish_call(&mut state, &c, cancelled_payload()).await?;
                }
                return Ok(state.into());
            }

            match self.middleware.before_tool_call(&state, &mut call).await? {
                ToolGate::Suspend(interrupt) => {
                    state.pending_interrupt = Some(interrupt.clone());
                    return Ok(NodeOutput::Interrupt { state, interrupt });
                }
                ToolGate::ReplaceResult(value) => {
                    self.finish_call(&mut state, &call, value).await?;
                }
                ToolGate::Continue => {
                    ctx.emit(RunEvent::ToolCalled {
                        run_id: state.run_id.clone(),
                        tool_name: call.name.clone(),
                    })
                    .await;
                    tracing::debug!(tool = %call.name, call_id = %call.id, "dispatching tool");
                    let (value, update) = self.run_call(&call, state.clone(), ctx).await?;
                    update.apply(&mut state);
                    self.finish_call(&mut state, &call, value).await?;
                }
            }
        }
        Ok(state.into())
    }

    async fn process_parallel(
        &self,
        mut state: AgentState,
        pending: Vec<ToolCall>,
        ctx: &RunContext,
    ) -> Result<NodeOutput<AgentState>, FathomError> {
        // Gate phase runs sequentially in declared order; nothing executes
        // until every call has passed its gate.
        enum Gated {
            Run(ToolCall),
            Replaced(ToolCall, Value),
        }
        let mut gated = Vec::with_capacity(pending.len());
        for mut call in pending {
            match self.middleware.before_tool_call(&state, &mut call).await? {
                ToolGate::Suspend(interrupt) => {
                    state.pending_interrupt = Some(interrupt.clone());
                    return Ok(NodeOutput::Interrupt { state, interrupt });
                }
                ToolGate::ReplaceResult(value) => gated.push(Gated::Replaced(call, value)),
                ToolGate::Continue => gated.push(Gated::Run(call)),
            }
        }

        // Every executing call sees the same pre-dispatch snapshot.
        let snapshot = state.clone();
        let results: Vec<(ToolCall, Result<(Value, StateUpdate), FathomError>)> =
            futures::stream::iter(gated.into_iter().map(|entry| {
                let snapshot = snapshot.clone();
                async move {
                    match entry {
                        Gated::Replaced(call, value) => {
                            (call, Ok((value, StateUpdate::default())))
                        }
                        Gated::Run(call) => {
                            ctx.emit(RunEvent::ToolCalled {
                                run_id: snapshot.run_id.clone(),
                                tool_name: call.name.clone(),
                            })
                            .await;
                            let result = self.run_call(&call, snapshot, ctx).await;
                            (call, result)
                        }
                    }
                }
            }))
            .buffered(self.parallel_limit)
            .collect()
            .await;

        // Stitch results back in declared order, whichever finished first.
        for (call, result) in results {
            let (value, update) = result?;
            update.apply(&mut state);
            self.finish_call(&mut state, &call, value).await?;
        }
        Ok(state.into())
    }
}

/// Standard routing function: "tools" if the last message carries tool
/// calls, otherwise END.
pub fn tools_condition(state: &AgentState) -> String {
    if let Some(last) = state.last_message() {
        if !last.tool_calls().is_empty() {
            return "tools".to_string();
        }
    }
    crate::END.to_string()
}
