use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fathom_core::{
    new_run_id, AgentState, AnyTool, CallbackHandler, ChatModel, ChatRequest, FathomError,
    Message, RunEvent, Store, ToolDefinition,
};
use fathom_middleware::{AgentMiddleware, MiddlewareChain, ModelGate, ModelRequest};
use fathom_tools::{SerialToolExecutor, ToolRegistry};

use crate::builder::StateGraph;
use crate::checkpoint::Checkpointer;
use crate::compiled::CompiledGraph;
use crate::node::{Node, NodeOutput, RunContext};
use crate::tool_node::{tools_condition, ToolNode};
use crate::END;

/// Retry policy for model calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub limit: usize,
    /// Base delay; attempt n sleeps `base * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: 2,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Node that runs the middleware pre-hooks, calls the model, and runs the
/// post-hooks.
struct ChatModelNode {
    model: Arc<dyn ChatModel>,
    tool_defs: Vec<ToolDefinition>,
    system_prompt: Option<String>,
    middleware: Arc<MiddlewareChain>,
    retry: RetryPolicy,
}

impl ChatModelNode {
    async fn call_with_retry(&self, request: ChatRequest) -> Result<fathom_core::ChatResponse, FathomError> {
        let mut attempt = 0;
        loop {
            match self.model.chat(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.retry.limit => {
                    let delay = self.retry.base_delay * 2u32.saturating_pow(attempt as u32);
                    tracing::debug!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying model call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Node<AgentState> for ChatModelNode {
    async fn process(
        &self,
        mut state: AgentState,
        ctx: &RunContext,
    ) -> Result<NodeOutput<AgentState>, FathomError> {
        if state.run_id.is_empty() {
            state.run_id = new_run_id();
        }

        match self.middleware.before_model(&mut state).await? {
            ModelGate::Continue => {}
            ModelGate::ShortCircuit(message) => {
                state.messages.push(message);
                return Ok(state.into());
            }
            ModelGate::Suspend(interrupt) => {
                state.pending_interrupt = Some(interrupt.clone());
                return Ok(NodeOutput::Interrupt { state, interrupt });
            }
        }

        let mut request = ModelRequest {
            messages: state.messages.clone(),
            system_prompt: self.system_prompt.clone(),
            tools: self.tool_defs.clone(),
            tool_choice: None,
            model: None,
            metadata: Default::default(),
        };
        self.middleware
            .modify_model_request(&mut request, &state)
            .await?;

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(prompt) = request.system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(request.messages);

        let chat_request = ChatRequest {
            messages,
            tools: request.tools,
            tool_choice: request.tool_choice,
            model: request.model,
            metadata: request.metadata,
        };

        ctx.emit(RunEvent::ModelCalled {
            run_id: state.run_id.clone(),
            message_count: chat_request.messages.len(),
        })
        .await;
        tracing::debug!(messages = chat_request.messages.len(), "invoking model");

        let response = self.call_with_retry(chat_request).await?;
        state.messages.push(response.message);

        self.middleware.after_model(&mut state).await?;
        Ok(state.into())
    }
}

/// Options for creating an agent with [`create_agent`].
#[derive(Default)]
pub struct AgentOptions {
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
    pub system_prompt: Option<String>,
    pub middleware: Vec<Arc<dyn AgentMiddleware>>,
    pub store: Option<Arc<dyn Store>>,
    pub callbacks: Option<Arc<dyn CallbackHandler>>,
    pub retry: RetryPolicy,
    /// Bound for concurrent execution of parallel-safe tool calls.
    pub parallel_tool_limit: Option<usize>,
    /// Cap on node executions per invocation.
    pub max_iterations: Option<usize>,
}

/// Create the prebuilt agent ⇄ tools graph with middleware support.
///
/// The graph has two nodes: "agent" (model call wrapped by middleware
/// hooks) and "tools" (tool-call execution wrapped by per-call gates).
/// Routing: tool calls present → "tools", otherwise END.
pub fn create_agent(
    model: Arc<dyn ChatModel>,
    tools: Vec<AnyTool>,
    options: AgentOptions,
) -> Result<CompiledGraph<AgentState>, FathomError> {
    let middleware_chain = Arc::new(MiddlewareChain::new(options.middleware));

    let mut all_tools = middleware_chain.tools();
    all_tools.extend(tools);

    let tool_defs: Vec<ToolDefinition> =
        all_tools.iter().map(|t| t.as_tool_definition()).collect();

    let registry = ToolRegistry::new();
    let mut tool_node = ToolNode::new(
        SerialToolExecutor::new(registry.clone()),
        middleware_chain.clone(),
    );
    if let Some(limit) = options.parallel_tool_limit {
        tool_node = tool_node.with_parallel_limit(limit);
    }
    if let Some(store) = options.store {
        tool_node = tool_node.with_store(store);
    }
    for tool in all_tools {
        match tool {
            AnyTool::Simple(t) => registry.register(t)?,
            AnyTool::Stateful(t) => tool_node = tool_node.with_runtime_tool(t),
        }
    }

    let agent_node = ChatModelNode {
        model,
        tool_defs,
        system_prompt: options.system_prompt,
        middleware: middleware_chain,
        retry: options.retry,
    };

    let mut builder = StateGraph::new()
        .add_node("agent", agent_node)
        .add_node("tools", tool_node)
        .set_entry_point("agent")
        .add_conditional_edges_with_path_map(
            "agent",
            tools_condition,
            HashMap::from([
                ("tools".to_string(), "tools".to_string()),
                (END.to_string(), END.to_string()),
            ]),
        )
        .add_edge("tools", "agent");

    if let Some(limit) = options.max_iterations {
        builder = builder.max_iterations(limit);
    }

    let mut graph = builder.compile()?;
    if let Some(checkpointer) = options.checkpointer {
        graph = graph.with_checkpointer(checkpointer);
    }
    if let Some(callbacks) = options.callbacks {
        graph = graph.with_callbacks(callbacks);
    }

    Ok(graph)
}
