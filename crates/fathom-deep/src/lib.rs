//! Deep-agent harness.
//!
//! [`create_deep_agent`] assembles a checkpointed agent with a planning
//! scratchpad, filesystem tools over a pluggable backend, isolated
//! sub-agents behind a `task` tool, context summarization, tool-call
//! repair, and optional human-in-the-loop gating.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fathom_core::{AgentState, Message};
//! use fathom_deep::{backend::StateBackend, create_deep_agent, DeepAgentOptions};
//!
//! let backend = Arc::new(StateBackend::new());
//! let agent = create_deep_agent(model, DeepAgentOptions::new(backend))?;
//! let result = agent
//!     .invoke(AgentState::with_messages(vec![Message::human("Write hello.txt")]))
//!     .await?;
//! ```

pub mod backend;
pub mod middleware;
pub mod pathutil;
pub mod tools;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fathom_core::{
    AgentState, AnyTool, CallbackHandler, ChatModel, FathomError, HitlResponse, Store,
};
use fathom_graph::{
    create_agent, AgentOptions, CheckpointConfig, Checkpointer, CompiledGraph, GraphResult,
    RetryPolicy,
};
use fathom_middleware::{AgentMiddleware, HumanInTheLoopMiddleware, InterruptOnConfig};

use backend::Backend;
use middleware::{
    FilesystemMiddleware, PatchToolCallsMiddleware, PromptCachingMiddleware, SubAgentContext,
    SubAgentMiddleware, SummarizationMiddleware, TodoListMiddleware,
};
pub use middleware::SubAgentDef;

const BASE_AGENT_PROMPT: &str = "In order to complete the objective that the \
user asks of you, you have access to a number of standard tools.";

/// Tunables for the harness. Every knob has a sensible default.
#[derive(Debug, Clone)]
pub struct DeepAgentConfig {
    /// Tool results larger than this many bytes are offloaded to the
    /// filesystem and replaced with a stub.
    pub offload_threshold_bytes: usize,
    /// Directory that receives offloaded tool results.
    pub tool_output_dir: String,
    /// Bytes of preview included in the offload stub.
    pub offload_preview_bytes: usize,
    /// Token count that triggers a summarization pass.
    pub summarization_high_water_tokens: usize,
    /// Token ceiling immediately after a summarization pass.
    pub summarization_low_water_tokens: usize,
    /// Bound on concurrent sibling sub-agent dispatches.
    pub parallel_subagent_limit: usize,
    /// Model retries after the first attempt.
    pub model_retry_limit: usize,
    /// Base delay for exponential backoff between model retries.
    pub retry_base_delay: Duration,
    /// Path prefixes under which sub-agent files propagate to the parent.
    pub shared_file_prefixes: Vec<String>,
    /// Whether sub-agents themselves get a `task` tool.
    pub recursive_subagents: bool,
    /// Cap on node executions per invocation.
    pub max_iterations: usize,
}

impl Default for DeepAgentConfig {
    fn default() -> Self {
        Self {
            offload_threshold_bytes: 80_000,
            tool_output_dir: "/tool_outputs".to_string(),
            offload_preview_bytes: 500,
            summarization_high_water_tokens: 170_000,
            summarization_low_water_tokens: 85_000,
            parallel_subagent_limit: 4,
            model_retry_limit: 2,
            retry_base_delay: Duration::from_millis(200),
            shared_file_prefixes: vec!["/".to_string()],
            recursive_subagents: false,
            max_iterations: 100,
        }
    }
}

/// Configuration for [`create_deep_agent`].
pub struct DeepAgentOptions {
    /// Backend for filesystem operations.
    pub backend: Arc<dyn Backend>,
    /// Instructions prepended to the system prompt.
    pub system_prompt: Option<String>,
    /// Additional tools beyond the built-ins.
    pub tools: Vec<AnyTool>,
    /// User middleware, stacked between tool-call repair and
    /// human-in-the-loop.
    pub middleware: Vec<Arc<dyn AgentMiddleware>>,
    /// Custom sub-agent definitions for the `task` tool.
    pub subagents: Vec<SubAgentDef>,
    /// Checkpointer for durable state and resumption.
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
    /// Key-value store handed to runtime-aware tools.
    pub store: Option<Arc<dyn Store>>,
    /// Tools requiring human approval, with their allowed decisions.
    pub interrupt_on: HashMap<String, InterruptOnConfig>,
    /// Optional telemetry sink.
    pub callbacks: Option<Arc<dyn CallbackHandler>>,
    /// Enable the `task` tool (default true).
    pub enable_subagents: bool,
    /// Enable the filesystem tools (default true).
    pub enable_filesystem: bool,
    /// Enable the planning tools (default true).
    pub enable_todos: bool,
    pub config: DeepAgentConfig,
}

impl DeepAgentOptions {
    /// Options with the given backend and defaults everywhere else.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            system_prompt: None,
            tools: Vec::new(),
            middleware: Vec::new(),
            subagents: Vec::new(),
            checkpointer: None,
            store: None,
            interrupt_on: HashMap::new(),
            callbacks: None,
            enable_subagents: true,
            enable_filesystem: true,
            enable_todos: true,
            config: DeepAgentConfig::default(),
        }
    }
}

/// Create a deep agent.
///
/// The middleware stack is assembled bottom-up — planner, filesystem,
/// sub-agents, summarization, prompt caching, tool-call repair, user
/// middleware, human-in-the-loop — so HITL gates every tool call
/// outermost. Tools come from the middlewares plus `options.tools`; the
/// `execute` tool appears only when the backend supports execution.
pub fn create_deep_agent(
    model: Arc<dyn ChatModel>,
    options: DeepAgentOptions,
) -> Result<CompiledGraph<AgentState>, FathomError> {
    let config = options.config.clone();
    let mut stack: Vec<Arc<dyn AgentMiddleware>> = Vec::new();

    if options.enable_todos {
        stack.push(Arc::new(TodoListMiddleware::new()));
    }

    if options.enable_filesystem {
        stack.push(Arc::new(FilesystemMiddleware::new(
            options.backend.clone(),
            config.offload_threshold_bytes,
            config.tool_output_dir.clone(),
            config.offload_preview_bytes,
        )));
    }

    if options.enable_subagents {
        stack.push(Arc::new(SubAgentMiddleware::new(SubAgentContext {
            model: model.clone(),
            backend: options.backend.clone(),
            tools: options.tools.clone(),
            subagents: options.subagents.clone(),
            checkpointer: options.checkpointer.clone(),
            store: options.store.clone(),
            config: config.clone(),
            general_purpose_agent: true,
        })));
    }

    stack.push(Arc::new(SummarizationMiddleware::new(
        options.backend.clone(),
        model.clone(),
        config.summarization_high_water_tokens,
        config.summarization_low_water_tokens,
    )));
    stack.push(Arc::new(PromptCachingMiddleware::new()));
    stack.push(Arc::new(PatchToolCallsMiddleware::new()));

    stack.extend(options.middleware);

    if !options.interrupt_on.is_empty() {
        stack.push(Arc::new(HumanInTheLoopMiddleware::new(options.interrupt_on)));
    }

    let system_prompt = match options.system_prompt {
        Some(prompt) => format!("{prompt}\n\n{BASE_AGENT_PROMPT}"),
        None => BASE_AGENT_PROMPT.to_string(),
    };

    create_agent(
        model,
        options.tools,
        AgentOptions {
            checkpointer: options.checkpointer,
            system_prompt: Some(system_prompt),
            middleware: stack,
            store: options.store,
            callbacks: options.callbacks,
            retry: RetryPolicy {
                limit: config.model_retry_limit,
                base_delay: config.retry_base_delay,
            },
            parallel_tool_limit: Some(config.parallel_subagent_limit),
            max_iterations: Some(config.max_iterations),
        },
    )
}

/// Answer a pending human-in-the-loop interrupt and continue the run.
///
/// Reads the suspended call from the thread's latest checkpoint, merges
/// the decision in, and re-invokes. Re-delivering the same decision is
/// idempotent.
pub async fn resume_with_decision(
    agent: &CompiledGraph<AgentState>,
    config: &CheckpointConfig,
    decision: HitlResponse,
) -> Result<GraphResult<AgentState>, FathomError> {
    let state = agent
        .get_state(config)
        .await?
        .ok_or_else(|| FathomError::Graph(format!("no checkpoint for thread '{}'", config.thread_id)))?;
    let interrupt = state
        .pending_interrupt
        .ok_or_else(|| FathomError::Graph("no pending interrupt to resume".to_string()))?;

    agent
        .update_state(
            config,
            AgentState::resume_fragment(interrupt.call.id, decision),
        )
        .await?;
    agent
        .invoke_with_config(AgentState::new(), Some(config.clone()))
        .await
}
