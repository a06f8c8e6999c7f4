//! Core data model and traits for the Fathom deep-agent harness.
//!
//! Everything shared across the workspace lives here: chat messages and
//! tool calls, the [`AgentState`] record threaded through a run, the
//! [`ChatModel`] / [`Tool`] / [`Store`] traits, interrupt descriptors for
//! human-in-the-loop suspension, and the unified [`FathomError`] type.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A chat message. Tagged enum with System, Human, AI, and Tool variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "system")]
    System {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    #[serde(rename = "human")]
    Human {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    #[serde(rename = "assistant")]
    AI {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        invalid_tool_calls: Vec<InvalidToolCall>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    #[serde(rename = "tool")]
    Tool {
        content: String,
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
            id: None,
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            content: content.into(),
            id: None,
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Message::AI {
            content: content.into(),
            tool_calls: vec![],
            invalid_tool_calls: vec![],
            id: None,
            usage: None,
        }
    }

    pub fn ai_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::AI {
            content: content.into(),
            tool_calls,
            invalid_tool_calls: vec![],
            id: None,
            usage: None,
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            name: None,
            id: None,
        }
    }

    pub fn with_name(mut self, value: impl Into<String>) -> Self {
        if let Message::Tool { name, .. } = &mut self {
            *name = Some(value.into());
        }
        self
    }

    pub fn with_usage(mut self, value: TokenUsage) -> Self {
        if let Message::AI { usage, .. } = &mut self {
            *usage = Some(value);
        }
        self
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System { content, .. }
            | Message::Human { content, .. }
            | Message::AI { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    pub fn role(&self) -> &str {
        match self {
            Message::System { .. } => "system",
            Message::Human { .. } => "human",
            Message::AI { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Message::System { .. })
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Message::Human { .. })
    }

    pub fn is_ai(&self) -> bool {
        matches!(self, Message::AI { .. })
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Message::Tool { .. })
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::AI { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn invalid_tool_calls(&self) -> &[InvalidToolCall] {
        match self {
            Message::AI {
                invalid_tool_calls, ..
            } => invalid_tool_calls,
            _ => &[],
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        match self {
            Message::AI { usage, .. } => usage.as_ref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tool-related types
// ---------------------------------------------------------------------------

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A tool call that failed to parse or referenced an unknown tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    pub error: String,
}

/// Schema definition for a tool: name, description, and JSON Schema parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    /// Provider-specific parameters (e.g. prompt-cache control markers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<BTreeMap<String, Value>>,
}

/// Controls how the model selects tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    Required,
    None,
    Specific(String),
}

// ---------------------------------------------------------------------------
// Chat request / response
// ---------------------------------------------------------------------------

/// A single-shot request to a chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Model id override for this request; `None` means the client default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider-specific request hints (e.g. prompt-cache markers).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: vec![],
            tool_choice: None,
            model: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }
}

/// A response from a chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Message,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Todos and files
// ---------------------------------------------------------------------------

/// An item in the agent's planning scratchpad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TodoStatus::Pending),
            "in_progress" => Some(TodoStatus::InProgress),
            "completed" => Some(TodoStatus::Completed),
            _ => None,
        }
    }
}

/// File contents plus metadata, as stored in [`AgentState::files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    pub content: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-modification timestamp.
    pub modified_at: String,
}

// ---------------------------------------------------------------------------
// Human-in-the-loop interrupt types
// ---------------------------------------------------------------------------

/// Decision kinds a human may be allowed to take on a gated tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Approve,
    Edit,
    Reject,
}

/// A resume decision for a suspended tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitlResponse {
    Approve,
    Edit { new_args: Value },
    Reject { reason: String },
}

impl HitlResponse {
    pub fn kind(&self) -> DecisionKind {
        match self {
            HitlResponse::Approve => DecisionKind::Approve,
            HitlResponse::Edit { .. } => DecisionKind::Edit,
            HitlResponse::Reject { .. } => DecisionKind::Reject,
        }
    }
}

/// Descriptor surfaced to the caller when a run suspends for approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptDescriptor {
    /// Always `"tool_approval"` for tool gating interrupts.
    #[serde(rename = "type")]
    pub kind: String,
    pub call: ToolCall,
    pub allowed_decisions: Vec<DecisionKind>,
    pub thread_id: String,
    pub run_id: String,
}

impl InterruptDescriptor {
    pub fn tool_approval(
        call: ToolCall,
        allowed_decisions: Vec<DecisionKind>,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            kind: "tool_approval".to_string(),
            call,
            allowed_decisions,
            thread_id: thread_id.into(),
            run_id: run_id.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentState
// ---------------------------------------------------------------------------

/// The single mutable record threaded through an agent run.
///
/// `files` is populated only when the active backend is state-backed; other
/// backends own their storage. `pending_interrupt` and `resume_decisions`
/// carry human-in-the-loop bookkeeping across suspension boundaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub todos: Vec<Todo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, FileData>,
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<InterruptDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resume_decisions: BTreeMap<String, HitlResponse>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// A state fragment carrying a resume decision for the given call id.
    ///
    /// Merge it into a suspended thread's checkpoint to answer a pending
    /// interrupt; the decision map is idempotent under re-delivery.
    pub fn resume_fragment(call_id: impl Into<String>, decision: HitlResponse) -> Self {
        let mut resume_decisions = BTreeMap::new();
        resume_decisions.insert(call_id.into(), decision);
        Self {
            resume_decisions,
            ..Self::default()
        }
    }

    /// Ids of tool calls already answered after the last AI message.
    pub fn answered_call_ids(&self) -> Vec<String> {
        let Some(last_ai) = self.messages.iter().rposition(|m| m.is_ai()) else {
            return vec![];
        };
        self.messages[last_ai..]
            .iter()
            .filter_map(|m| m.tool_call_id().map(str::to_string))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tool runtime — context for state-coupled tools
// ---------------------------------------------------------------------------

/// Execution context handed to [`RuntimeAwareTool`]s.
#[derive(Clone)]
pub struct ToolRuntime {
    /// Snapshot of the agent state at dispatch time.
    pub state: AgentState,
    /// Id of the tool call being executed.
    pub tool_call_id: String,
    /// Optional key-value store reference.
    pub store: Option<Arc<dyn Store>>,
    /// Cooperative cancellation signal for the current step.
    pub cancel: CancelToken,
}

impl ToolRuntime {
    pub fn detached(tool_call_id: impl Into<String>) -> Self {
        Self {
            state: AgentState::default(),
            tool_call_id: tool_call_id.into(),
            store: None,
            cancel: CancelToken::new(),
        }
    }
}

/// A state update emitted by a tool alongside its result.
///
/// `todos` replaces the list wholesale; `files` merges per path, with
/// `None` values acting as deletion markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todos: Option<Vec<Todo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, Option<FileData>>>,
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        self.todos.is_none() && self.files.is_none()
    }

    /// Apply this update to a state in place.
    pub fn apply(self, state: &mut AgentState) {
        if let Some(todos) = self.todos {
            state.todos = todos;
        }
        if let Some(files) = self.files {
            for (path, data) in files {
                match data {
                    Some(data) => {
                        state.files.insert(path, data);
                    }
                    None => {
                        state.files.remove(&path);
                    }
                }
            }
        }
    }
}

/// Result of a tool invocation: a plain value, or a value plus a state update.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    Value(Value),
    Command { content: Value, update: StateUpdate },
}

impl ToolOutput {
    pub fn content(&self) -> &Value {
        match self {
            ToolOutput::Value(v) => v,
            ToolOutput::Command { content, .. } => content,
        }
    }
}

// ---------------------------------------------------------------------------
// Core traits
// ---------------------------------------------------------------------------

/// A language model provider.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, FathomError>;
}

/// An executable tool callable by the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    fn parameters(&self) -> Option<Value> {
        None
    }

    /// Whether the tool is safe to run concurrently with its siblings.
    /// Tools are assumed side-effectful unless they opt in.
    fn parallel_safe(&self) -> bool {
        false
    }

    /// Per-call execution deadline enforced by the runtime.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn call(&self, args: Value) -> Result<Value, FathomError>;

    fn as_tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self
                .parameters()
                .unwrap_or(serde_json::json!({"type": "object", "properties": {}})),
            extras: None,
        }
    }
}

/// A tool that receives the agent state and runtime context, and may emit
/// a state update alongside its result.
#[async_trait]
pub trait RuntimeAwareTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    fn parameters(&self) -> Option<Value> {
        None
    }

    fn parallel_safe(&self) -> bool {
        false
    }

    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn call_with_runtime(
        &self,
        args: Value,
        runtime: ToolRuntime,
    ) -> Result<ToolOutput, FathomError>;

    fn as_tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self
                .parameters()
                .unwrap_or(serde_json::json!({"type": "object", "properties": {}})),
            extras: None,
        }
    }
}

/// Either flavor of tool, as contributed by middleware or callers.
#[derive(Clone)]
pub enum AnyTool {
    Simple(Arc<dyn Tool>),
    Stateful(Arc<dyn RuntimeAwareTool>),
}

impl AnyTool {
    pub fn name(&self) -> &'static str {
        match self {
            AnyTool::Simple(t) => t.name(),
            AnyTool::Stateful(t) => t.name(),
        }
    }

    pub fn parallel_safe(&self) -> bool {
        match self {
            AnyTool::Simple(t) => t.parallel_safe(),
            AnyTool::Stateful(t) => t.parallel_safe(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self {
            AnyTool::Simple(t) => t.timeout(),
            AnyTool::Stateful(t) => t.timeout(),
        }
    }

    pub fn as_tool_definition(&self) -> ToolDefinition {
        match self {
            AnyTool::Simple(t) => t.as_tool_definition(),
            AnyTool::Stateful(t) => t.as_tool_definition(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A stored item in the key-value store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub namespace: Vec<String>,
    pub key: String,
    pub value: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Persistent key-value store with hierarchical namespaces.
///
/// The contract only promises read-your-writes for writes made through the
/// same handle; listings reflect the store's consistency model.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, namespace: &[&str], key: &str) -> Result<Option<Item>, FathomError>;

    async fn search(
        &self,
        namespace: &[&str],
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Item>, FathomError>;

    async fn put(&self, namespace: &[&str], key: &str, value: Value) -> Result<(), FathomError>;

    async fn delete(&self, namespace: &[&str], key: &str) -> Result<(), FathomError>;

    async fn list_namespaces(&self, prefix: &[&str]) -> Result<Vec<Vec<String>>, FathomError>;
}

// ---------------------------------------------------------------------------
// Run events
// ---------------------------------------------------------------------------

/// Lifecycle events emitted during agent execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        thread_id: String,
    },
    RunStep {
        run_id: String,
        step: usize,
    },
    ModelCalled {
        run_id: String,
        message_count: usize,
    },
    ToolCalled {
        run_id: String,
        tool_name: String,
    },
    Interrupted {
        run_id: String,
        tool_name: String,
    },
    RunFinished {
        run_id: String,
        output: String,
    },
    RunCancelled {
        run_id: String,
    },
    RunFailed {
        run_id: String,
        error: String,
    },
}

/// Receives [`RunEvent`] notifications; the harness's only telemetry seam.
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn on_event(&self, event: RunEvent) -> Result<(), FathomError>;
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation signal for a run.
///
/// Cloned freely; observed by the step loop between nodes and by the tool
/// node between calls. In-flight tool calls are allowed to finish.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Generate a fresh opaque run id.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for the harness.
#[derive(Debug, Error)]
pub enum FathomError {
    #[error("model transport error: {0}")]
    Model(String),
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("tool error: {0}")]
    Tool(String),
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("bad arguments: {0}")]
    BadArguments(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("unknown sub-agent: {0}")]
    UnknownSubAgent(String),
    #[error("sub-agent compilation failed: {0}")]
    SubAgentCompilation(String),
    #[error("sub-agent failed: {0}")]
    SubAgentFailed(String),
    #[error("dangling tool call: {0}")]
    DanglingToolCall(String),
    #[error("graph error: {0}")]
    Graph(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("config error: {0}")]
    Config(String),
}

impl FathomError {
    /// Stable kind string used in `{error_kind, message}` tool payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            FathomError::Model(_) => "Transport",
            FathomError::RateLimit(_) => "RateLimited",
            FathomError::InvalidResponse(_) => "InvalidResponse",
            FathomError::Tool(_) => "ToolError",
            FathomError::ToolNotFound(_) => "UnknownTool",
            FathomError::BadArguments(_) => "BadArguments",
            FathomError::Timeout(_) => "Timeout",
            FathomError::Cancelled(_) => "Cancelled",
            FathomError::Rejected(_) => "Rejected",
            FathomError::UnknownSubAgent(_) => "UnknownSubAgent",
            FathomError::SubAgentCompilation(_) => "CompilationFailed",
            FathomError::SubAgentFailed(_) => "ChildFailed",
            FathomError::DanglingToolCall(_) => "DanglingToolCall",
            FathomError::Graph(_) => "Graph",
            FathomError::Store(_) => "Store",
            FathomError::Validation(_) => "Validation",
            FathomError::Config(_) => "Config",
        }
    }

    /// Whether a model call failing with this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FathomError::Model(_) | FathomError::RateLimit(_))
    }
}

/// Structured error body placed in tool messages so the model can react.
pub fn error_payload(kind: &str, message: &str) -> Value {
    serde_json::json!({ "error_kind": kind, "message": message })
}
