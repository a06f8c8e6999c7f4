//! Sub-agent dispatch: the `task` tool spawns isolated child agents whose
//! only surfaced result is their final assistant text.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use fathom_core::{
    AgentState, AnyTool, ChatModel, FathomError, FileData, Message, RuntimeAwareTool, StateUpdate,
    Store, ToolOutput, ToolRuntime,
};
use fathom_graph::{CheckpointConfig, Checkpointer, CompiledGraph, GraphResult};
use fathom_middleware::AgentMiddleware;
use serde_json::{json, Value};

use crate::backend::{Backend, StateBackend};
use crate::{create_deep_agent, DeepAgentConfig, DeepAgentOptions};

const GENERAL_PURPOSE_PROMPT: &str = "You are an autonomous agent. Complete \
the task you are given end to end, using the available tools, and reply \
with a concise report of what you did and found. Your final message is the \
only thing the caller sees.";

const GENERAL_PURPOSE_DESCRIPTION: &str = "General-purpose agent for \
researching complex questions, searching for files and content, and \
executing multi-step tasks. Has access to the same tools as the main agent.";

/// Definition of a sub-agent available to the `task` tool.
///
/// `runnable` is a pre-compiled agent; otherwise the definition is
/// compiled lazily on first dispatch with the enclosing harness defaults.
#[derive(Clone)]
pub struct SubAgentDef {
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub tools: Option<Vec<AnyTool>>,
    pub model: Option<Arc<dyn ChatModel>>,
    pub runnable: Option<Arc<CompiledGraph<AgentState>>>,
}

impl SubAgentDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            prompt: prompt.into(),
            tools: None,
            model: None,
            runnable: None,
        }
    }
}

/// Defaults a child agent inherits from the enclosing harness.
pub struct SubAgentContext {
    pub model: Arc<dyn ChatModel>,
    pub backend: Arc<dyn Backend>,
    pub tools: Vec<AnyTool>,
    pub subagents: Vec<SubAgentDef>,
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
    pub store: Option<Arc<dyn Store>>,
    pub config: DeepAgentConfig,
    pub general_purpose_agent: bool,
}

/// Middleware contributing the `task` tool.
pub struct SubAgentMiddleware {
    task_tool: Arc<TaskTool>,
}

impl SubAgentMiddleware {
    pub fn new(context: SubAgentContext) -> Self {
        let mut registry: BTreeMap<String, SubAgentDef> = BTreeMap::new();
        if context.general_purpose_agent {
            registry.insert(
                "general-purpose".to_string(),
                SubAgentDef::new(
                    "general-purpose",
                    GENERAL_PURPOSE_DESCRIPTION,
                    GENERAL_PURPOSE_PROMPT,
                ),
            );
        }
        for def in &context.subagents {
            registry.insert(def.name.clone(), def.clone());
        }

        let agent_list = registry
            .values()
            .map(|def| format!("- {}: {}", def.name, def.description))
            .collect::<Vec<_>>()
            .join("\n");
        let description: &'static str = Box::leak(
            format!(
                "Spawn a sub-agent to handle a complex multi-step task \
                 autonomously. The sub-agent works in isolation and returns \
                 a single summary message.\n\nAvailable agents:\n{agent_list}"
            )
            .into_boxed_str(),
        );

        Self {
            task_tool: Arc::new(TaskTool {
                registry,
                context,
                description,
                compiled: RwLock::new(HashMap::new()),
            }),
        }
    }
}

#[async_trait]
impl AgentMiddleware for SubAgentMiddleware {
    fn tools(&self) -> Vec<AnyTool> {
        vec![AnyTool::Stateful(self.task_tool.clone())]
    }
}

struct TaskTool {
    registry: BTreeMap<String, SubAgentDef>,
    context: SubAgentContext,
    description: &'static str,
    compiled: RwLock<HashMap<String, Arc<CompiledGraph<AgentState>>>>,
}

impl TaskTool {
    fn parent_is_state_backed(&self) -> bool {
        self.context.backend.snapshot_files().is_some()
    }

    fn cached(&self, name: &str) -> Option<Arc<CompiledGraph<AgentState>>> {
        self.compiled.read().ok()?.get(name).cloned()
    }

    /// Compile a child agent from its definition and the harness defaults.
    ///
    /// The sub-agent middleware itself is excluded unless recursion is
    /// enabled, so children have no `task` tool by default.
    fn compile(
        &self,
        def: &SubAgentDef,
        backend: Arc<dyn Backend>,
    ) -> Result<Arc<CompiledGraph<AgentState>>, FathomError> {
        let mut options = DeepAgentOptions::new(backend);
        options.tools = def.tools.clone().unwrap_or_else(|| self.context.tools.clone());
        options.subagents = if self.context.config.recursive_subagents {
            self.context.subagents.clone()
        } else {
            Vec::new()
        };
        options.enable_subagents = self.context.config.recursive_subagents;
        options.checkpointer = self.context.checkpointer.clone();
        options.store = self.context.store.clone();
        options.config = self.context.config.clone();

        let model = def.model.clone().unwrap_or_else(|| self.context.model.clone());
        create_deep_agent(model, options)
            .map(Arc::new)
            .map_err(|e| FathomError::SubAgentCompilation(format!("{}: {e}", def.name)))
    }

    fn resolve_agent(
        &self,
        def: &SubAgentDef,
        parent_files: &BTreeMap<String, FileData>,
    ) -> Result<Arc<CompiledGraph<AgentState>>, FathomError> {
        if let Some(runnable) = &def.runnable {
            return Ok(runnable.clone());
        }

        if self.parent_is_state_backed() {
            // Each dispatch gets a fresh backend seeded from the parent's
            // files so sibling children stay isolated. No caching here.
            let backend = Arc::new(StateBackend::seeded(parent_files.clone()));
            return self.compile(def, backend);
        }

        if let Some(agent) = self.cached(&def.name) {
            return Ok(agent);
        }
        let agent = self.compile(def, self.context.backend.clone())?;
        if let Ok(mut cache) = self.compiled.write() {
            cache.insert(def.name.clone(), agent.clone());
        }
        Ok(agent)
    }
}

#[async_trait]
impl RuntimeAwareTool for TaskTool {
    fn name(&self) -> &'static str {
        "task"
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "subagent_name": {
                    "type": "string",
                    "description": "Name of the sub-agent to dispatch"
                },
                "description": {
                    "type": "string",
                    "description": "Detailed description of the task for the sub-agent"
                }
            },
            "required": ["subagent_name", "description"]
        }))
    }

    fn parallel_safe(&self) -> bool {
        true
    }

    async fn call_with_runtime(
        &self,
        args: Value,
        runtime: ToolRuntime,
    ) -> Result<ToolOutput, FathomError> {
        let name = args
            .get("subagent_name")
            .and_then(Value::as_str)
            .ok_or_else(|| FathomError::BadArguments("missing 'subagent_name' parameter".into()))?;
        let description = args
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| FathomError::BadArguments("missing 'description' parameter".into()))?;

        let Some(def) = self.registry.get(name) else {
            let allowed = self
                .registry
                .keys()
                .map(|k| format!("`{k}`"))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(FathomError::UnknownSubAgent(format!(
                "'{name}' does not exist; allowed sub-agents: {allowed}"
            )));
        };

        let agent = self.resolve_agent(def, &runtime.state.files)?;

        let child_thread = if runtime.state.thread_id.is_empty() {
            format!("task:{}", runtime.tool_call_id)
        } else {
            format!("{}:{}", runtime.state.thread_id, runtime.tool_call_id)
        };

        let mut child_state = AgentState::with_messages(vec![
            Message::system(def.prompt.clone()),
            Message::human(description),
        ]);
        child_state.thread_id = child_thread.clone();

        tracing::debug!(subagent = %def.name, thread = %child_thread, "dispatching sub-agent");

        let config = self
            .context
            .checkpointer
            .as_ref()
            .map(|_| CheckpointConfig::new(child_thread));
        let result = agent
            .invoke_with_config(child_state, config)
            .await
            .map_err(|e| FathomError::SubAgentFailed(format!("{}: {e}", def.name)))?;

        let final_state = match result {
            GraphResult::Complete(state) | GraphResult::Cancelled(state) => state,
            GraphResult::Interrupted { .. } => {
                return Err(FathomError::SubAgentFailed(format!(
                    "{}: child suspended on an interrupt, which sub-agents do not support",
                    def.name
                )));
            }
        };

        let text = final_state
            .messages
            .iter()
            .rev()
            .find(|m| m.is_ai())
            .map(|m| m.content().to_string())
            .unwrap_or_else(|| "Sub-agent completed with no response".to_string());

        // Only files under the shared prefixes flow back; todos never do.
        let shared: BTreeMap<String, Option<FileData>> = final_state
            .files
            .into_iter()
            .filter(|(path, _)| {
                self.context.config.shared_file_prefixes.iter().any(|prefix| {
                    let prefix = if prefix == "/" {
                        "/"
                    } else {
                        prefix.trim_end_matches('/')
                    };
                    crate::pathutil::is_under(prefix, path)
                })
            })
            .map(|(path, data)| (path, Some(data)))
            .collect();

        let update = StateUpdate {
            todos: None,
            files: (!shared.is_empty()).then_some(shared),
        };

        Ok(ToolOutput::Command {
            content: Value::String(text),
            update,
        })
    }
}
