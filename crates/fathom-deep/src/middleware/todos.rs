//! Planning scratchpad: `write_todos` / `read_todos` tools plus planner
//! guidance in the system prompt.

use std::sync::Arc;

use async_trait::async_trait;
use fathom_core::{
    AgentState, AnyTool, FathomError, RuntimeAwareTool, StateUpdate, Todo, TodoStatus,
    ToolOutput, ToolRuntime,
};
use fathom_middleware::{AgentMiddleware, ModelRequest};
use serde_json::{json, Value};

const TODO_SYSTEM_PROMPT: &str = "\n\n## `write_todos`\n\n\
You have access to the `write_todos` tool to help you manage and plan \
complex objectives. Use it for multi-step objectives to track every \
necessary step and give the user visibility into your progress. Mark a \
todo completed as soon as the step is done; do not batch up completions. \
For simple objectives that take only a few steps, it is better to just do \
the task directly and skip the todo list.\n\n\
- Never call `write_todos` more than once in parallel.\n\
- Revise the todo list as you go; new information may reveal new tasks or \
make old ones irrelevant.";

/// Middleware contributing the planning tools.
///
/// Behavioral contract: `state.todos` mirrors the last accepted
/// `write_todos` call exactly.
pub struct TodoListMiddleware;

impl TodoListMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TodoListMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentMiddleware for TodoListMiddleware {
    fn tools(&self) -> Vec<AnyTool> {
        vec![
            AnyTool::Stateful(Arc::new(WriteTodosTool)),
            AnyTool::Stateful(Arc::new(ReadTodosTool)),
        ]
    }

    async fn modify_model_request(
        &self,
        request: &mut ModelRequest,
        _state: &AgentState,
    ) -> Result<(), FathomError> {
        request.append_system_prompt(TODO_SYSTEM_PROMPT);
        Ok(())
    }
}

struct WriteTodosTool;

#[async_trait]
impl RuntimeAwareTool for WriteTodosTool {
    fn name(&self) -> &'static str {
        "write_todos"
    }

    fn description(&self) -> &'static str {
        "Replace the todo list. Each item needs content and a status \
         (pending, in_progress, or completed)."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {"type": "string"},
                            "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]}
                        },
                        "required": ["content", "status"]
                    }
                }
            },
            "required": ["todos"]
        }))
    }

    async fn call_with_runtime(
        &self,
        args: Value,
        _runtime: ToolRuntime,
    ) -> Result<ToolOutput, FathomError> {
        let items = args
            .get("todos")
            .and_then(Value::as_array)
            .ok_or_else(|| FathomError::BadArguments("missing 'todos' parameter".into()))?;

        let mut todos = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let content = item
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if content.is_empty() {
                return Err(FathomError::BadArguments(format!(
                    "todo {} has empty content",
                    i + 1
                )));
            }
            let status = item.get("status").and_then(Value::as_str).unwrap_or("");
            let status = TodoStatus::parse(status).ok_or_else(|| {
                FathomError::BadArguments(format!("todo {} has invalid status '{status}'", i + 1))
            })?;
            todos.push(Todo {
                id: (i + 1).to_string(),
                content: content.to_string(),
                status,
            });
        }

        let count = todos.len();
        Ok(ToolOutput::Command {
            content: Value::String(format!("Updated todo list ({count} items)")),
            update: StateUpdate {
                todos: Some(todos),
                files: None,
            },
        })
    }
}

struct ReadTodosTool;

#[async_trait]
impl RuntimeAwareTool for ReadTodosTool {
    fn name(&self) -> &'static str {
        "read_todos"
    }

    fn description(&self) -> &'static str {
        "Return the current todo list."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({"type": "object", "properties": {}}))
    }

    async fn call_with_runtime(
        &self,
        _args: Value,
        runtime: ToolRuntime,
    ) -> Result<ToolOutput, FathomError> {
        let todos = serde_json::to_value(&runtime.state.todos)
            .map_err(|e| FathomError::Tool(format!("serialization: {e}")))?;
        Ok(ToolOutput::Value(todos))
    }
}
