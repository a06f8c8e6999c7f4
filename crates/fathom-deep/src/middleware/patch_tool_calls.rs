//! Tool-call graph repair.
//!
//! Before each model call, every assistant tool call with no matching
//! response gets a synthetic cancellation response, and assistant
//! messages whose only content is invalid tool calls are stripped.
//! This makes resumption after an interrupt safe even when another
//! middleware decided not to execute a call.

use async_trait::async_trait;
use fathom_core::{AgentState, FathomError, Message};
use fathom_middleware::{AgentMiddleware, ModelGate};
use serde_json::json;

pub struct PatchToolCallsMiddleware;

impl PatchToolCallsMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PatchToolCallsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

fn is_invalid_only(message: &Message) -> bool {
    message.is_ai()
        && message.content().is_empty()
        && message.tool_calls().is_empty()
        && !message.invalid_tool_calls().is_empty()
}

#[async_trait]
impl AgentMiddleware for PatchToolCallsMiddleware {
    async fn before_model(&self, state: &mut AgentState) -> Result<ModelGate, FathomError> {
        if state.messages.is_empty() {
            return Ok(ModelGate::Continue);
        }

        let mut patched: Vec<Message> = Vec::with_capacity(state.messages.len());
        let mut changed = false;

        for (i, message) in state.messages.iter().enumerate() {
            if is_invalid_only(message) {
                for invalid in message.invalid_tool_calls() {
                    tracing::warn!(
                        tool = invalid.name.as_deref().unwrap_or("?"),
                        error = %invalid.error,
                        "dropping assistant message with only invalid tool calls"
                    );
                }
                changed = true;
                continue;
            }

            patched.push(message.clone());

            for call in message.tool_calls() {
                let answered = state.messages[i..]
                    .iter()
                    .any(|m| m.tool_call_id() == Some(call.id.as_str()));
                if !answered {
                    let payload = json!({
                        "status": "cancelled",
                        "reason": format!(
                            "tool call {} ({}) was cancelled - another message came in before it could be completed",
                            call.id, call.name
                        ),
                    });
                    patched.push(Message::tool(payload.to_string(), &call.id).with_name(&call.name));
                    changed = true;
                    tracing::debug!(call_id = %call.id, tool = %call.name, "patched dangling tool call");
                }
            }
        }

        if changed {
            state.messages = patched;
        }
        Ok(ModelGate::Continue)
    }
}
