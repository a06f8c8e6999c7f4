//! Human-in-the-loop tool gating.
//!
//! Configured tools suspend the run before execution and wait for an
//! external decision: approve, edit (rewrite arguments), or reject. The
//! decision arrives through `AgentState::resume_decisions`, keyed by tool
//! call id, so re-delivery of the same decision is idempotent.

use std::collections::HashMap;

use async_trait::async_trait;
use fathom_core::{
    AgentState, DecisionKind, FathomError, HitlResponse, InterruptDescriptor, ToolCall,
};
use serde_json::{json, Value};

use crate::{AgentMiddleware, ToolGate};

/// Per-tool gating configuration.
#[derive(Debug, Clone)]
pub struct InterruptOnConfig {
    pub allowed_decisions: Vec<DecisionKind>,
}

impl Default for InterruptOnConfig {
    fn default() -> Self {
        Self {
            allowed_decisions: vec![DecisionKind::Approve, DecisionKind::Edit, DecisionKind::Reject],
        }
    }
}

impl InterruptOnConfig {
    pub fn allowing(decisions: Vec<DecisionKind>) -> Self {
        Self {
            allowed_decisions: decisions,
        }
    }

    fn allows(&self, kind: DecisionKind) -> bool {
        self.allowed_decisions.contains(&kind)
    }
}

/// Middleware that suspends configured tool calls for human approval.
pub struct HumanInTheLoopMiddleware {
    interrupt_on: HashMap<String, InterruptOnConfig>,
}

impl HumanInTheLoopMiddleware {
    pub fn new(interrupt_on: HashMap<String, InterruptOnConfig>) -> Self {
        Self { interrupt_on }
    }

    /// Gate the listed tools with all decisions allowed.
    pub fn for_tools(tool_names: Vec<String>) -> Self {
        Self {
            interrupt_on: tool_names
                .into_iter()
                .map(|name| (name, InterruptOnConfig::default()))
                .collect(),
        }
    }
}

#[async_trait]
impl AgentMiddleware for HumanInTheLoopMiddleware {
    async fn before_tool_call(
        &self,
        state: &AgentState,
        call: &mut ToolCall,
    ) -> Result<ToolGate, FathomError> {
        let Some(config) = self.interrupt_on.get(&call.name) else {
            return Ok(ToolGate::Continue);
        };

        match state.resume_decisions.get(&call.id) {
            None => {
                tracing::debug!(tool = %call.name, call_id = %call.id, "suspending for approval");
                Ok(ToolGate::Suspend(InterruptDescriptor::tool_approval(
                    call.clone(),
                    config.allowed_decisions.clone(),
                    state.thread_id.clone(),
                    state.run_id.clone(),
                )))
            }
            Some(decision) => {
                if !config.allows(decision.kind()) {
                    return Err(FathomError::Validation(format!(
                        "decision {:?} not allowed for tool '{}'",
                        decision.kind(),
                        call.name
                    )));
                }
                match decision {
                    HitlResponse::Approve => Ok(ToolGate::Continue),
                    HitlResponse::Edit { new_args } => {
                        call.arguments = new_args.clone();
                        Ok(ToolGate::Continue)
                    }
                    HitlResponse::Reject { reason } => Ok(ToolGate::ReplaceResult(
                        json!({ "status": "rejected", "reason": reason }),
                    )),
                }
            }
        }
    }

    async fn after_tool_call(
        &self,
        state: &mut AgentState,
        call: &ToolCall,
        result: Value,
    ) -> Result<Value, FathomError> {
        // The decision is single-use; consuming it here keeps a later call
        // with a recycled id from silently bypassing approval.
        state.resume_decisions.remove(&call.id);
        Ok(result)
    }
}
