//! Middleware contract and pipeline.
//!
//! A middleware participates in the agent step loop through any subset of
//! six hooks: contributing tools, mutating state before/after each model
//! call, rewriting the outgoing model request, and gating individual tool
//! calls before/after execution. The [`MiddlewareChain`] owns hook
//! invocation order.
//!
//! # Ordering convention
//!
//! Middlewares are assembled **bottom-up**: the innermost middleware is
//! pushed first and the outermost last (human-in-the-loop sits outermost
//! so it can veto any tool call). "Stack order" means outermost-first —
//! the reverse of assembly order.
//!
//! - `before_model`, `modify_model_request`, `before_tool_call` run in
//!   stack order (outermost first, assembly order reversed).
//! - `after_model`, `after_tool_call` run in reverse stack order
//!   (innermost first, assembly order).
//!
//! `before_model` and `before_tool_call` may short-circuit; the first
//! middleware that returns a non-`Continue` gate wins and later hooks do
//! not run for that call. `after_tool_call` hooks run for every answered
//! call, including calls short-circuited by a gate, so bookkeeping (e.g.
//! consuming a resume decision) always happens.

mod human_in_the_loop;

pub use human_in_the_loop::{HumanInTheLoopMiddleware, InterruptOnConfig};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fathom_core::{
    AgentState, AnyTool, FathomError, InterruptDescriptor, Message, ToolCall, ToolChoice,
    ToolDefinition,
};
use serde_json::Value;

/// The outgoing model request, assembled each step and open to rewriting.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    /// Model id override; `None` means the client default.
    pub model: Option<String>,
    /// Provider-specific hints (e.g. prompt-cache markers).
    pub metadata: BTreeMap<String, Value>,
}

impl ModelRequest {
    /// Append a section to the system prompt, creating it if absent.
    pub fn append_system_prompt(&mut self, section: &str) {
        match &mut self.system_prompt {
            Some(prompt) => {
                prompt.push_str(section);
            }
            None => self.system_prompt = Some(section.to_string()),
        }
    }
}

/// Outcome of a `before_model` hook.
#[derive(Debug, Clone)]
pub enum ModelGate {
    /// Proceed to the next hook / the model call.
    Continue,
    /// Skip the model call and append this message instead.
    ShortCircuit(Message),
    /// Suspend the run with a durable interrupt.
    Suspend(InterruptDescriptor),
}

/// Outcome of a `before_tool_call` hook.
#[derive(Debug, Clone)]
pub enum ToolGate {
    /// Proceed to the next hook / tool execution.
    Continue,
    /// Skip execution; answer the call with this payload instead.
    ReplaceResult(Value),
    /// Suspend the run with a durable interrupt.
    Suspend(InterruptDescriptor),
}

/// A middleware participating in the agent pipeline.
///
/// All hooks have no-op defaults; implement only what you need.
#[async_trait]
pub trait AgentMiddleware: Send + Sync {
    /// Tools this middleware contributes to the agent.
    fn tools(&self) -> Vec<AnyTool> {
        vec![]
    }

    /// Runs before each model call; may mutate state, short-circuit, or suspend.
    async fn before_model(&self, _state: &mut AgentState) -> Result<ModelGate, FathomError> {
        Ok(ModelGate::Continue)
    }

    /// Rewrites the outgoing model request (messages, model choice, tool subset).
    async fn modify_model_request(
        &self,
        _request: &mut ModelRequest,
        _state: &AgentState,
    ) -> Result<(), FathomError> {
        Ok(())
    }

    /// Runs after each model response has been appended to state.
    async fn after_model(&self, _state: &mut AgentState) -> Result<(), FathomError> {
        Ok(())
    }

    /// Gates a single tool call; may rewrite its arguments in place.
    async fn before_tool_call(
        &self,
        _state: &AgentState,
        _call: &mut ToolCall,
    ) -> Result<ToolGate, FathomError> {
        Ok(ToolGate::Continue)
    }

    /// Observes / rewrites a tool result after the call is answered.
    async fn after_tool_call(
        &self,
        _state: &mut AgentState,
        _call: &ToolCall,
        result: Value,
    ) -> Result<Value, FathomError> {
        Ok(result)
    }
}

/// An ordered stack of middlewares plus the invocation rules above.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    // Assembly order: index 0 is innermost, last is outermost.
    middlewares: Vec<Arc<dyn AgentMiddleware>>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<Arc<dyn AgentMiddleware>>) -> Self {
        Self { middlewares }
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// All tools contributed by the stack, innermost middleware first.
    pub fn tools(&self) -> Vec<AnyTool> {
        self.middlewares.iter().flat_map(|m| m.tools()).collect()
    }

    /// Run `before_model` hooks in stack order (outermost first).
    ///
    /// Returns the first non-`Continue` gate, or `Continue` if every hook
    /// passed.
    pub async fn before_model(&self, state: &mut AgentState) -> Result<ModelGate, FathomError> {
        for mw in self.middlewares.iter().rev() {
            match mw.before_model(state).await? {
                ModelGate::Continue => continue,
                gate => return Ok(gate),
            }
        }
        Ok(ModelGate::Continue)
    }

    /// Run `modify_model_request` hooks in stack order (outermost first).
    pub async fn modify_model_request(
        &self,
        request: &mut ModelRequest,
        state: &AgentState,
    ) -> Result<(), FathomError> {
        for mw in self.middlewares.iter().rev() {
            mw.modify_model_request(request, state).await?;
        }
        Ok(())
    }

    /// Run `after_model` hooks in reverse stack order (innermost first).
    pub async fn after_model(&self, state: &mut AgentState) -> Result<(), FathomError> {
        for mw in &self.middlewares {
            mw.after_model(state).await?;
        }
        Ok(())
    }

    /// Run `before_tool_call` hooks in stack order (outermost first).
    pub async fn before_tool_call(
        &self,
        state: &AgentState,
        call: &mut ToolCall,
    ) -> Result<ToolGate, FathomError> {
        for mw in self.middlewares.iter().rev() {
            match mw.before_tool_call(state, call).await? {
                ToolGate::Continue => continue,
                gate => return Ok(gate),
            }
        }
        Ok(ToolGate::Continue)
    }

    /// Run `after_tool_call` hooks in reverse stack order (innermost first),
    /// threading the result through each hook.
    pub async fn after_tool_call(
        &self,
        state: &mut AgentState,
        call: &ToolCall,
        mut result: Value,
    ) -> Result<Value, FathomError> {
        for mw in &self.middlewares {
            result = mw.after_tool_call(state, call, result).await?;
        }
        Ok(result)
    }
}
