use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use fathom_core::{CallbackHandler, CancelToken, FathomError, InterruptDescriptor};

use crate::State;

/// Per-run context threaded to every node.
#[derive(Clone, Default)]
pub struct RunContext {
    /// Cooperative cancellation signal, observed between tool calls.
    pub cancel: CancelToken,
    /// Optional telemetry sink.
    pub callbacks: Option<Arc<dyn CallbackHandler>>,
}

impl RunContext {
    pub async fn emit(&self, event: fathom_core::RunEvent) {
        if let Some(cb) = &self.callbacks {
            if let Err(e) = cb.on_event(event).await {
                tracing::warn!(error = %e, "callback handler failed");
            }
        }
    }
}

/// What a node produced: a new state, or a suspension request.
#[derive(Debug, Clone)]
pub enum NodeOutput<S> {
    State(S),
    /// Suspend the run. The state carries the pending interrupt and is
    /// checkpointed so the same node re-runs on resume.
    Interrupt {
        state: S,
        interrupt: InterruptDescriptor,
    },
}

impl<S> From<S> for NodeOutput<S> {
    fn from(state: S) -> Self {
        NodeOutput::State(state)
    }
}

/// A node in the graph that processes state.
#[async_trait]
pub trait Node<S: State>: Send + Sync {
    async fn process(&self, state: S, ctx: &RunContext) -> Result<NodeOutput<S>, FathomError>;
}

/// Wraps an async function as a Node.
pub struct FnNode<S, F, Fut>
where
    S: State,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, FathomError>> + Send,
{
    func: F,
    _marker: PhantomData<S>,
}

impl<S, F, Fut> FnNode<S, F, Fut>
where
    S: State,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, FathomError>> + Send,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<S, F, Fut> Node<S> for FnNode<S, F, Fut>
where
    S: State,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, FathomError>> + Send,
{
    async fn process(&self, state: S, _ctx: &RunContext) -> Result<NodeOutput<S>, FathomError> {
        Ok(NodeOutput::State((self.func)(state).await?))
    }
}
