//! Checkpointed state-graph runtime.
//!
//! An agent is a two-node graph ("agent" ⇄ "tools") compiled by
//! [`create_agent`]. Each node execution is a checkpoint boundary; runs
//! can suspend on durable interrupts and resume from the latest
//! checkpoint, and accept cooperative cancellation.

mod builder;
mod callbacks;
mod checkpoint;
mod compiled;
mod edge;
mod node;
mod prebuilt;
mod state;
mod tool_node;

pub use builder::StateGraph;
pub use callbacks::TracingCallback;
pub use checkpoint::{Checkpoint, CheckpointConfig, Checkpointer, MemorySaver};
pub use compiled::{CompiledGraph, GraphResult, InvokeOptions};
pub use edge::{ConditionalEdge, Edge, RouterFn};
pub use node::{FnNode, Node, NodeOutput, RunContext};
pub use prebuilt::{create_agent, AgentOptions, RetryPolicy};
pub use state::State;
pub use tool_node::{tools_condition, ToolNode};

/// Sentinel name for the graph start point.
pub const START: &str = "__start__";
/// Sentinel name for the graph end point.
pub const END: &str = "__end__";
