use std::collections::HashMap;
use std::sync::Arc;

use crate::state::State;

/// A fixed edge between two nodes.
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// Routing function for conditional edges.
pub type RouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// A conditional edge: the router inspects state and names the next node.
pub struct ConditionalEdge<S: State> {
    pub source: String,
    pub router: RouterFn<S>,
    /// Optional label → target map for validation and introspection.
    pub path_map: Option<HashMap<String, String>>,
}
