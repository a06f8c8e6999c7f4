use fathom_core::AgentState;

/// Trait for graph state. Types implementing this can be threaded through
/// a compiled graph.
pub trait State: Clone + Send + Sync + 'static {
    /// Merge another state into this one (reducer pattern).
    fn merge(&mut self, other: Self);

    /// Identifier used in telemetry events; empty when not applicable.
    fn run_id(&self) -> &str {
        ""
    }

    /// Bind the state to a checkpoint thread. Called once at invoke time
    /// when a checkpoint config is present.
    fn bind_thread(&mut self, _thread_id: &str) {}
}

impl State for AgentState {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn bind_thread(&mut self, thread_id: &str) {
        if self.thread_id.is_empty() {
            self.thread_id = thread_id.to_string();
        }
    }

    fn merge(&mut self, other: Self) {
        self.messages.extend(other.messages);
        if !other.todos.is_empty() {
            self.todos = other.todos;
        }
        for (path, data) in other.files {
            self.files.insert(path, data);
        }
        if !other.run_id.is_empty() {
            self.run_id = other.run_id;
        }
        if !other.thread_id.is_empty() {
            self.thread_id = other.thread_id;
        }
        // A merged fragment carrying decisions answers the pending interrupt.
        for (call_id, decision) in other.resume_decisions {
            self.resume_decisions.insert(call_id, decision);
        }
        if !self.resume_decisions.is_empty() {
            self.pending_interrupt = None;
        }
        if other.pending_interrupt.is_some() {
            self.pending_interrupt = other.pending_interrupt;
        }
    }
}
