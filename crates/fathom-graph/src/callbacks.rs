use async_trait::async_trait;
use fathom_core::{CallbackHandler, FathomError, RunEvent};

/// Callback handler that forwards run events to `tracing`.
#[derive(Default)]
pub struct TracingCallback;

impl TracingCallback {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CallbackHandler for TracingCallback {
    async fn on_event(&self, event: RunEvent) -> Result<(), FathomError> {
        match event {
            RunEvent::RunStarted { run_id, thread_id } => {
                tracing::info!(run_id = %run_id, thread_id = %thread_id, "run started");
            }
            RunEvent::RunStep { run_id, step } => {
                tracing::info!(run_id = %run_id, step, "run step");
            }
            RunEvent::ModelCalled {
                run_id,
                message_count,
            } => {
                tracing::info!(run_id = %run_id, message_count, "model called");
            }
            RunEvent::ToolCalled { run_id, tool_name } => {
                tracing::info!(run_id = %run_id, tool_name = %tool_name, "tool called");
            }
            RunEvent::Interrupted { run_id, tool_name } => {
                tracing::info!(run_id = %run_id, tool_name = %tool_name, "run interrupted");
            }
            RunEvent::RunFinished { run_id, output } => {
                tracing::info!(run_id = %run_id, output_len = output.len(), "run finished");
            }
            RunEvent::RunCancelled { run_id } => {
                tracing::info!(run_id = %run_id, "run cancelled");
            }
            RunEvent::RunFailed { run_id, error } => {
                tracing::error!(run_id = %run_id, error = %error, "run failed");
            }
        }
        Ok(())
    }
}
