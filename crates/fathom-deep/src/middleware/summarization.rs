//! Context-window management: when the conversation grows past a
//! high-water token mark, the oldest messages are summarized by the model
//! and replaced with a single synthetic summary message.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fathom_core::{AgentState, ChatModel, ChatRequest, FathomError, Message};
use fathom_middleware::{AgentMiddleware, ModelGate};

use crate::backend::Backend;

const HISTORY_DIR: &str = "/.context";

pub struct SummarizationMiddleware {
    backend: Arc<dyn Backend>,
    model: Arc<dyn ChatModel>,
    high_water_tokens: usize,
    low_water_tokens: usize,
    history_counter: AtomicUsize,
}

impl SummarizationMiddleware {
    pub fn new(
        backend: Arc<dyn Backend>,
        model: Arc<dyn ChatModel>,
        high_water_tokens: usize,
        low_water_tokens: usize,
    ) -> Self {
        Self {
            backend,
            model,
            high_water_tokens,
            low_water_tokens,
            history_counter: AtomicUsize::new(0),
        }
    }

    fn estimate_tokens(message: &Message) -> usize {
        // chars/4 heuristic; usage metadata is not available per message.
        message.content().len() / 4
            + message
                .tool_calls()
                .iter()
                .map(|c| c.arguments.to_string().len() / 4)
                .sum::<usize>()
            + 1
    }

    fn total_tokens(messages: &[Message]) -> usize {
        messages.iter().map(Self::estimate_tokens).sum()
    }
}

/// Group messages into atomic units: an AI message with tool calls stays
/// glued to its tool responses so a cut never splits a call from its
/// response.
fn into_units(messages: Vec<Message>) -> Vec<Vec<Message>> {
    let mut units: Vec<Vec<Message>> = Vec::new();
    for message in messages {
        let attach = message.tool_call_id().is_some()
            && units.last().is_some_and(|unit| {
                unit.iter().any(|m| {
                    m.tool_calls()
                        .iter()
                        .any(|c| Some(c.id.as_str()) == message.tool_call_id())
                })
            });
        if attach {
            if let Some(unit) = units.last_mut() {
                unit.push(message);
                continue;
            }
        }
        units.push(vec![message]);
    }
    units
}

#[async_trait]
impl AgentMiddleware for SummarizationMiddleware {
    async fn before_model(&self, state: &mut AgentState) -> Result<ModelGate, FathomError> {
        if Self::total_tokens(&state.messages) <= self.high_water_tokens {
            return Ok(ModelGate::Continue);
        }

        // Leading system messages always survive.
        let split = state
            .messages
            .iter()
            .position(|m| !m.is_system())
            .unwrap_or(state.messages.len());
        let system_prefix: Vec<Message> = state.messages[..split].to_vec();
        let rest: Vec<Message> = state.messages[split..].to_vec();

        let system_tokens = Self::total_tokens(&system_prefix);
        let mut units = into_units(rest);

        // Cut the oldest units until what remains fits under the low-water
        // mark; the most recent unit always survives.
        let mut cut: Vec<Message> = Vec::new();
        while units.len() > 1 {
            let remaining: usize = units.iter().flatten().map(Self::estimate_tokens).sum();
            if system_tokens + remaining <= self.low_water_tokens {
                break;
            }
            cut.extend(units.remove(0));
        }
        if cut.is_empty() {
            return Ok(ModelGate::Continue);
        }

        // Offload the verbatim prefix before replacing it.
        let n = self.history_counter.fetch_add(1, Ordering::Relaxed);
        let history_path = format!("{HISTORY_DIR}/history_{n}.md");
        let transcript = cut
            .iter()
            .map(|m| format!("## {}\n{}", m.role(), m.content()))
            .collect::<Vec<_>>()
            .join("\n\n");
        if let Err(e) = self.backend.write(&history_path, &transcript).await {
            tracing::warn!(error = %e, "failed to offload conversation history");
        }

        let summary_prompt = format!(
            "Summarize the following conversation concisely, preserving key \
             decisions, facts, file paths, and open questions:\n\n{}",
            cut.iter()
                .map(|m| format!("{}: {}", m.role(), m.content()))
                .collect::<Vec<_>>()
                .join("\n")
        );
        let response = self
            .model
            .chat(ChatRequest::new(vec![Message::human(summary_prompt)]))
            .await?;
        let summary = response.message.content().to_string();

        tracing::debug!(
            cut_messages = cut.len(),
            history = %history_path,
            "summarized conversation prefix"
        );

        let mut messages = system_prefix;
        messages.push(Message::system(format!(
            "[Conversation summary (full history saved to {history_path})]\n{summary}"
        )));
        messages.extend(units.into_iter().flatten());
        state.messages = messages;

        Ok(ModelGate::Continue)
    }
}
