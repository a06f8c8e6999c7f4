use std::sync::Arc;

use async_trait::async_trait;
use fathom_core::{
    AgentState, ChatModel, ChatRequest, ChatResponse, FathomError, Message, ToolCall,
};
use fathom_deep::backend::{Backend, StateBackend};
use fathom_deep::middleware::SummarizationMiddleware;
use fathom_middleware::AgentMiddleware;
use serde_json::json;

struct SummarizerModel;

#[async_trait]
impl ChatModel for SummarizerModel {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, FathomError> {
        Ok(ChatResponse {
            message: Message::ai("the conversation so far, condensed"),
            usage: None,
        })
    }
}

fn estimate(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| {
            m.content().len() / 4
                + m.tool_calls()
                    .iter()
                    .map(|c| c.arguments.to_string().len() / 4)
                    .sum::<usize>()
                + 1
        })
        .sum()
}

fn filler(n: usize) -> String {
    "word ".repeat(n)
}

#[tokio::test]
async fn below_high_water_nothing_happens() {
    let backend = Arc::new(StateBackend::new());
    let mw = SummarizationMiddleware::new(backend, Arc::new(SummarizerModel), 10_000, 5_000);

    let mut state = AgentState::with_messages(vec![
        Message::human("short question"),
        Message::ai("short answer"),
    ]);
    let before = state.messages.clone();
    mw.before_model(&mut state).await.unwrap();
    assert_eq!(state.messages, before);
}

#[tokio::test]
async fn crossing_high_water_compacts_under_low_water() {
    let backend = Arc::new(StateBackend::new());
    let mw = SummarizationMiddleware::new(backend.clone(), Arc::new(SummarizerModel), 200, 100);

    let mut state = AgentState::with_messages(vec![
        Message::system("you are helpful"),
        Message::human(filler(100)),
        Message::ai(filler(100)),
        Message::human(filler(100)),
        Message::ai(filler(20)),
    ]);
    mw.before_model(&mut state).await.unwrap();

    // Immediately after the pass the total sits under the low-water mark.
    assert!(estimate(&state.messages) <= 100);

    // Leading system message survives, followed by the synthetic summary.
    assert!(state.messages[0].is_system());
    assert_eq!(state.messages[0].content(), "you are helpful");
    assert!(state.messages[1].is_system());
    assert!(state.messages[1]
        .content()
        .contains("the conversation so far, condensed"));

    // The newest message always survives.
    assert!(state
        .messages
        .last()
        .unwrap()
        .content()
        .starts_with("word"));
}

#[tokio::test]
async fn tool_call_pairs_are_never_split() {
    let backend = Arc::new(StateBackend::new());
    let mw = SummarizationMiddleware::new(backend, Arc::new(SummarizerModel), 100, 90);

    // The AI+tool pair is in the middle; any cut containing the AI message
    // must also contain its response.
    let mut state = AgentState::with_messages(vec![
        Message::human(filler(80)),
        Message::ai_with_tool_calls(
            "",
            vec![ToolCall {
                id: "tc_pair".into(),
                name: "ls".into(),
                arguments: json!({"path": "/"}),
            }],
        ),
        Message::tool("listing", "tc_pair"),
        Message::human(filler(80)),
        Message::ai("latest"),
    ]);
    mw.before_model(&mut state).await.unwrap();

    let has_call = state
        .messages
        .iter()
        .any(|m| m.tool_calls().iter().any(|c| c.id == "tc_pair"));
    let has_response = state
        .messages
        .iter()
        .any(|m| m.tool_call_id() == Some("tc_pair"));
    assert_eq!(
        has_call, has_response,
        "an AI message must never be separated from its tool response"
    );
}

#[tokio::test]
async fn verbatim_history_is_offloaded_to_the_backend() {
    let backend = Arc::new(StateBackend::new());
    let mw = SummarizationMiddleware::new(backend.clone(), Arc::new(SummarizerModel), 100, 50);

    let mut state = AgentState::with_messages(vec![
        Message::human(format!("unique-marker-alpha {}", filler(100))),
        Message::human(filler(100)),
        Message::ai("latest"),
    ]);
    mw.before_model(&mut state).await.unwrap();

    let saved = backend
        .read("/.context/history_0.md", 0, None)
        .await
        .unwrap();
    assert!(saved.contains("unique-marker-alpha"));
    assert!(saved.contains("## human"));
}
