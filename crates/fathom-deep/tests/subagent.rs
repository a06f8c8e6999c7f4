use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fathom_core::{
    AgentState, ChatModel, ChatRequest, ChatResponse, FathomError, Message, ToolCall,
};
use fathom_deep::backend::StateBackend;
use fathom_deep::{create_deep_agent, DeepAgentOptions, SubAgentDef};
use serde_json::{json, Value};

/// Child model that optionally sleeps, then answers with a fixed reply.
struct ChildModel {
    delay_ms: u64,
    reply: &'static str,
}

#[async_trait]
impl ChatModel for ChildModel {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, FathomError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        Ok(ChatResponse {
            message: Message::ai(self.reply),
            usage: None,
        })
    }
}

/// Child model that writes a file before answering.
struct WriterChildModel {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for WriterChildModel {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, FathomError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let message = if n == 0 {
            Message::ai_with_tool_calls(
                "",
                vec![ToolCall {
                    id: "child_write".into(),
                    name: "write_file".into(),
                    arguments: json!({"path": "/report.md", "content": "child findings"}),
                }],
            )
        } else {
            Message::ai("report written")
        };
        Ok(ChatResponse {
            message,
            usage: None,
        })
    }
}

/// Parent model scripted to issue the given tool calls, then finish.
struct ParentModel {
    calls: AtomicUsize,
    tool_calls: Vec<ToolCall>,
}

#[async_trait]
impl ChatModel for ParentModel {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, FathomError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let message = if n == 0 {
            Message::ai_with_tool_calls("", self.tool_calls.clone())
        } else {
            Message::ai("all tasks done")
        };
        Ok(ChatResponse {
            message,
            usage: None,
        })
    }
}

fn task_call(id: &str, agent: &str, description: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: "task".to_string(),
        arguments: json!({"subagent_name": agent, "description": description}),
    }
}

#[tokio::test]
async fn task_returns_the_childs_final_text() {
    let parent_model = Arc::new(ParentModel {
        calls: AtomicUsize::new(0),
        tool_calls: vec![task_call("tc_t", "echoer", "say hello")],
    });

    let mut options = DeepAgentOptions::new(Arc::new(StateBackend::new()));
    options.subagents = vec![SubAgentDef {
        model: Some(Arc::new(ChildModel {
            delay_ms: 0,
            reply: "hello from the child",
        })),
        ..SubAgentDef::new("echoer", "Echoes a greeting", "You echo greetings.")
    }];

    let agent = create_deep_agent(parent_model, options).unwrap();
    let state = agent
        .invoke(AgentState::with_messages(vec![Message::human("delegate")]))
        .await
        .unwrap()
        .into_state();

    let reply = state
        .messages
        .iter()
        .find(|m| m.tool_call_id() == Some("tc_t"))
        .unwrap();
    assert_eq!(reply.content(), "hello from the child");
}

#[tokio::test]
async fn unknown_subagent_is_a_typed_error() {
    let parent_model = Arc::new(ParentModel {
        calls: AtomicUsize::new(0),
        tool_calls: vec![task_call("tc_g", "ghost", "do something")],
    });

    let options = DeepAgentOptions::new(Arc::new(StateBackend::new()));
    let agent = create_deep_agent(parent_model, options).unwrap();
    let state = agent
        .invoke(AgentState::with_messages(vec![Message::human("delegate")]))
        .await
        .unwrap()
        .into_state();

    let reply = state
        .messages
        .iter()
        .find(|m| m.tool_call_id() == Some("tc_g"))
        .unwrap();
    let payload: Value = serde_json::from_str(reply.content()).unwrap();
    assert_eq!(payload["error_kind"], "UnknownSubAgent");
    assert!(payload["message"]
        .as_str()
        .unwrap()
        .contains("general-purpose"));
}

#[tokio::test]
async fn parallel_siblings_stitch_in_declared_order() {
    let parent_model = Arc::new(ParentModel {
        calls: AtomicUsize::new(0),
        tool_calls: vec![
            task_call("tc_slow", "slow-agent", "take your time"),
            task_call("tc_fast", "fast-agent", "be quick"),
        ],
    });

    let mut options = DeepAgentOptions::new(Arc::new(StateBackend::new()));
    options.subagents = vec![
        SubAgentDef {
            model: Some(Arc::new(ChildModel {
                delay_ms: 80,
                reply: "slow result",
            })),
            ..SubAgentDef::new("slow-agent", "Slow worker", "Work slowly.")
        },
        SubAgentDef {
            model: Some(Arc::new(ChildModel {
                delay_ms: 1,
                reply: "fast result",
            })),
            ..SubAgentDef::new("fast-agent", "Fast worker", "Work fast.")
        },
    ];

    let agent = create_deep_agent(parent_model, options).unwrap();
    let state = agent
        .invoke(AgentState::with_messages(vec![Message::human("fan out")]))
        .await
        .unwrap()
        .into_state();

    // Whichever child finished first, responses follow the declared order.
    let tool_replies: Vec<(&str, &str)> = state
        .messages
        .iter()
        .filter_map(|m| m.tool_call_id().map(|id| (id, m.content())))
        .collect();
    assert_eq!(
        tool_replies,
        vec![("tc_slow", "slow result"), ("tc_fast", "fast result")]
    );
}

#[tokio::test]
async fn child_files_propagate_and_todos_do_not() {
    let parent_model = Arc::new(ParentModel {
        calls: AtomicUsize::new(0),
        tool_calls: vec![task_call("tc_w", "writer", "write the report")],
    });

    let mut options = DeepAgentOptions::new(Arc::new(StateBackend::new()));
    options.subagents = vec![SubAgentDef {
        model: Some(Arc::new(WriterChildModel {
            calls: AtomicUsize::new(0),
        })),
        ..SubAgentDef::new("writer", "Writes reports", "You write reports.")
    }];

    let agent = create_deep_agent(parent_model, options).unwrap();
    let state = agent
        .invoke(AgentState::with_messages(vec![Message::human("delegate")]))
        .await
        .unwrap()
        .into_state();

    assert_eq!(state.files["/report.md"].content, "child findings");
    assert!(state.todos.is_empty());
}

#[tokio::test]
async fn children_have_no_task_tool_by_default() {
    // A child that tries to spawn its own sub-agent gets an unknown-tool
    // error because recursion is off by default.
    struct RecursiveChildModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for RecursiveChildModel {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, FathomError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let message = if n == 0 {
                Message::ai_with_tool_calls(
                    "",
                    vec![task_call("nested", "general-purpose", "recurse")],
                )
            } else {
                Message::ai("gave up on recursion")
            };
            Ok(ChatResponse {
                message,
                usage: None,
            })
        }
    }

    let parent_model = Arc::new(ParentModel {
        calls: AtomicUsize::new(0),
        tool_calls: vec![task_call("tc_r", "recurser", "try to recurse")],
    });

    let mut options = DeepAgentOptions::new(Arc::new(StateBackend::new()));
    options.subagents = vec![SubAgentDef {
        model: Some(Arc::new(RecursiveChildModel {
            calls: AtomicUsize::new(0),
        })),
        ..SubAgentDef::new("recurser", "Tries to recurse", "Recurse if you can.")
    }];

    let agent = create_deep_agent(parent_model, options).unwrap();
    let state = agent
        .invoke(AgentState::with_messages(vec![Message::human("delegate")]))
        .await
        .unwrap()
        .into_state();

    let reply = state
        .messages
        .iter()
        .find(|m| m.tool_call_id() == Some("tc_r"))
        .unwrap();
    assert_eq!(reply.content(), "gave up on recursion");
}
