use serde_json::json;
use fathom_core::{AgentState, FileData, HitlResponse, Message, StateUpdate, Todo, TodoStatus, ToolCall};

#[test]
fn system_message_factory() {
    let msg = Message::system("You are helpful");
    assert_eq!(msg.content(), "You are helpful");
    assert_eq!(msg.role(), "system");
    assert!(msg.is_system());
    assert!(!msg.is_human());
}

#[test]
fn human_message_factory() {
    let msg = Message::human("Hello");
    assert_eq!(msg.content(), "Hello");
    assert_eq!(msg.role(), "human");
    assert!(msg.is_human());
}

#[test]
fn ai_message_with_tool_calls() {
    let msg = Message::ai_with_tool_calls(
        "calling tool",
        vec![ToolCall {
            id: "call-1".into(),
            name: "search".into(),
            arguments: json!({"q": "rust"}),
        }],
    );
    assert!(msg.is_ai());
    assert_eq!(msg.tool_calls().len(), 1);
    assert_eq!(msg.tool_calls()[0].name, "search");
}

#[test]
fn tool_message_factory() {
    let msg = Message::tool("result data", "call-1").with_name("search");
    assert_eq!(msg.content(), "result data");
    assert_eq!(msg.role(), "tool");
    assert!(msg.is_tool());
    assert_eq!(msg.tool_call_id(), Some("call-1"));
}

#[test]
fn tool_call_id_none_for_non_tool() {
    let msg = Message::human("hi");
    assert_eq!(msg.tool_call_id(), None);
}

#[test]
fn message_serde_roundtrip() {
    let msg = Message::ai_with_tool_calls(
        "using tool",
        vec![ToolCall {
            id: "c1".into(),
            name: "calc".into(),
            arguments: json!({"x": 1}),
        }],
    );
    let json = serde_json::to_string(&msg).unwrap();
    let deserialized: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(msg, deserialized);
}

#[test]
fn message_serde_system_format() {
    let msg = Message::system("be helpful");
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["role"], "system");
    assert_eq!(json["content"], "be helpful");
}

#[test]
fn message_serde_tool_calls_omitted_when_empty() {
    let msg = Message::ai("hello");
    let json = serde_json::to_value(&msg).unwrap();
    assert!(json.get("tool_calls").is_none());
}

#[test]
fn state_serde_roundtrip() {
    let mut state = AgentState::with_messages(vec![
        Message::human("plan"),
        Message::ai_with_tool_calls(
            "",
            vec![ToolCall {
                id: "tc_1".into(),
                name: "write_todos".into(),
                arguments: json!({}),
            }],
        ),
        Message::tool("ok", "tc_1"),
    ]);
    state.thread_id = "t1".into();
    state.todos.push(Todo {
        id: "1".into(),
        content: "step one".into(),
        status: TodoStatus::Pending,
    });

    let json = serde_json::to_string(&state).unwrap();
    let restored: AgentState = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.messages.len(), 3);
    assert_eq!(restored.todos.len(), 1);
    assert_eq!(restored.thread_id, "t1");
}

#[test]
fn answered_call_ids_after_last_ai_message() {
    let state = AgentState::with_messages(vec![
        Message::ai_with_tool_calls(
            "",
            vec![
                ToolCall {
                    id: "a".into(),
                    name: "x".into(),
                    arguments: json!({}),
                },
                ToolCall {
                    id: "b".into(),
                    name: "y".into(),
                    arguments: json!({}),
                },
            ],
        ),
        Message::tool("done", "a"),
    ]);
    assert_eq!(state.answered_call_ids(), vec!["a".to_string()]);
}

#[test]
fn state_update_replaces_todos_and_merges_files() {
    let mut state = AgentState::new();
    state.todos.push(Todo {
        id: "1".into(),
        content: "old".into(),
        status: TodoStatus::InProgress,
    });
    state.files.insert(
        "/keep.txt".into(),
        FileData {
            content: "keep".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            modified_at: "2026-01-01T00:00:00Z".into(),
        },
    );
    state.files.insert(
        "/drop.txt".into(),
        FileData {
            content: "drop".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            modified_at: "2026-01-01T00:00:00Z".into(),
        },
    );

    let mut files = std::collections::BTreeMap::new();
    files.insert("/drop.txt".to_string(), None);
    files.insert(
        "/new.txt".to_string(),
        Some(FileData {
            content: "new".into(),
            created_at: "2026-01-02T00:00:00Z".into(),
            modified_at: "2026-01-02T00:00:00Z".into(),
        }),
    );
    let update = StateUpdate {
        todos: Some(vec![]),
        files: Some(files),
    };
    update.apply(&mut state);

    assert!(state.todos.is_empty());
    assert!(state.files.contains_key("/keep.txt"));
    assert!(state.files.contains_key("/new.txt"));
    assert!(!state.files.contains_key("/drop.txt"));
}

#[test]
fn resume_decision_serde_matches_wire_format() {
    let approve = serde_json::to_value(&HitlResponse::Approve).unwrap();
    assert_eq!(approve, json!("approve"));

    let edit = serde_json::to_value(&HitlResponse::Edit {
        new_args: json!({"env": "staging"}),
    })
    .unwrap();
    assert_eq!(edit, json!({"edit": {"new_args": {"env": "staging"}}}));

    let reject: HitlResponse =
        serde_json::from_value(json!({"reject": {"reason": "too risky"}})).unwrap();
    assert!(matches!(reject, HitlResponse::Reject { .. }));
}

#[test]
fn todo_status_parse() {
    assert_eq!(TodoStatus::parse("pending"), Some(TodoStatus::Pending));
    assert_eq!(TodoStatus::parse("in_progress"), Some(TodoStatus::InProgress));
    assert_eq!(TodoStatus::parse("completed"), Some(TodoStatus::Completed));
    assert_eq!(TodoStatus::parse("done"), None);
}
