use std::collections::HashMap;

use fathom_core::{AgentState, DecisionKind, HitlResponse, ToolCall};
use fathom_middleware::{
    AgentMiddleware, HumanInTheLoopMiddleware, InterruptOnConfig, ToolGate,
};
use serde_json::json;

fn make_call(name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall {
        id: "tc-1".to_string(),
        name: name.to_string(),
        arguments: args,
    }
}

fn state_with_ids() -> AgentState {
    let mut state = AgentState::new();
    state.thread_id = "thread-1".into();
    state.run_id = "run-1".into();
    state
}

#[tokio::test]
async fn unlisted_tool_passes_without_approval() {
    let mw = HumanInTheLoopMiddleware::for_tools(vec!["deploy".to_string()]);
    let state = state_with_ids();
    let mut call = make_call("search", json!({}));

    let gate = mw.before_tool_call(&state, &mut call).await.unwrap();
    assert!(matches!(gate, ToolGate::Continue));
}

#[tokio::test]
async fn listed_tool_without_decision_suspends() {
    let mw = HumanInTheLoopMiddleware::for_tools(vec!["deploy".to_string()]);
    let state = state_with_ids();
    let mut call = make_call("deploy", json!({"env": "prod"}));

    let gate = mw.before_tool_call(&state, &mut call).await.unwrap();
    let ToolGate::Suspend(descriptor) = gate else {
        panic!("expected suspension");
    };
    assert_eq!(descriptor.kind, "tool_approval");
    assert_eq!(descriptor.call.name, "deploy");
    assert_eq!(descriptor.thread_id, "thread-1");
    assert_eq!(descriptor.run_id, "run-1");
    assert_eq!(descriptor.allowed_decisions.len(), 3);
}

#[tokio::test]
async fn approve_decision_proceeds() {
    let mw = HumanInTheLoopMiddleware::for_tools(vec!["deploy".to_string()]);
    let mut state = state_with_ids();
    state
        .resume_decisions
        .insert("tc-1".into(), HitlResponse::Approve);
    let mut call = make_call("deploy", json!({"env": "prod"}));

    let gate = mw.before_tool_call(&state, &mut call).await.unwrap();
    assert!(matches!(gate, ToolGate::Continue));
    assert_eq!(call.arguments, json!({"env": "prod"}));
}

#[tokio::test]
async fn edit_decision_rewrites_arguments() {
    let mw = HumanInTheLoopMiddleware::for_tools(vec!["deploy".to_string()]);
    let mut state = state_with_ids();
    state.resume_decisions.insert(
        "tc-1".into(),
        HitlResponse::Edit {
            new_args: json!({"env": "staging"}),
        },
    );
    let mut call = make_call("deploy", json!({"env": "prod"}));

    let gate = mw.before_tool_call(&state, &mut call).await.unwrap();
    assert!(matches!(gate, ToolGate::Continue));
    assert_eq!(call.arguments, json!({"env": "staging"}));
}

#[tokio::test]
async fn reject_decision_short_circuits_with_rejected_status() {
    let mw = HumanInTheLoopMiddleware::for_tools(vec!["deploy".to_string()]);
    let mut state = state_with_ids();
    state.resume_decisions.insert(
        "tc-1".into(),
        HitlResponse::Reject {
            reason: "not today".into(),
        },
    );
    let mut call = make_call("deploy", json!({"env": "prod"}));

    let gate = mw.before_tool_call(&state, &mut call).await.unwrap();
    let ToolGate::ReplaceResult(payload) = gate else {
        panic!("expected replacement result");
    };
    assert_eq!(payload["status"], "rejected");
    assert_eq!(payload["reason"], "not today");
}

#[tokio::test]
async fn disallowed_decision_kind_is_a_validation_error() {
    let mut config = HashMap::new();
    config.insert(
        "deploy".to_string(),
        InterruptOnConfig::allowing(vec![DecisionKind::Approve, DecisionKind::Reject]),
    );
    let mw = HumanInTheLoopMiddleware::new(config);

    let mut state = state_with_ids();
    state.resume_decisions.insert(
        "tc-1".into(),
        HitlResponse::Edit {
            new_args: json!({}),
        },
    );
    let mut call = make_call("deploy", json!({}));

    let err = mw.before_tool_call(&state, &mut call).await.unwrap_err();
    assert!(err.to_string().contains("not allowed"));
}

#[tokio::test]
async fn decision_is_consumed_after_the_call() {
    let mw = HumanInTheLoopMiddleware::for_tools(vec!["deploy".to_string()]);
    let mut state = state_with_ids();
    state
        .resume_decisions
        .insert("tc-1".into(), HitlResponse::Approve);
    let call = make_call("deploy", json!({}));

    mw.after_tool_call(&mut state, &call, json!("done"))
        .await
        .unwrap();
    assert!(state.resume_decisions.is_empty());
}
