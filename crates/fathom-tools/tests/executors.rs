use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fathom_core::{FathomError, Tool};
use fathom_tools::{ParallelToolExecutor, SerialToolExecutor, ToolRegistry};
use serde_json::{json, Value};

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Echo the input back"
    }

    async fn call(&self, args: Value) -> Result<Value, FathomError> {
        Ok(args)
    }
}

/// Sleeps for the requested number of milliseconds, then returns its tag.
struct SleepTool {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &'static str {
        "sleep"
    }

    fn description(&self) -> &'static str {
        "Sleep then answer"
    }

    async fn call(&self, args: Value) -> Result<Value, FathomError> {
        let ms = args["ms"].as_u64().unwrap_or(0);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(args["tag"].clone())
    }
}

#[tokio::test]
async fn serial_executor_dispatches_by_name() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool)).unwrap();

    let executor = SerialToolExecutor::new(registry);
    let result = executor.execute("echo", json!({"x": 1})).await.unwrap();
    assert_eq!(result, json!({"x": 1}));
}

#[tokio::test]
async fn serial_executor_unknown_tool_errors() {
    let executor = SerialToolExecutor::new(ToolRegistry::new());
    let err = executor.execute("nope", json!({})).await.unwrap_err();
    assert!(matches!(err, FathomError::ToolNotFound(_)));
}

#[tokio::test]
async fn parallel_executor_preserves_input_order() {
    let registry = ToolRegistry::new();
    registry
        .register(Arc::new(SleepTool {
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }))
        .unwrap();

    let executor = ParallelToolExecutor::new(registry, 4);
    // The first call sleeps longest; results must still come back first.
    let results = executor
        .execute_all(vec![
            ("sleep".into(), json!({"ms": 50, "tag": "slow"})),
            ("sleep".into(), json!({"ms": 1, "tag": "fast"})),
            ("sleep".into(), json!({"ms": 10, "tag": "mid"})),
        ])
        .await;

    let tags: Vec<&str> = results
        .iter()
        .map(|r| r.as_ref().unwrap().as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["slow", "fast", "mid"]);
}

#[tokio::test]
async fn parallel_executor_bounds_concurrency() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::new();
    registry
        .register(Arc::new(SleepTool {
            running: running.clone(),
            peak: peak.clone(),
        }))
        .unwrap();

    let executor = ParallelToolExecutor::new(registry, 2);
    let calls = (0..6)
        .map(|i| ("sleep".to_string(), json!({"ms": 20, "tag": i})))
        .collect();
    let results = executor.execute_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(
        peak.load(Ordering::SeqCst) <= 2,
        "at most 2 calls should run at once, saw {}",
        peak.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn parallel_executor_unknown_tool_yields_err_in_place() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool)).unwrap();

    let executor = ParallelToolExecutor::new(registry, 2);
    let results = executor
        .execute_all(vec![
            ("echo".into(), json!(1)),
            ("ghost".into(), json!(2)),
            ("echo".into(), json!(3)),
        ])
        .await;

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(FathomError::ToolNotFound(_))));
    assert!(results[2].is_ok());
}
