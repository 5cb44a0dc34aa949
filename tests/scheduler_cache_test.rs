//! 调度与缓存的端到端场景

use std::sync::{Arc, Mutex};
use std::time::Duration;

use forager::cache::ToolCache;
use forager::core::{ExecutionContext, ToolCall};
use forager::scheduler::{plan_stages, DependencySpec, DependencyTable, Scheduler};
use forager::tools::{ToolExecutor, ToolRegistry};
use serde_json::json;

#[test]
fn test_issue_batch_staging() {
    let table = DependencyTable::new()
        .with("read-file", DependencySpec::default())
        .with("grep-search", DependencySpec::new(["issue-analysis"]))
        .with("issue-analysis", DependencySpec::default());
    let batch = vec![
        ToolCall::new("read-file"),
        ToolCall::new("grep-search"),
        ToolCall::new("issue-analysis"),
    ];
    let plan = plan_stages(&batch, &table).unwrap();
    let names: Vec<Vec<&str>> = plan
        .stages
        .iter()
        .map(|s| s.iter().map(|&i| batch[i].name.as_str()).collect())
        .collect();
    assert_eq!(names, vec![vec!["read-file", "issue-analysis"], vec!["grep-search"]]);
}

#[tokio::test]
async fn test_dispatch_runs_dependency_first() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ToolRegistry::new();
    for name in ["read-file", "grep-search", "issue-analysis"] {
        let log = Arc::clone(&log);
        registry.register_fn(name, "records", move |_| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name);
                Ok(json!(name))
            }
        });
    }
    let scheduler = Scheduler::new(Arc::new(ToolExecutor::new(registry, 1000)), 3);
    let calls = vec![
        ToolCall::new("read-file"),
        ToolCall::new("grep-search"),
        ToolCall::new("issue-analysis"),
    ];
    let results = scheduler.dispatch(&calls, &ExecutionContext::new("fix #1", ".")).await;
    assert_eq!(results.len(), 3);
    assert_eq!(log.lock().unwrap().last(), Some(&"grep-search"));
    // grep-search 的参数里注入了 issue-analysis 的成功结果
    let grep = &results[1];
    assert_eq!(grep.source_call.parameters["issue_context"], json!(["issue-analysis"]));
}

#[tokio::test(start_paused = true)]
async fn test_ttl_scenario() {
    let cache = ToolCache::new(["list-directory"], Duration::from_millis(1000), 16);
    let key = ToolCache::key("list-directory", &Default::default(), std::path::Path::new("/repo"), 1);
    cache.set(key.clone(), json!({"files": 3}));

    tokio::time::advance(Duration::from_millis(500)).await;
    assert_eq!(cache.get(&key), Some(json!({"files": 3})));

    tokio::time::advance(Duration::from_millis(1000)).await;
    assert_eq!(cache.get(&key), None);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_call_becomes_failed_result() {
    let mut registry = ToolRegistry::new();
    registry.register_fn("read-file", "hangs", |_| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(json!("late"))
    });
    registry.register_fn("list-directory", "fast", |_| async { Ok(json!(["src"])) });
    let scheduler = Scheduler::new(Arc::new(ToolExecutor::new(registry, 100)), 3);
    let calls = vec![ToolCall::new("read-file"), ToolCall::new("list-directory")];
    let results = scheduler.dispatch(&calls, &ExecutionContext::new("x", ".")).await;
    assert!(!results[0].success);
    assert!(results[0].error.as_deref().unwrap().contains("timeout"));
    assert!(results[1].success);
    assert_eq!(scheduler.stats().snapshot().timeouts, 1);
}

#[tokio::test]
async fn test_read_after_edit_across_sessions_is_fresh() {
    use forager::config::AppConfig;
    use forager::llm::MockLlmClient;
    use forager::Agent;

    let contents = Arc::new(Mutex::new("v1".to_string()));
    let mut registry = ToolRegistry::new();
    {
        let contents = Arc::clone(&contents);
        registry.register_fn("read-file", "reads", move |_| {
            let contents = Arc::clone(&contents);
            async move { Ok(json!(contents.lock().unwrap().clone())) }
        });
    }
    {
        let contents = Arc::clone(&contents);
        registry.register_fn("edit-file", "edits", move |_| {
            let contents = Arc::clone(&contents);
            async move {
                *contents.lock().unwrap() = "v2".to_string();
                Ok(json!("edited"))
            }
        });
    }
    let read = r#"{"tool": "read-file", "args": {"path": "a.rs"}}"#;
    let edit = r#"{"tool": "edit-file", "args": {"path": "a.rs"}}"#;
    let oracle = MockLlmClient::scripted([read, "first", edit, "second", read, "third"]);
    let agent = Agent::new(AppConfig::default(), registry, Arc::new(oracle));

    let first = agent.run("show a.rs", None).await;
    agent.run("edit a.rs", None).await;
    let third = agent.run("show a.rs", None).await;

    assert_eq!(first.tool_results[0].value, Some(json!("v1")));
    assert_eq!(third.tool_results[0].value, Some(json!("v2")));
    assert!(!third.tool_results[0].cached);
}
