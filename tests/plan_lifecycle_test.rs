//! 计划生命周期：创建、查看修改菜单、替换、确认执行、阶段失败中止

use std::sync::{Arc, Mutex};

use forager::config::AppConfig;
use forager::llm::MockLlmClient;
use forager::planning::ComplexityClass;
use forager::tools::ToolRegistry;
use forager::{Agent, AgentError};
use serde_json::json;

const REQUEST: &str = "fix issue #12 in src/parser.rs and refactor the api across modules";

fn registry(log: Arc<Mutex<Vec<String>>>, failing: &'static str) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for name in [
        "issue-analysis",
        "read-file",
        "grep-search",
        "create-backup",
        "edit-file",
        "run-diagnostics",
        "context-analysis",
    ] {
        let log = Arc::clone(&log);
        registry.register_fn(name, "test tool", move |_| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name.to_string());
                if name == failing {
                    Err(format!("{name} failed"))
                } else {
                    Ok(json!(format!("{name} ok")))
                }
            }
        });
    }
    registry
}

fn agent(log: Arc<Mutex<Vec<String>>>, failing: &'static str) -> Agent {
    Agent::new(AppConfig::default(), registry(log, failing), Arc::new(MockLlmClient::new()))
}

#[tokio::test]
async fn test_create_modify_replace_confirm() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut agent = agent(Arc::clone(&log), "");

    let first = agent.create_plan(REQUEST, None).await.unwrap();
    assert_eq!(first.complexity, ComplexityClass::Complex);
    assert_eq!(first.phases.len(), 3);

    let menu = agent.request_modification().unwrap();
    assert_eq!(menu.plan_id, first.id);
    assert!(!menu.options.is_empty());
    assert_eq!(agent.current_plan(), Some(&first));

    let second = agent.create_plan(REQUEST, None).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(agent.current_plan().map(|p| p.id.as_str()), Some(second.id.as_str()));

    log.lock().unwrap().clear();
    let outcome = agent.confirm_plan().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.plan_id, second.id);
    assert!(outcome.report.contains("Validation"));
    assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("run-diagnostics"));
    assert!(agent.current_plan().is_none());
    assert_eq!(agent.confirm_plan().await.unwrap_err(), AgentError::NoActivePlan);
}

#[tokio::test]
async fn test_failed_phase_blocks_later_phases() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut agent = agent(Arc::clone(&log), "create-backup");
    agent.create_plan(REQUEST, None).await.unwrap();
    log.lock().unwrap().clear();

    let outcome = agent.confirm_plan().await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.failed_phase.as_deref(), Some("modification"));
    assert!(outcome.rollback.is_some());
    let ran = log.lock().unwrap().clone();
    assert!(ran.iter().any(|n| n == "create-backup"));
    assert!(!ran.iter().any(|n| n == "edit-file"));
    assert!(!ran.iter().any(|n| n == "run-diagnostics"));
    assert!(outcome.results.iter().all(|r| r.round <= 2));
    assert!(outcome.results.iter().all(|r| r.tool_name() != "edit-file"));
    assert!(agent.current_plan().is_none());
}

#[tokio::test]
async fn test_plan_without_backup_tool_still_runs() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ToolRegistry::new();
    for name in ["issue-analysis", "read-file", "edit-file", "run-diagnostics", "context-analysis"] {
        let log = Arc::clone(&log);
        registry.register_fn(name, "test tool", move |_| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name.to_string());
                Ok(json!(format!("{name} ok")))
            }
        });
    }
    let mut agent = Agent::new(AppConfig::default(), registry, Arc::new(MockLlmClient::new()));
    let plan = agent.create_plan(REQUEST, None).await.unwrap();
    assert!(plan.complexity >= ComplexityClass::Medium);

    let outcome = agent.confirm_plan().await.unwrap();
    assert!(outcome.success, "{}", outcome.report);
    assert!(log.lock().unwrap().iter().any(|n| n == "edit-file"));
}

#[tokio::test]
async fn test_cancel_discards_plan() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut agent = agent(log, "");
    let plan = agent.create_plan("show README.md", None).await.unwrap();
    assert_eq!(plan.complexity, ComplexityClass::Simple);
    assert_eq!(agent.cancel_plan().unwrap().id, plan.id);
    assert_eq!(agent.request_modification().unwrap_err(), AgentError::NoActivePlan);
}
