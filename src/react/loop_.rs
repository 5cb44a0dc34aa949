//! 轮次控制器（主循环）
//!
//! AwaitingOracle -> ParsingResponse -> ExecutingTools -> DecidingContinuation -> {Done | Failed}。
//! 同一时刻只有一轮在进行；第 N+1 轮必须等第 N 轮的继续判断完成。max_rounds 是硬上限。
//! 循环因启发式停止或达到上限结束后做一次合成：预言机调用次数仍小于 max_rounds 时交给预言机，
//! 否则（或预言机失败）在本地由结果摘要拼出回答，保证一次会话的预言机调用不超过 max_rounds。

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::{duration_ms, AgentError, ExecutionContext, ToolResult};
use crate::llm::LlmClient;
use crate::memory::{ConversationMemory, Message};
use crate::react::continuation::{ContinuationHeuristic, TaskProfile};
use crate::react::events::SessionEvent;
use crate::react::parser::parse_tool_calls;
use crate::react::playbook::{fallback_summary, Playbook};
use crate::scheduler::Scheduler;

/// 事件中预言机输出与工具结果的预览长度
const EVENT_PREVIEW_CHARS: usize = 200;

/// 单轮状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    AwaitingOracle,
    ParsingResponse,
    ExecutingTools,
    DecidingContinuation,
    Done,
    Failed,
}

/// 一次会话的结果
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// 最终回答；失败时为兜底摘要，不为空
    pub text: String,
    pub tool_results: Vec<ToolResult>,
    pub success: bool,
    pub rounds_used: usize,
    pub duration_ms: u64,
    pub error: Option<AgentError>,
}

/// 轮次控制器：持有预言机、playbook、调度器与继续启发式
pub struct RoundController {
    oracle: Arc<dyn LlmClient>,
    playbook: Arc<dyn Playbook>,
    scheduler: Arc<Scheduler>,
    heuristic: ContinuationHeuristic,
    history_window: usize,
    event_tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl RoundController {
    pub fn new(
        oracle: Arc<dyn LlmClient>,
        playbook: Arc<dyn Playbook>,
        scheduler: Arc<Scheduler>,
        heuristic: ContinuationHeuristic,
    ) -> Self {
        Self {
            oracle,
            playbook,
            scheduler,
            heuristic,
            history_window: 20,
            event_tx: None,
        }
    }

    pub fn with_history_window(mut self, turns: usize) -> Self {
        self.history_window = turns;
        self
    }

    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn max_rounds(&self) -> usize {
        self.heuristic.max_rounds
    }

    fn send_event(&self, ev: SessionEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn transition(&self, round: usize, state: RoundState) {
        tracing::debug!(round, state = ?state, "round state");
    }

    /// 运行一次会话；base 提供原始请求与工作目录，每轮据此新建 ExecutionContext
    pub async fn run(
        &self,
        input: &str,
        base: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let start = Instant::now();
        let max_rounds = self.heuristic.max_rounds;
        let profile = TaskProfile::detect(input);
        let mut history = ConversationMemory::new(self.history_window);
        let mut all_results: Vec<ToolResult> = Vec::new();
        let mut oracle_calls = 0usize;
        let mut rounds_used = 0usize;
        let mut last_raw = String::new();

        tracing::info!(max_rounds, profile = ?profile, "session started");

        for round in 1..=max_rounds {
            if cancel.is_cancelled() {
                return self.fail(AgentError::Cancelled, all_results, rounds_used, start);
            }
            rounds_used = round;
            self.send_event(SessionEvent::RoundStarted { round, max_rounds });

            self.transition(round, RoundState::AwaitingOracle);
            let ctx = base.for_round(round, &all_results);
            let messages =
                self.playbook
                    .build_messages(input, &ctx, &all_results, round, &history.messages());
            oracle_calls += 1;
            let raw = match self.consult(&messages, cancel).await {
                Ok(raw) => raw,
                Err(e) => return self.fail(e, all_results, rounds_used, start),
            };
            self.send_event(SessionEvent::OracleResponse {
                round,
                preview: raw.chars().take(EVENT_PREVIEW_CHARS).collect(),
            });

            self.transition(round, RoundState::ParsingResponse);
            let calls = match parse_tool_calls(&raw) {
                Ok(calls) => calls,
                Err(e) => return self.fail(e, all_results, rounds_used, start),
            };
            if calls.is_empty() {
                self.transition(round, RoundState::Done);
                return self.finish(raw, all_results, rounds_used, start);
            }

            self.transition(round, RoundState::ExecutingTools);
            self.send_event(SessionEvent::ToolCalls {
                round,
                tools: calls.iter().map(|c| c.name.clone()).collect(),
            });
            let results = self.scheduler.dispatch(&calls, &ctx).await;
            for r in &results {
                self.send_event(SessionEvent::ToolResult {
                    round,
                    tool: r.tool_name().to_string(),
                    success: r.success,
                    cached: r.cached,
                    preview: r.summary_line(EVENT_PREVIEW_CHARS),
                });
            }
            history.record_round(&raw, &results);
            all_results.extend(results.iter().cloned());
            last_raw = raw;

            self.transition(round, RoundState::DecidingContinuation);
            let decision = self.heuristic.decide(&results, round, &all_results, profile);
            tracing::info!(
                round,
                should_continue = decision.should_continue,
                rule = decision.rule,
                "continuation decided"
            );
            self.send_event(SessionEvent::Continuation {
                round,
                should_continue: decision.should_continue,
                rule: decision.rule.to_string(),
            });
            if !decision.should_continue {
                break;
            }
        }

        let text = self
            .synthesize(input, &last_raw, &all_results, rounds_used, oracle_calls, cancel)
            .await;
        self.finish(text, all_results, rounds_used, start)
    }

    /// 调用预言机；取消令牌先触发则返回 Cancelled
    async fn consult(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            reply = self.oracle.complete(messages) => reply.map_err(AgentError::LlmError),
        }
    }

    async fn synthesize(
        &self,
        input: &str,
        last_raw: &str,
        all_results: &[ToolResult],
        rounds_used: usize,
        oracle_calls: usize,
        cancel: &CancellationToken,
    ) -> String {
        let via_oracle = oracle_calls < self.heuristic.max_rounds;
        self.send_event(SessionEvent::Synthesis { via_oracle });
        if via_oracle {
            let messages = self
                .playbook
                .synthesis_messages(input, last_raw, all_results, rounds_used);
            match self.consult(&messages, cancel).await {
                Ok(text) if !text.trim().is_empty() => return text,
                Ok(_) => tracing::warn!("oracle returned an empty synthesis, composing locally"),
                Err(e) => tracing::warn!(error = %e, "synthesis failed, composing locally"),
            }
        }
        fallback_summary(all_results)
    }

    fn finish(
        &self,
        text: String,
        tool_results: Vec<ToolResult>,
        rounds_used: usize,
        start: Instant,
    ) -> RunOutcome {
        let duration_ms = duration_ms(start.elapsed());
        tracing::info!(rounds_used, results = tool_results.len(), duration_ms, "session done");
        self.send_event(SessionEvent::Done {
            rounds_used,
            success: true,
        });
        RunOutcome {
            text,
            tool_results,
            success: true,
            rounds_used,
            duration_ms,
            error: None,
        }
    }

    fn fail(
        &self,
        error: AgentError,
        tool_results: Vec<ToolResult>,
        rounds_used: usize,
        start: Instant,
    ) -> RunOutcome {
        self.transition(rounds_used, RoundState::Failed);
        tracing::warn!(error = %error, rounds_used, "session failed");
        self.send_event(SessionEvent::Error {
            text: error.to_string(),
        });
        self.send_event(SessionEvent::Done {
            rounds_used,
            success: false,
        });
        RunOutcome {
            text: format!("{error}\n\n{}", fallback_summary(&tool_results)),
            tool_results,
            success: false,
            rounds_used,
            duration_ms: duration_ms(start.elapsed()),
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::react::continuation::BucketClassifier;
    use crate::react::playbook::DefaultPlaybook;
    use crate::tools::{ToolExecutor, ToolRegistry};
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_fn("read-file", "reads", |_| async { Ok(json!("fn main() {}")) });
        registry.register_fn("grep-search", "searches", |_| async { Ok(json!(["src/main.rs:1"])) });
        registry.register_fn("broken", "always fails", |_| async { Err("disk on fire".to_string()) });
        registry
    }

    fn controller(oracle: Arc<MockLlmClient>, max_rounds: usize) -> RoundController {
        let scheduler = Arc::new(Scheduler::new(Arc::new(ToolExecutor::new(registry(), 1000)), 3));
        RoundController::new(
            oracle,
            Arc::new(DefaultPlaybook::default()),
            scheduler,
            ContinuationHeuristic::new(max_rounds, 2, BucketClassifier::default()),
        )
    }

    #[tokio::test]
    async fn test_plain_answer_ends_in_one_round() {
        let oracle = Arc::new(MockLlmClient::scripted(["It is a hello-world program."]));
        let out = controller(Arc::clone(&oracle), 5)
            .run("what is this", &ExecutionContext::new("what is this", "."), &CancellationToken::new())
            .await;
        assert!(out.success);
        assert_eq!(out.text, "It is a hello-world program.");
        assert_eq!(out.rounds_used, 1);
        assert_eq!(oracle.call_count(), 1);
    }

    #[tokio::test]
    async fn test_tools_then_synthesis() {
        let oracle = Arc::new(MockLlmClient::scripted([
            r#"{"tool_calls": [{"tool": "read-file", "args": {"path": "src/main.rs"}}]}"#,
            r#"{"tool": "grep-search", "args": {"pattern": "main"}}"#,
            "Final: main is defined in src/main.rs",
        ]));
        let out = controller(Arc::clone(&oracle), 5)
            .run("hello", &ExecutionContext::new("hello", "."), &CancellationToken::new())
            .await;
        assert!(out.success);
        // 第 2 轮达到最小调查深度后，General 任务没有必需桶，停止并合成
        assert_eq!(out.rounds_used, 2);
        assert_eq!(out.text, "Final: main is defined in src/main.rs");
        assert_eq!(out.tool_results.len(), 2);
        assert!(out.tool_results.windows(2).all(|w| w[0].round <= w[1].round));
        assert_eq!(oracle.call_count(), 3);
    }

    #[tokio::test]
    async fn test_parse_failure_returns_fallback_summary() {
        let oracle = Arc::new(MockLlmClient::scripted([r#"{"tool": "read-file", "args": }"#]));
        let out = controller(oracle, 5)
            .run("x", &ExecutionContext::new("x", "."), &CancellationToken::new())
            .await;
        assert!(!out.success);
        assert!(matches!(out.error, Some(AgentError::ParseError(_))));
        assert!(!out.text.is_empty());
    }

    #[tokio::test]
    async fn test_oracle_failure_is_session_failure() {
        let oracle = Arc::new(MockLlmClient::new().then_fail("503"));
        let out = controller(oracle, 5)
            .run("x", &ExecutionContext::new("x", "."), &CancellationToken::new())
            .await;
        assert!(!out.success);
        assert_eq!(out.error, Some(AgentError::LlmError("503".to_string())));
    }

    #[tokio::test]
    async fn test_ceiling_uses_local_synthesis() {
        let oracle = Arc::new(MockLlmClient::repeating(r#"{"tool": "read-file"}"#));
        let out = controller(Arc::clone(&oracle), 2)
            .run("review the code", &ExecutionContext::new("review the code", "."), &CancellationToken::new())
            .await;
        assert_eq!(out.rounds_used, 2);
        assert_eq!(oracle.call_count(), 2);
        assert!(out.text.contains("read-file"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_round() {
        let oracle = Arc::new(MockLlmClient::repeating("never"));
        let token = CancellationToken::new();
        token.cancel();
        let out = controller(Arc::clone(&oracle), 3)
            .run("x", &ExecutionContext::new("x", "."), &token)
            .await;
        assert_eq!(out.error, Some(AgentError::Cancelled));
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let oracle = Arc::new(MockLlmClient::scripted([r#"{"tool": "broken"}"#, "done"]));
        let out = controller(oracle, 3)
            .with_event_tx(tx)
            .run("x", &ExecutionContext::new("x", "."), &CancellationToken::new())
            .await;
        assert_eq!(out.rounds_used, 1);
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(serde_json::to_value(&ev).unwrap()["type"].as_str().unwrap().to_string());
        }
        assert_eq!(kinds.first().map(String::as_str), Some("round_started"));
        assert!(kinds.contains(&"continuation".to_string()));
        assert_eq!(kinds.last().map(String::as_str), Some("done"));
    }
}
