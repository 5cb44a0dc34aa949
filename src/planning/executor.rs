//! 计划执行器
//!
//! 阶段严格按声明顺序执行，不做跨阶段并行。每个阶段：PlannedCall -> ToolCall（取第一个已注册的工具），
//! 带着累计历史经调度器派发，然后校验：任何失败都立即中止整个计划，后续阶段的调用不会被派发。
//! 阶段内部同样按依赖分阶段推进，某一步失败后本阶段剩余的调用也不再派发（如备份失败则不编辑）。

use std::sync::Arc;
use std::time::Instant;

use crate::core::{duration_ms, AgentError, ExecutionContext, ToolCall, ToolResult};
use crate::planning::types::{ExecutionPlan, Phase, RollbackStrategy};
use crate::react::fallback_summary;
use crate::scheduler::Scheduler;

/// 报告中单个结果的预览长度
const REPORT_PREVIEW_CHARS: usize = 300;

/// 计划执行结果
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan_id: String,
    pub success: bool,
    /// 全部已执行调用的结果（按阶段顺序）
    pub results: Vec<ToolResult>,
    pub report: String,
    pub failed_phase: Option<String>,
    /// 失败时附带计划声明的回滚建议
    pub rollback: Option<RollbackStrategy>,
    pub error: Option<AgentError>,
    pub duration_ms: u64,
}

pub struct PlanExecutor {
    scheduler: Arc<Scheduler>,
}

impl PlanExecutor {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    pub async fn execute_plan(&self, plan: &ExecutionPlan, base: &ExecutionContext) -> PlanOutcome {
        let start = Instant::now();
        let mut history: Vec<ToolResult> = Vec::new();
        tracing::info!(plan_id = %plan.id, phases = plan.phases.len(), "executing plan");

        for (index, phase) in plan.phases.iter().enumerate() {
            // 计划阶段的轮次从 1 开始，收集阶段占用第 0 轮
            let round = index + 1;
            let (calls, unresolved) = self.resolve_phase(phase, round);

            let phase_results = if unresolved.is_empty() {
                let ctx = base.for_round(round, &history);
                self.scheduler.dispatch_until_failure(&calls, &ctx).await
            } else {
                unresolved
            };

            let failed: Vec<String> = phase_results
                .iter()
                .filter(|r| !r.success)
                .map(|r| {
                    format!(
                        "{}: {}",
                        r.tool_name(),
                        r.error.as_deref().unwrap_or("unknown error")
                    )
                })
                .collect();
            history.extend(phase_results);

            if !failed.is_empty() {
                tracing::warn!(
                    plan_id = %plan.id,
                    phase = %phase.id,
                    failed = failed.len(),
                    "phase validation failed, aborting plan"
                );
                let error = AgentError::PlanValidation {
                    phase: phase.id.clone(),
                    failed_calls: failed,
                };
                let report = failure_report(plan, phase, &error, &history);
                return PlanOutcome {
                    plan_id: plan.id.clone(),
                    success: false,
                    results: history,
                    report,
                    failed_phase: Some(phase.id.clone()),
                    rollback: plan.rollback.clone(),
                    error: Some(error),
                    duration_ms: duration_ms(start.elapsed()),
                };
            }
            tracing::info!(plan_id = %plan.id, phase = %phase.id, "phase completed");
        }

        PlanOutcome {
            plan_id: plan.id.clone(),
            success: true,
            report: success_report(plan, &history),
            results: history,
            failed_phase: None,
            rollback: None,
            error: None,
            duration_ms: duration_ms(start.elapsed()),
        }
    }

    /// 解析阶段内所有调用；任一无法解析时，整个阶段以失败结果代替派发
    fn resolve_phase(&self, phase: &Phase, round: usize) -> (Vec<ToolCall>, Vec<ToolResult>) {
        let executor = self.scheduler.executor();
        let mut calls = Vec::with_capacity(phase.calls.len());
        let mut unresolved = Vec::new();
        for planned in &phase.calls {
            match planned.resolve(|name| executor.has_tool(name)) {
                Some(call) => calls.push(call),
                None => {
                    let error = AgentError::ToolNotFound {
                        name: planned.tool_name.clone(),
                        available: executor.tool_names(),
                    };
                    unresolved.push(ToolResult::failed(
                        ToolCall {
                            name: planned.tool_name.clone(),
                            parameters: planned.parameters.clone(),
                        },
                        error.to_string(),
                        0,
                        round,
                    ));
                }
            }
        }
        (calls, unresolved)
    }
}

fn success_report(plan: &ExecutionPlan, history: &[ToolResult]) -> String {
    let mut out = format!(
        "Plan {} completed: {} phase(s), {} call(s).\nGoal: {}\n",
        plan.id,
        plan.phases.len(),
        history.len(),
        plan.goal
    );
    for (index, phase) in plan.phases.iter().enumerate() {
        out.push_str(&format!("\n## {}\n", phase.name));
        for r in history.iter().filter(|r| r.round == index + 1) {
            out.push_str(&format!("- {}\n", r.summary_line(REPORT_PREVIEW_CHARS)));
        }
    }
    out
}

fn failure_report(
    plan: &ExecutionPlan,
    phase: &Phase,
    error: &AgentError,
    history: &[ToolResult],
) -> String {
    let mut out = format!(
        "Plan {} aborted in phase '{}': {}\n",
        plan.id, phase.name, error
    );
    match plan.rollback {
        Some(ref rb) => {
            out.push_str(&format!("\nSuggested rollback: {}\n", rb.description));
            for (i, step) in rb.steps.iter().enumerate() {
                out.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }
        None => out.push_str("\nNo rollback declared for this plan.\n"),
    }
    out.push('\n');
    out.push_str(&fallback_summary(history));
    out
}
