//! 规划引擎：意图识别 -> 第 0 轮信息收集 -> 复杂度分级 -> 合成阶段
//!
//! simple：一个阶段（按优先级挑主工具，都未注册时退化为 context-analysis）+ 一条校验步骤。
//! medium/complex：Analysis -> Modification -> Validation，依次依赖上一阶段；附风险与「先备份后恢复」回滚。
//! 注册了 create-backup 时它作为 Modification 的第一步（依赖表保证编辑在其成功之后才派发）；
//! 未注册时只依赖编辑调用自身的 backup 标志。

use std::sync::Arc;

use crate::config::PlanningSection;
use crate::core::{AgentError, ExecutionContext, ToolResult};
use crate::planning::builder::{PlanBuildError, PlanBuilder};
use crate::planning::complexity::ComplexityScore;
use crate::planning::intent::DetectedIntent;
use crate::planning::types::{ComplexityClass, ExecutionPlan, PlannedCall, RollbackStrategy};
use crate::scheduler::Scheduler;

/// 任何意图都不匹配时的通用工具
pub const GENERIC_TOOL: &str = "context-analysis";

const BACKUP_TOOL: &str = "create-backup";

pub struct PlanningEngine {
    scheduler: Arc<Scheduler>,
    thresholds: PlanningSection,
}

impl PlanningEngine {
    pub fn new(scheduler: Arc<Scheduler>, thresholds: PlanningSection) -> Self {
        Self {
            scheduler,
            thresholds,
        }
    }

    fn is_registered(&self, name: &str) -> bool {
        self.scheduler.executor().has_tool(name)
    }

    /// 生成执行计划；收集阶段的单次失败不影响规划
    pub async fn create_plan(
        &self,
        input: &str,
        base: &ExecutionContext,
    ) -> Result<ExecutionPlan, AgentError> {
        let intent = DetectedIntent::detect(input);
        let calls = intent.gathering_calls(|n| self.is_registered(n));
        let gathered = self.scheduler.dispatch(&calls, &base.for_round(0, &[])).await;

        let score = ComplexityScore::compute(input, &intent, &gathered);
        let complexity = score.classify(&self.thresholds);
        tracing::info!(
            score = score.total(),
            complexity = %complexity,
            gathered = gathered.len(),
            "classified task"
        );

        let plan = match complexity {
            ComplexityClass::Simple => self.simple_plan(input, &intent),
            _ => self.phased_plan(input, &intent, complexity, &gathered),
        }
        .map_err(|e| AgentError::PlanValidation {
            phase: "build".to_string(),
            failed_calls: vec![e.to_string()],
        })?;

        tracing::info!(plan_id = %plan.id, phases = plan.phases.len(), "plan created");
        Ok(plan)
    }

    /// 主工具：优先级列表中第一个已注册的，否则 context-analysis
    fn primary_tool(&self, intent: &DetectedIntent) -> &'static str {
        intent
            .primary_candidates()
            .into_iter()
            .find(|t| self.is_registered(t))
            .unwrap_or(GENERIC_TOOL)
    }

    fn primary_call(&self, tool: &'static str, input: &str, intent: &DetectedIntent) -> PlannedCall {
        let call = PlannedCall::new(tool, "Answer the request directly");
        let call = match tool {
            "issue-analysis" => call.param("issue_number", intent.issue_numbers.first().copied().unwrap_or_default()),
            "read-file" => call.param("path", intent.file_references.first().cloned().unwrap_or_default()),
            "grep-search" => call.param("pattern", intent.symbols.first().cloned().unwrap_or_default()),
            "fetch-url" => call.param("url", intent.urls.first().cloned().unwrap_or_default()),
            "list-directory" => call.param("path", "."),
            _ => call.param("request", input),
        };
        if tool == GENERIC_TOOL {
            call
        } else {
            call.fallback(GENERIC_TOOL)
        }
    }

    fn simple_plan(
        &self,
        input: &str,
        intent: &DetectedIntent,
    ) -> Result<ExecutionPlan, PlanBuildError> {
        let tool = self.primary_tool(intent);
        let call = self
            .primary_call(tool, input, intent)
            .expecting("Relevant information for the request");
        PlanBuilder::new(input, ComplexityClass::Simple)
            .phase("execute", "Execute", &[], vec![call])
            .files(intent.file_references.clone())
            .validation_step(format!("Check that {tool} returned a usable result"))
            .build()
    }

    fn phased_plan(
        &self,
        input: &str,
        intent: &DetectedIntent,
        complexity: ComplexityClass,
        gathered: &[ToolResult],
    ) -> Result<ExecutionPlan, PlanBuildError> {
        let files = &intent.file_references;
        let dry_run = complexity == ComplexityClass::Complex;

        let mut analysis = Vec::new();
        if let Some(n) = intent.issue_numbers.first() {
            analysis.push(
                PlannedCall::new("issue-analysis", "Understand the reported problem")
                    .param("issue_number", *n)
                    .expecting("Issue summary and acceptance criteria")
                    .fallback(GENERIC_TOOL),
            );
        }
        for f in files {
            analysis.push(
                PlannedCall::new("read-file", format!("Read {f} before editing"))
                    .param("path", f.as_str())
                    .expecting("Current file contents")
                    .fallback(GENERIC_TOOL),
            );
        }
        for s in &intent.symbols {
            analysis.push(
                PlannedCall::new("grep-search", format!("Locate usages of {s}"))
                    .param("pattern", s.as_str())
                    .expecting("Call sites")
                    .fallback(GENERIC_TOOL),
            );
        }
        if analysis.is_empty() {
            analysis.push(
                PlannedCall::new(GENERIC_TOOL, "Survey the codebase for the request")
                    .param("request", input)
                    .expecting("Relevant files and entry points"),
            );
        }

        let backup_tool = self.is_registered(BACKUP_TOOL);
        let mut modification = Vec::new();
        if backup_tool {
            modification.push(
                PlannedCall::new(BACKUP_TOOL, "Snapshot files before editing")
                    .param("files", files.clone())
                    .expecting("Backup id"),
            );
        }
        if files.is_empty() {
            modification.push(
                PlannedCall::new("edit-file", "Apply the change")
                    .param("request", input)
                    .param("backup", true)
                    .param("dry_run", dry_run)
                    .fallback("write-file"),
            );
        } else {
            for f in files {
                modification.push(
                    PlannedCall::new("edit-file", format!("Apply the change to {f}"))
                        .param("path", f.as_str())
                        .param("backup", true)
                        .param("dry_run", dry_run)
                        .expecting("Edited file")
                        .fallback("write-file"),
                );
            }
        }

        let validation = vec![PlannedCall::new("run-diagnostics", "Check the build after edits")
            .expecting("No new errors")
            .fallback(GENERIC_TOOL)];

        let mut builder = PlanBuilder::new(input, complexity)
            .phase("analysis", "Analysis", &[], analysis)
            .phase("modification", "Modification", &["analysis"], modification)
            .phase("validation", "Validation", &["modification"], validation)
            .files(files.clone())
            .validation_step("Diagnostics report no new errors")
            .validation_step("Edited files match the analysis findings")
            .risk(
                "Edits may break the build or change behavior",
                "Validation phase runs diagnostics; restore from backup on failure",
            )
            .rollback(RollbackStrategy {
                description: "Restore edited files from the backup taken before modification".to_string(),
                steps: vec![
                    if backup_tool {
                        "Locate the backup created by create-backup".to_string()
                    } else {
                        "Locate the per-file backups written by the edit tool".to_string()
                    },
                    "Restore every file in files_to_touch from the backup".to_string(),
                    "Re-run diagnostics to confirm the original state".to_string(),
                ],
            });

        if complexity == ComplexityClass::Complex {
            builder = builder.risk(
                format!("Wide change touching {} file(s)", files.len().max(1)),
                "Edits run as dry-run first; review the diff before applying",
            );
        }
        if gathered.iter().any(|r| !r.success) {
            builder = builder.risk(
                "Some information gathering failed; the plan may miss context",
                "Review analysis-phase output before confirming modification",
            );
        }
        builder.build()
    }
}
