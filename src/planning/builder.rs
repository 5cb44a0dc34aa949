//! 计划构建器
//!
//! 流畅 API 组装 ExecutionPlan。阶段只能依赖已添加的阶段，因此阶段图天然无环。

use std::collections::HashSet;

use thiserror::Error;

use crate::planning::types::*;

/// 构建错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanBuildError {
    #[error("Duplicate phase id: {0}")]
    DuplicatePhase(PhaseId),

    #[error("Phase {phase} depends on unknown or later phase {dependency}")]
    UnknownDependency { phase: PhaseId, dependency: PhaseId },

    #[error("Plan has no phases")]
    Empty,
}

/// 计划构建器
pub struct PlanBuilder {
    goal: String,
    complexity: ComplexityClass,
    phases: Vec<Phase>,
    risks: Vec<Risk>,
    files_to_touch: Vec<String>,
    validation_steps: Vec<String>,
    rollback: Option<RollbackStrategy>,
    error: Option<PlanBuildError>,
}

impl PlanBuilder {
    pub fn new(goal: impl Into<String>, complexity: ComplexityClass) -> Self {
        Self {
            goal: goal.into(),
            complexity,
            phases: Vec::new(),
            risks: Vec::new(),
            files_to_touch: Vec::new(),
            validation_steps: Vec::new(),
            rollback: None,
            error: None,
        }
    }

    /// 添加阶段；depends_on 中的每个 id 必须是已添加的阶段
    pub fn phase(
        mut self,
        id: impl Into<PhaseId>,
        name: impl Into<String>,
        depends_on: &[&str],
        calls: Vec<PlannedCall>,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        let id = id.into();
        let known: HashSet<&str> = self.phases.iter().map(|p| p.id.as_str()).collect();
        if known.contains(id.as_str()) {
            self.error = Some(PlanBuildError::DuplicatePhase(id));
            return self;
        }
        if let Some(dep) = depends_on.iter().find(|d| !known.contains(**d)) {
            self.error = Some(PlanBuildError::UnknownDependency {
                phase: id,
                dependency: dep.to_string(),
            });
            return self;
        }
        let estimated_duration_sec = calls.iter().map(|c| estimate_call_sec(&c.tool_name)).sum();
        self.phases.push(Phase {
            id,
            name: name.into(),
            calls,
            depends_on_phases: depends_on.iter().map(|d| d.to_string()).collect(),
            optional: false,
            estimated_duration_sec,
        });
        self
    }

    /// 将最近添加的阶段标记为可选
    pub fn optional(mut self) -> Self {
        if let Some(last) = self.phases.last_mut() {
            last.optional = true;
        }
        self
    }

    pub fn risk(mut self, description: impl Into<String>, mitigation: impl Into<String>) -> Self {
        self.risks.push(Risk {
            description: description.into(),
            mitigation: mitigation.into(),
        });
        self
    }

    pub fn files(mut self, files: Vec<String>) -> Self {
        self.files_to_touch = files;
        self
    }

    pub fn validation_step(mut self, step: impl Into<String>) -> Self {
        self.validation_steps.push(step.into());
        self
    }

    pub fn rollback(mut self, strategy: RollbackStrategy) -> Self {
        self.rollback = Some(strategy);
        self
    }

    pub fn build(self) -> Result<ExecutionPlan, PlanBuildError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.phases.is_empty() {
            return Err(PlanBuildError::Empty);
        }
        Ok(ExecutionPlan {
            id: format!("plan_{}", uuid::Uuid::new_v4()),
            goal: self.goal,
            complexity: self.complexity,
            estimated_duration_sec: self.phases.iter().map(|p| p.estimated_duration_sec).sum(),
            phases: self.phases,
            risks: self.risks,
            files_to_touch: self.files_to_touch,
            validation_steps: self.validation_steps,
            rollback: self.rollback,
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }
}

/// 粗略的单次调用耗时估计（秒）
fn estimate_call_sec(tool: &str) -> u64 {
    match tool {
        t if t.contains("diagnostic") || t.contains("test") => 30,
        t if t.contains("write") || t.contains("edit") => 10,
        t if t.contains("fetch") || t.contains("issue") => 8,
        t if t.contains("grep") || t.contains("search") || t.contains("context") => 5,
        _ => 3,
    }
}
