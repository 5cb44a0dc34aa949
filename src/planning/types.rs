//! 计划类型定义
//!
//! ExecutionPlan / Phase / PlannedCall，以及复杂度、风险、回滚策略。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ToolCall;

pub type PlanId = String;
pub type PhaseId = String;

/// 复杂度分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityClass {
    Simple,
    Medium,
    Complex,
}

impl std::fmt::Display for ComplexityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ComplexityClass::Simple => "simple",
            ComplexityClass::Medium => "medium",
            ComplexityClass::Complex => "complex",
        };
        f.write_str(s)
    }
}

/// 计划中的一次调用；执行时解析为第一个已注册的 [tool_name] ++ fallbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedCall {
    pub tool_name: String,
    pub parameters: Map<String, Value>,
    pub purpose: String,
    pub expected_outcome: String,
    pub fallbacks: Vec<String>,
}

impl PlannedCall {
    pub fn new(tool_name: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: Map::new(),
            purpose: purpose.into(),
            expected_outcome: String::new(),
            fallbacks: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn expecting(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = outcome.into();
        self
    }

    pub fn fallback(mut self, tool: impl Into<String>) -> Self {
        self.fallbacks.push(tool.into());
        self
    }

    /// 按顺序挑第一个 is_registered 返回 true 的工具名
    pub fn resolve(&self, is_registered: impl Fn(&str) -> bool) -> Option<ToolCall> {
        std::iter::once(&self.tool_name)
            .chain(self.fallbacks.iter())
            .find(|name| is_registered(name))
            .map(|name| ToolCall {
                name: name.clone(),
                parameters: self.parameters.clone(),
            })
    }
}

/// 计划阶段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub name: String,
    pub calls: Vec<PlannedCall>,
    pub depends_on_phases: Vec<PhaseId>,
    /// 仅作描述；执行时任何失败都会中止计划
    pub optional: bool,
    pub estimated_duration_sec: u64,
}

/// 风险条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub description: String,
    pub mitigation: String,
}

/// 回滚策略：按顺序执行的步骤说明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackStrategy {
    pub description: String,
    pub steps: Vec<String>,
}

/// 执行计划；修改时整体替换，不做增量修补
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: PlanId,
    pub goal: String,
    pub complexity: ComplexityClass,
    pub phases: Vec<Phase>,
    pub estimated_duration_sec: u64,
    pub risks: Vec<Risk>,
    pub files_to_touch: Vec<String>,
    pub validation_steps: Vec<String>,
    pub rollback: Option<RollbackStrategy>,
    /// 创建时间（unix 毫秒）
    pub created_at: i64,
}

impl ExecutionPlan {
    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn call_count(&self) -> usize {
        self.phases.iter().map(|p| p.calls.len()).sum()
    }

    /// 供用户确认的可读摘要
    pub fn format_summary(&self) -> String {
        let mut out = format!(
            "Plan {} ({} task, ~{}s)\nGoal: {}\n",
            self.id, self.complexity, self.estimated_duration_sec, self.goal
        );
        for (i, phase) in self.phases.iter().enumerate() {
            out.push_str(&format!(
                "\n{}. {} (~{}s{})\n",
                i + 1,
                phase.name,
                phase.estimated_duration_sec,
                if phase.optional { ", optional" } else { "" }
            ));
            for call in &phase.calls {
                out.push_str(&format!("   - {}: {}\n", call.tool_name, call.purpose));
            }
        }
        if !self.files_to_touch.is_empty() {
            out.push_str(&format!("\nFiles: {}\n", self.files_to_touch.join(", ")));
        }
        if !self.risks.is_empty() {
            out.push_str("\nRisks:\n");
            for r in &self.risks {
                out.push_str(&format!("   - {} (mitigation: {})\n", r.description, r.mitigation));
            }
        }
        if !self.validation_steps.is_empty() {
            out.push_str("\nValidation:\n");
            for v in &self.validation_steps {
                out.push_str(&format!("   - {v}\n"));
            }
        }
        if let Some(ref rb) = self.rollback {
            out.push_str(&format!("\nRollback: {}\n", rb.description));
        }
        out
    }
}

/// 修改请求可选的编辑类别（只描述，不修改计划）
pub fn modification_options() -> Vec<&'static str> {
    vec![
        "Change the goal or scope and re-plan",
        "Add or remove files to touch",
        "Skip the modification phase (analysis only)",
        "Require a backup before any write",
        "Change validation steps",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uses_first_registered() {
        let call = PlannedCall::new("semantic-search", "find usages")
            .fallback("grep-search")
            .fallback("read-file")
            .param("pattern", "fn main");
        let resolved = call.resolve(|n| n == "grep-search" || n == "read-file").unwrap();
        assert_eq!(resolved.name, "grep-search");
        assert_eq!(resolved.parameters["pattern"], "fn main");
        assert!(call.resolve(|_| false).is_none());
    }

    #[test]
    fn test_complexity_order_and_display() {
        assert!(ComplexityClass::Simple < ComplexityClass::Complex);
        assert_eq!(ComplexityClass::Medium.to_string(), "medium");
    }
}
