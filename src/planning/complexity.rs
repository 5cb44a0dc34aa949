//! 复杂度评估：关键词类别 + 文件引用数 + 收集结果体量的加权分，与配置阈值比较

use serde::Serialize;

use crate::config::PlanningSection;
use crate::core::ToolResult;
use crate::planning::intent::DetectedIntent;
use crate::planning::types::ComplexityClass;

/// 关键词类别：(名字, 权重, 关键词)；每类最多计两次命中
const KEYWORD_CATEGORIES: &[(&str, f64, &[&str])] = &[
    (
        "modification",
        1.5,
        &["implement", "refactor", "rewrite", "migrate", "change", "add", "remove", "fix", "update", "rename"],
    ),
    (
        "scope",
        2.0,
        &["all ", "every", "across", "entire", "multiple", "whole", "codebase", "everywhere"],
    ),
    (
        "risk",
        1.5,
        &["database", "schema", "api", "security", "concurrency", "performance", "breaking", "migration"],
    ),
    ("investigation", 0.5, &["why", "investigate", "debug", "root cause", "trace"]),
];

const FILE_WEIGHT: f64 = 1.0;
const MAX_FILE_SCORE: f64 = 5.0;
const ISSUE_WEIGHT: f64 = 1.0;
/// 每 KiB 收集结果的分值
const VOLUME_WEIGHT_PER_KB: f64 = 0.5;
const MAX_VOLUME_SCORE: f64 = 3.0;

/// 分项得分（便于日志与测试）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplexityScore {
    pub keywords: f64,
    pub files: f64,
    pub issues: f64,
    pub volume: f64,
}

impl ComplexityScore {
    pub fn compute(request: &str, intent: &DetectedIntent, gathered: &[ToolResult]) -> Self {
        let lower = request.to_lowercase();
        let keywords = KEYWORD_CATEGORIES
            .iter()
            .map(|(_, weight, words)| {
                let hits = words.iter().filter(|w| lower.contains(*w)).count().min(2);
                weight * hits as f64
            })
            .sum();

        let gathered_bytes: usize = gathered
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.value.as_ref())
            .map(|v| match v {
                serde_json::Value::String(s) => s.len(),
                other => other.to_string().len(),
            })
            .sum();

        Self {
            keywords,
            files: (intent.file_references.len() as f64 * FILE_WEIGHT).min(MAX_FILE_SCORE),
            issues: if intent.issue_numbers.is_empty() { 0.0 } else { ISSUE_WEIGHT },
            volume: (gathered_bytes as f64 / 1024.0 * VOLUME_WEIGHT_PER_KB).min(MAX_VOLUME_SCORE),
        }
    }

    pub fn total(&self) -> f64 {
        self.keywords + self.files + self.issues + self.volume
    }

    pub fn classify(&self, thresholds: &PlanningSection) -> ComplexityClass {
        let total = self.total();
        if total >= thresholds.complex_threshold {
            ComplexityClass::Complex
        } else if total >= thresholds.medium_threshold {
            ComplexityClass::Medium
        } else {
            ComplexityClass::Simple
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolCall;
    use serde_json::json;

    fn classify(request: &str, gathered: &[ToolResult]) -> ComplexityClass {
        let intent = DetectedIntent::detect(request);
        ComplexityScore::compute(request, &intent, gathered).classify(&PlanningSection::default())
    }

    #[test]
    fn test_short_question_is_simple() {
        assert_eq!(classify("show me README.md", &[]), ComplexityClass::Simple);
    }

    #[test]
    fn test_targeted_fix_is_medium() {
        // fix(1.5) + 文件(1.0) + issue(1.0) = 3.5
        assert_eq!(classify("fix issue #3 in src/lib.rs", &[]), ComplexityClass::Medium);
    }

    #[test]
    fn test_wide_refactor_is_complex() {
        let request = "refactor the database api across the entire codebase: a.rs b.rs c.rs";
        assert_eq!(classify(request, &[]), ComplexityClass::Complex);
    }

    #[test]
    fn test_gathered_volume_counts_only_successes() {
        let big = "x".repeat(4096);
        let ok = ToolResult::ok(ToolCall::new("read-file"), json!(big), 1, 0);
        let failed = ToolResult::failed(ToolCall::new("read-file"), "nope", 1, 0);
        let intent = DetectedIntent::default();
        let score = ComplexityScore::compute("", &intent, &[ok, failed]);
        assert_eq!(score.volume, 2.0);
        assert_eq!(score.total(), 2.0);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let strict = PlanningSection {
            medium_threshold: 100.0,
            complex_threshold: 200.0,
        };
        let intent = DetectedIntent::detect("refactor everything across all modules");
        let score = ComplexityScore::compute("refactor everything across all modules", &intent, &[]);
        assert_eq!(score.classify(&strict), ComplexityClass::Simple);
    }
}
