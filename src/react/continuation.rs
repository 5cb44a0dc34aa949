//! 继续/停止启发式
//!
//! 纯函数：(本轮结果, 轮次, 累计结果) -> 是否继续。规则按顺序求值，第一个给出结论的规则生效。
//! 覆盖桶与阈值都来自配置；这是对「调查是否充分」的近似判断，不是正确性保证。

use std::collections::HashSet;

use serde::Serialize;

use crate::config::HeuristicSection;
use crate::core::ToolResult;

/// 覆盖桶：已成功执行的工具类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageBucket {
    RequirementAnalysis,
    CodeExploration,
    StructureAnalysis,
    ContentAnalysis,
    CodeModification,
}

/// 从原始请求识别的任务类型，决定哪些桶是必需的
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskProfile {
    IssueResolution,
    CodeChange,
    Review,
    General,
}

impl TaskProfile {
    pub fn detect(request: &str) -> Self {
        let lower = request.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if has(&["issue", "bug", "ticket", "crash", "#"]) {
            TaskProfile::IssueResolution
        } else if has(&["implement", "refactor", "modify", "change", "add ", "rename", "update"]) {
            TaskProfile::CodeChange
        } else if has(&["review", "explain", "understand", "analyze", "analyse", "overview"]) {
            TaskProfile::Review
        } else {
            TaskProfile::General
        }
    }

    pub fn required_buckets(&self) -> &'static [CoverageBucket] {
        match self {
            TaskProfile::IssueResolution => &[
                CoverageBucket::RequirementAnalysis,
                CoverageBucket::CodeExploration,
            ],
            TaskProfile::CodeChange => &[
                CoverageBucket::ContentAnalysis,
                CoverageBucket::CodeModification,
            ],
            TaskProfile::Review => &[
                CoverageBucket::StructureAnalysis,
                CoverageBucket::ContentAnalysis,
            ],
            TaskProfile::General => &[],
        }
    }
}

/// 工具名 -> 桶（子串匹配，不区分大小写；一个工具可落入多个桶）
#[derive(Debug, Clone)]
pub struct BucketClassifier {
    patterns: Vec<(CoverageBucket, Vec<String>)>,
}

impl BucketClassifier {
    pub fn from_config(cfg: &HeuristicSection) -> Self {
        let lower = |v: &[String]| v.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();
        Self {
            patterns: vec![
                (CoverageBucket::RequirementAnalysis, lower(&cfg.requirement_patterns)),
                (CoverageBucket::CodeExploration, lower(&cfg.exploration_patterns)),
                (CoverageBucket::StructureAnalysis, lower(&cfg.structure_patterns)),
                (CoverageBucket::ContentAnalysis, lower(&cfg.content_patterns)),
                (CoverageBucket::CodeModification, lower(&cfg.modification_patterns)),
            ],
        }
    }

    pub fn classify(&self, tool: &str) -> Vec<CoverageBucket> {
        let tool = tool.to_lowercase();
        self.patterns
            .iter()
            .filter(|(_, pats)| pats.iter().any(|p| tool.contains(p.as_str())))
            .map(|(b, _)| *b)
            .collect()
    }

    /// 累计结果中成功工具覆盖到的桶
    pub fn covered(&self, results: &[ToolResult]) -> HashSet<CoverageBucket> {
        results
            .iter()
            .filter(|r| r.success)
            .flat_map(|r| self.classify(r.tool_name()))
            .collect()
    }
}

impl Default for BucketClassifier {
    fn default() -> Self {
        Self::from_config(&HeuristicSection::default())
    }
}

/// 规则共享的决策上下文
#[derive(Debug, Clone)]
pub struct DecisionContext {
    /// 刚结束的轮次（从 1 开始）
    pub round: usize,
    pub max_rounds: usize,
    pub min_investigation_rounds: usize,
    pub successes_this_round: usize,
    pub profile: TaskProfile,
    pub covered: HashSet<CoverageBucket>,
}

impl DecisionContext {
    fn missing_required(&self) -> bool {
        self.profile
            .required_buckets()
            .iter()
            .any(|b| !self.covered.contains(b))
    }
}

type RuleFn = fn(&DecisionContext) -> Option<bool>;

fn round_ceiling(c: &DecisionContext) -> Option<bool> {
    (c.round >= c.max_rounds).then_some(false)
}

fn no_success_this_round(c: &DecisionContext) -> Option<bool> {
    (c.successes_this_round == 0).then_some(false)
}

fn required_bucket_empty(c: &DecisionContext) -> Option<bool> {
    (c.missing_required() && c.round < c.max_rounds).then_some(true)
}

fn min_investigation_depth(c: &DecisionContext) -> Option<bool> {
    (c.round < c.min_investigation_rounds).then_some(true)
}

fn coverage_complete(c: &DecisionContext) -> Option<bool> {
    Some(c.missing_required())
}

/// 有序规则表：(名字, 谓词)，Some(结论) 即命中
const RULES: &[(&str, RuleFn)] = &[
    ("round_ceiling", round_ceiling),
    ("no_success_this_round", no_success_this_round),
    ("required_bucket_empty", required_bucket_empty),
    ("min_investigation_depth", min_investigation_depth),
    ("coverage_complete", coverage_complete),
];

/// 决策结果：是否继续 + 命中的规则名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub should_continue: bool,
    pub rule: &'static str,
}

/// 继续启发式，阈值来自配置
#[derive(Debug, Clone)]
pub struct ContinuationHeuristic {
    pub max_rounds: usize,
    pub min_investigation_rounds: usize,
    classifier: BucketClassifier,
}

impl ContinuationHeuristic {
    pub fn new(max_rounds: usize, min_investigation_rounds: usize, classifier: BucketClassifier) -> Self {
        Self {
            max_rounds,
            min_investigation_rounds,
            classifier,
        }
    }

    pub fn classifier(&self) -> &BucketClassifier {
        &self.classifier
    }

    pub fn decide(
        &self,
        this_round: &[ToolResult],
        round: usize,
        all_results: &[ToolResult],
        profile: TaskProfile,
    ) -> Decision {
        let ctx = DecisionContext {
            round,
            max_rounds: self.max_rounds,
            min_investigation_rounds: self.min_investigation_rounds,
            successes_this_round: this_round.iter().filter(|r| r.success).count(),
            profile,
            covered: self.classifier.covered(all_results),
        };
        evaluate(&ctx)
    }
}

/// 按顺序求值规则；最后一条规则总会给出结论
pub fn evaluate(ctx: &DecisionContext) -> Decision {
    for &(name, rule) in RULES {
        if let Some(should_continue) = rule(ctx) {
            return Decision {
                should_continue,
                rule: name,
            };
        }
    }
    Decision {
        should_continue: false,
        rule: "default_stop",
    }
}
