//! 依赖表与分阶段（stage）规划
//!
//! 依赖表是纯数据：工具名 -> {depends_on, parallelizable}，未登记的工具视为无依赖、可并行。
//! 规划时反复扫描剩余调用：某调用的每个依赖要么不在本批次中，要么其在本批次中的所有实例都已在之前的阶段完成，
//! 则该调用进入当前阶段。某次扫描没有任何调用可入选（循环或不可满足）时，剩余调用被强制放入最后一个阶段。

use std::collections::{HashMap, HashSet};

use crate::core::{AgentError, ToolCall};

/// 单个工具的依赖声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub depends_on: HashSet<String>,
    pub parallelizable: bool,
}

impl DependencySpec {
    pub fn new<I, S>(depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            depends_on: depends_on.into_iter().map(Into::into).collect(),
            parallelizable: true,
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.parallelizable = false;
        self
    }
}

impl Default for DependencySpec {
    fn default() -> Self {
        Self {
            depends_on: HashSet::new(),
            parallelizable: true,
        }
    }
}

/// 静态依赖表
#[derive(Debug, Clone, Default)]
pub struct DependencyTable {
    specs: HashMap<String, DependencySpec>,
}

impl DependencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: impl Into<String>, spec: DependencySpec) -> Self {
        self.insert(tool, spec);
        self
    }

    pub fn insert(&mut self, tool: impl Into<String>, spec: DependencySpec) {
        self.specs.insert(tool.into(), spec);
    }

    /// 未登记的工具返回 None，调用方按「无依赖、可并行」处理
    pub fn get(&self, tool: &str) -> Option<&DependencySpec> {
        self.specs.get(tool)
    }

    fn depends_on(&self, tool: &str) -> impl Iterator<Item = &String> {
        self.specs.get(tool).into_iter().flat_map(|s| s.depends_on.iter())
    }

    fn parallelizable(&self, tool: &str) -> bool {
        self.specs.get(tool).map_or(true, |s| s.parallelizable)
    }

    /// 常见代码助手工具的依赖关系
    pub fn default_table() -> Self {
        Self::new()
            .with("grep-search", DependencySpec::new(["issue-analysis"]))
            .with("write-file", DependencySpec::new(["read-file", "create-backup"]).exclusive())
            .with("edit-file", DependencySpec::new(["read-file", "create-backup"]).exclusive())
            .with("create-backup", DependencySpec::default().exclusive())
            .with("run-diagnostics", DependencySpec::new(["write-file", "edit-file"]))
            .with("context-analysis", DependencySpec::new(["list-directory", "read-file"]))
    }
}

/// 分阶段结果：每个阶段是原始批次中的下标集合
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StagePlan {
    pub stages: Vec<Vec<usize>>,
    /// 最后一个阶段是否因依赖不可满足而被强制组成
    pub forced: bool,
}

impl StagePlan {
    /// 完全串行：每个调用单独一个阶段，保持原始顺序
    pub fn sequential(len: usize) -> Self {
        Self {
            stages: (0..len).map(|i| vec![i]).collect(),
            forced: false,
        }
    }

    pub fn is_forced_stage(&self, index: usize) -> bool {
        self.forced && index + 1 == self.stages.len()
    }
}

/// 按依赖表把一批调用分阶段
pub fn plan_stages(calls: &[ToolCall], table: &DependencyTable) -> Result<StagePlan, AgentError> {
    // 本批次中每个工具名的剩余实例数
    let mut pending: HashMap<&str, usize> = HashMap::new();
    for call in calls {
        *pending.entry(call.name.as_str()).or_insert(0) += 1;
    }

    let mut remaining: Vec<usize> = (0..calls.len()).collect();
    let mut plan = StagePlan::default();

    while !remaining.is_empty() {
        let (eligible, blocked): (Vec<usize>, Vec<usize>) = remaining.iter().partition(|&&i| {
            table
                .depends_on(&calls[i].name)
                .all(|dep| pending.get(dep.as_str()).copied().unwrap_or(0) == 0)
        });

        if eligible.is_empty() {
            let names: Vec<&str> = blocked.iter().map(|&i| calls[i].name.as_str()).collect();
            tracing::warn!(
                tools = ?names,
                "unsatisfiable dependencies, forcing remaining calls into a final stage"
            );
            plan.stages.push(blocked);
            plan.forced = true;
            break;
        }

        // 可并行的调用组成一个阶段，不可并行的调用各自独占一个阶段
        let (parallel, exclusive): (Vec<usize>, Vec<usize>) = eligible
            .iter()
            .partition(|&&i| table.parallelizable(&calls[i].name));
        if !parallel.is_empty() {
            plan.stages.push(parallel);
        }
        for i in exclusive {
            plan.stages.push(vec![i]);
        }

        for &i in &eligible {
            if let Some(n) = pending.get_mut(calls[i].name.as_str()) {
                *n = n.saturating_sub(1);
            }
        }
        remaining = blocked;
    }

    validate(&plan, calls.len())?;
    tracing::debug!(stages = plan.stages.len(), forced = plan.forced, "staged batch");
    Ok(plan)
}

/// 每个下标必须恰好出现一次
fn validate(plan: &StagePlan, len: usize) -> Result<(), AgentError> {
    let mut seen = vec![false; len];
    for &i in plan.stages.iter().flatten() {
        match seen.get_mut(i) {
            Some(slot) if !*slot => *slot = true,
            Some(_) => {
                return Err(AgentError::DependencyResolution(format!(
                    "call #{i} staged more than once"
                )))
            }
            None => {
                return Err(AgentError::DependencyResolution(format!(
                    "call #{i} out of range"
                )))
            }
        }
    }
    match seen.iter().position(|s| !s) {
        Some(i) => Err(AgentError::DependencyResolution(format!(
            "call #{i} was never staged"
        ))),
        None => Ok(()),
    }
}
