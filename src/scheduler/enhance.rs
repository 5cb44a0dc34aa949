//! 派发前的参数增强规则
//!
//! 规则是数据：按顺序匹配工具名并注入参数；调用方已显式给出的参数永不覆盖。

use serde_json::Value;

use crate::core::{ExecutionContext, ToolCall};

/// 单条增强规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnhancementRule {
    /// 注入工作目录
    InjectWorkingDirectory { tool: String, param: String },
    /// 注入某个工具此前成功的结果（数组）
    InjectPriorResults {
        tool: String,
        param: String,
        source_tool: String,
    },
    /// 注入原始请求文本
    InjectOriginalRequest { tool: String, param: String },
}

impl EnhancementRule {
    fn tool(&self) -> &str {
        match self {
            EnhancementRule::InjectWorkingDirectory { tool, .. }
            | EnhancementRule::InjectPriorResults { tool, .. }
            | EnhancementRule::InjectOriginalRequest { tool, .. } => tool,
        }
    }

    fn param(&self) -> &str {
        match self {
            EnhancementRule::InjectWorkingDirectory { param, .. }
            | EnhancementRule::InjectPriorResults { param, .. }
            | EnhancementRule::InjectOriginalRequest { param, .. } => param,
        }
    }

    /// 计算要注入的值；None 表示上下文中没有可注入的内容
    fn value(&self, ctx: &ExecutionContext) -> Option<Value> {
        match self {
            EnhancementRule::InjectWorkingDirectory { .. } => Some(Value::String(
                ctx.working_directory.to_string_lossy().into_owned(),
            )),
            EnhancementRule::InjectPriorResults { source_tool, .. } => {
                let values = ctx.successful_values_of(source_tool);
                (!values.is_empty()).then_some(Value::Array(values))
            }
            EnhancementRule::InjectOriginalRequest { .. } => {
                (!ctx.original_request.is_empty())
                    .then(|| Value::String(ctx.original_request.clone()))
            }
        }
    }
}

/// 常见工具的默认增强规则
pub fn default_rules() -> Vec<EnhancementRule> {
    let wd = |tool: &str| EnhancementRule::InjectWorkingDirectory {
        tool: tool.to_string(),
        param: "working_directory".to_string(),
    };
    vec![
        wd("list-directory"),
        wd("read-file"),
        wd("grep-search"),
        wd("write-file"),
        wd("edit-file"),
        wd("run-diagnostics"),
        wd("context-analysis"),
        EnhancementRule::InjectPriorResults {
            tool: "grep-search".to_string(),
            param: "issue_context".to_string(),
            source_tool: "issue-analysis".to_string(),
        },
        EnhancementRule::InjectOriginalRequest {
            tool: "context-analysis".to_string(),
            param: "request".to_string(),
        },
    ]
}

/// 对单个调用应用所有匹配的规则
pub fn enhance(call: &ToolCall, rules: &[EnhancementRule], ctx: &ExecutionContext) -> ToolCall {
    let mut enhanced = call.clone();
    for rule in rules.iter().filter(|r| r.tool() == call.name) {
        if enhanced.parameters.contains_key(rule.param()) {
            continue;
        }
        if let Some(value) = rule.value(ctx) {
            enhanced.parameters.insert(rule.param().to_string(), value);
        }
    }
    enhanced
}
