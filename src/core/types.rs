//! 共享数据模型：ToolCall / ToolResult / ExecutionContext

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 一次工具调用：工具名 + 参数表
///
/// 预言机输出里既可以写 `{"name": ..., "parameters": {...}}`，也可以写 `{"tool": ..., "args": {...}}`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(alias = "tool")]
    pub name: String,
    #[serde(default, alias = "args")]
    pub parameters: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn args(&self) -> Value {
        Value::Object(self.parameters.clone())
    }
}

/// 单次调用结果；创建后不再修改，按顺序追加到会话日志
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub value: Option<Value>,
    pub error: Option<String>,
    pub source_call: ToolCall,
    pub execution_time_ms: u64,
    pub round: usize,
    /// 结果来自缓存，未调用工具
    pub cached: bool,
}

impl ToolResult {
    pub fn ok(call: ToolCall, value: Value, execution_time_ms: u64, round: usize) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
            source_call: call,
            execution_time_ms,
            round,
            cached: false,
        }
    }

    pub fn failed(
        call: ToolCall,
        error: impl Into<String>,
        execution_time_ms: u64,
        round: usize,
    ) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error.into()),
            source_call: call,
            execution_time_ms,
            round,
            cached: false,
        }
    }

    pub fn from_cache(call: ToolCall, value: Value, round: usize) -> Self {
        Self {
            cached: true,
            ..Self::ok(call, value, 0, round)
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.source_call.name
    }

    /// 单行摘要，供兜底答案与报告使用
    pub fn summary_line(&self, max_chars: usize) -> String {
        let body = match (&self.value, &self.error) {
            (Some(Value::String(s)), _) => s.clone(),
            (Some(v), _) => v.to_string(),
            (None, Some(e)) => format!("error: {e}"),
            (None, None) => String::new(),
        };
        let preview: String = body.chars().take(max_chars).collect();
        let ellipsis = if body.chars().count() > max_chars { "..." } else { "" };
        let status = if self.success { "ok" } else { "failed" };
        format!(
            "[round {}] {} ({status}): {preview}{ellipsis}",
            self.round, self.source_call.name
        )
    }
}

/// 每轮新建的执行上下文
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub round: usize,
    pub prior_results: Vec<ToolResult>,
    pub original_request: String,
    pub working_directory: PathBuf,
}

impl ExecutionContext {
    pub fn new(original_request: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            round: 0,
            prior_results: Vec::new(),
            original_request: original_request.into(),
            working_directory: working_directory.into(),
        }
    }

    /// 基于当前上下文生成下一轮的新上下文
    pub fn for_round(&self, round: usize, prior_results: &[ToolResult]) -> Self {
        Self {
            round,
            prior_results: prior_results.to_vec(),
            original_request: self.original_request.clone(),
            working_directory: self.working_directory.clone(),
        }
    }

    /// 某个工具此前成功的结果值
    pub fn successful_values_of(&self, tool: &str) -> Vec<Value> {
        self.prior_results
            .iter()
            .filter(|r| r.success && r.source_call.name == tool)
            .filter_map(|r| r.value.clone())
            .collect()
    }
}

/// 毫秒数，超出 u64 时饱和
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_accepts_aliases() {
        let call: ToolCall =
            serde_json::from_value(json!({"tool": "read-file", "args": {"path": "a.rs"}})).unwrap();
        assert_eq!(call.name, "read-file");
        assert_eq!(call.parameters.get("path"), Some(&json!("a.rs")));

        let call: ToolCall = serde_json::from_value(json!({"name": "list-directory"})).unwrap();
        assert!(call.parameters.is_empty());
    }

    #[test]
    fn test_summary_line_truncates() {
        let r = ToolResult::ok(ToolCall::new("echo"), json!("abcdefghij"), 3, 2);
        assert_eq!(r.summary_line(4), "[round 2] echo (ok): abcd...");
        let f = ToolResult::failed(ToolCall::new("echo"), "boom", 1, 1);
        assert!(f.summary_line(50).contains("failed"));
    }

    #[test]
    fn test_successful_values_of() {
        let mut ctx = ExecutionContext::new("task", ".");
        ctx.prior_results = vec![
            ToolResult::ok(ToolCall::new("issue-analysis"), json!({"n": 1}), 1, 1),
            ToolResult::failed(ToolCall::new("issue-analysis"), "x", 1, 1),
            ToolResult::ok(ToolCall::new("read-file"), json!("x"), 1, 1),
        ];
        assert_eq!(ctx.successful_values_of("issue-analysis"), vec![json!({"n": 1})]);
    }

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
