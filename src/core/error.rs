//! 编排错误类型
//!
//! 单次工具调用的失败（NotFound / Timeout / ExecutionFailed）在调度器内被捕获为失败的 ToolResult，
//! 不会逃逸；ParseError 与 PlanValidation 会作为会话失败返回给调用方（总是附带兜底摘要）。

use thiserror::Error;

/// 编排过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 调用了未注册的工具；available 为当前已注册的工具名（已排序）
    #[error("Tool not found: {name} (available: {})", available.join(", "))]
    ToolNotFound { name: String, available: Vec<String> },

    #[error("Tool timeout: {tool} did not finish within {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    /// 工具自身返回失败；hint 为根据错误信息推断出的提示（如缺少凭据、路径不存在）
    #[error("Tool execution failed: {tool}: {message}{}", hint.as_ref().map(|h| format!(" (hint: {h})")).unwrap_or_default())]
    ToolExecutionFailed {
        tool: String,
        message: String,
        hint: Option<String>,
    },

    /// 预言机输出无法解析为工具调用
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 依赖无法满足（循环或缺失），非致命：调度器会降级为强制执行
    #[error("Dependency resolution failure: {0}")]
    DependencyResolution(String),

    /// 计划某一阶段有调用失败，后续阶段全部中止
    #[error("Plan validation failed in phase '{phase}': {}", failed_calls.join("; "))]
    PlanValidation {
        phase: String,
        failed_calls: Vec<String>,
    },

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("No active plan")]
    NoActivePlan,

    #[error("Cancelled")]
    Cancelled,
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}

/// 根据工具错误信息给出上下文提示，帮助预言机在下一轮修正调用
pub fn failure_hint(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    let rules: [(&[&str], &str); 4] = [
        (
            &["token", "credential", "unauthorized", "401", "api key", "authentication"],
            "missing or invalid credentials; check the configured token",
        ),
        (
            &["not found", "no such file", "enoent", "does not exist"],
            "path not found; list the directory first to confirm the path",
        ),
        (
            &["permission denied", "eacces", "forbidden", "403"],
            "permission denied; the path or resource is not accessible",
        ),
        (
            &["rate limit", "429", "too many requests"],
            "rate limited; retry later or reduce call volume",
        ),
    ];
    rules
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
        .map(|(_, hint)| hint.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_available_tools() {
        let err = AgentError::ToolNotFound {
            name: "fake".into(),
            available: vec!["echo".into(), "read-file".into()],
        };
        let text = err.to_string();
        assert!(text.contains("fake"));
        assert!(text.contains("echo, read-file"));
    }

    #[test]
    fn test_failure_hint() {
        assert!(failure_hint("GitHub token missing").unwrap().contains("credentials"));
        assert!(failure_hint("ENOENT: no such file").unwrap().contains("path not found"));
        assert!(failure_hint("something odd").is_none());
    }

    #[test]
    fn test_execution_failed_display_includes_hint() {
        let err = AgentError::ToolExecutionFailed {
            tool: "read-file".into(),
            message: "no such file".into(),
            hint: failure_hint("no such file"),
        };
        assert!(err.to_string().contains("hint: path not found"));
    }
}
