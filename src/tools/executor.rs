//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时，execute(tool_name, args) 在超时内调用工具，
//! 超时或失败时转为 AgentError（ToolTimeout / ToolExecutionFailed / ToolNotFound）；每次调用输出结构化审计日志。
//!
//! 超时只能弱取消：超时后 handler 的 future 被丢弃，在下一个 await 点停止；
//! 若 handler 把工作交给 spawn_blocking 或其他任务，这部分工作会继续运行，其结果被丢弃。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{duration_ms, failure_hint, AgentError};
use crate::tools::{Tool, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_ms: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_millis(timeout_ms.max(1)),
        }
    }

    /// 执行指定工具；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<Value, AgentError> {
        let Some(tool) = self.registry.get(tool_name) else {
            tracing::warn!(tool = %tool_name, "unknown tool requested");
            return Err(AgentError::ToolNotFound {
                name: tool_name.to_string(),
                available: self.registry.tool_names(),
            });
        };

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let elapsed_ms = duration_ms(start.elapsed());
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": elapsed_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(AgentError::ToolExecutionFailed {
                tool: tool_name.to_string(),
                hint: failure_hint(&message),
                message,
            }),
            Err(_) => Err(AgentError::ToolTimeout {
                tool: tool_name.to_string(),
                timeout_ms: duration_ms(self.timeout),
            }),
        }
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
