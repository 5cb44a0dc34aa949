//! 会话过程事件：可选地通过 mpsc 推送给上层（日志面板、SSE 等）

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// 第几轮开始
    RoundStarted { round: usize, max_rounds: usize },
    /// 预言机原始输出（预览）
    OracleResponse { round: usize, preview: String },
    /// 本轮解析出的工具调用
    ToolCalls { round: usize, tools: Vec<String> },
    /// 单个工具结果
    ToolResult {
        round: usize,
        tool: String,
        success: bool,
        cached: bool,
        preview: String,
    },
    /// 继续启发式的结论
    Continuation {
        round: usize,
        should_continue: bool,
        rule: String,
    },
    /// 开始合成最终回答（via_oracle=false 表示本地合成）
    Synthesis { via_oracle: bool },
    /// 会话结束
    Done { rounds_used: usize, success: bool },
    Error { text: String },
}
