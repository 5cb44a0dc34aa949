//! 消息构造（playbook）
//!
//! 轮次控制器只通过 Playbook trait 拿消息；措辞可替换，DefaultPlaybook 给出一个可用的最小版本。

use crate::core::{ExecutionContext, ToolResult};
use crate::memory::Message;

/// 观察/摘要中单个结果的最大预览字符数
const RESULT_PREVIEW_CHARS: usize = 400;

pub trait Playbook: Send + Sync {
    /// 每轮调用预言机前构造消息
    fn build_messages(
        &self,
        input: &str,
        ctx: &ExecutionContext,
        prior_results: &[ToolResult],
        round: usize,
        history: &[Message],
    ) -> Vec<Message>;

    /// 循环结束后请求预言机合成最终回答
    fn synthesis_messages(
        &self,
        input: &str,
        last_raw: &str,
        all_results: &[ToolResult],
        total_rounds: usize,
    ) -> Vec<Message>;
}

/// 默认 playbook：system 提示 + 工具目录 + 历史窗口 + 当前请求
#[derive(Debug, Clone, Default)]
pub struct DefaultPlaybook {
    tool_catalog: String,
}

impl DefaultPlaybook {
    /// tool_catalog 通常来自 ToolRegistry::tool_descriptions
    pub fn new(tool_catalog: impl Into<String>) -> Self {
        Self {
            tool_catalog: tool_catalog.into(),
        }
    }

    fn system_prompt(&self, ctx: &ExecutionContext) -> String {
        let mut prompt = String::from(
            "You are a task-execution agent. To use tools, reply with JSON only: \
             {\"tool_calls\": [{\"tool\": \"<name>\", \"args\": {...}}]}. \
             Independent calls may be batched in one reply. \
             When you have enough information, reply with the final answer as plain text.",
        );
        prompt.push_str(&format!(
            "\nWorking directory: {}",
            ctx.working_directory.display()
        ));
        if !self.tool_catalog.is_empty() {
            prompt.push_str("\n\nAvailable tools:\n");
            prompt.push_str(&self.tool_catalog);
        }
        prompt
    }
}

impl Playbook for DefaultPlaybook {
    fn build_messages(
        &self,
        input: &str,
        ctx: &ExecutionContext,
        prior_results: &[ToolResult],
        round: usize,
        history: &[Message],
    ) -> Vec<Message> {
        let mut messages = vec![Message::system(self.system_prompt(ctx))];
        messages.push(Message::user(input.to_string()));
        messages.extend(history.iter().cloned());
        if round > 1 && !prior_results.is_empty() {
            messages.push(Message::user(format!(
                "Round {round}. {} tool result(s) so far ({} failed). Continue, or answer if done.",
                prior_results.len(),
                prior_results.iter().filter(|r| !r.success).count()
            )));
        }
        messages
    }

    fn synthesis_messages(
        &self,
        input: &str,
        last_raw: &str,
        all_results: &[ToolResult],
        total_rounds: usize,
    ) -> Vec<Message> {
        vec![
            Message::system(
                "Compose the final answer to the user's request from the investigation below. \
                 Reply in plain text, without tool calls.",
            ),
            Message::user(format!(
                "Request: {input}\n\nRounds used: {total_rounds}\n\nTool results:\n{}\n\nLast agent output:\n{last_raw}",
                digest(all_results)
            )),
        ]
    }
}

/// 每个结果一行；无结果时给出占位文字
pub fn digest(results: &[ToolResult]) -> String {
    if results.is_empty() {
        return "(no tool results)".to_string();
    }
    results
        .iter()
        .map(|r| format!("- {}", r.summary_line(RESULT_PREVIEW_CHARS)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 兜底摘要：在解析失败、预言机失败、计划中止时随错误一起返回，保证不为空
pub fn fallback_summary(results: &[ToolResult]) -> String {
    let ok = results.iter().filter(|r| r.success).count();
    format!(
        "Collected {} tool result(s), {} succeeded and {} failed.\n{}",
        results.len(),
        ok,
        results.len() - ok,
        digest(results)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolCall;
    use crate::memory::Role;
    use serde_json::json;

    #[test]
    fn test_build_messages_layout() {
        let pb = DefaultPlaybook::new("- read-file: reads a file");
        let ctx = ExecutionContext::new("fix it", "/repo");
        let history = vec![Message::assistant("{\"tool\": \"read-file\"}")];
        let msgs = pb.build_messages("fix it", &ctx, &[], 1, &history);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.contains("read-file"));
        assert!(msgs[0].content.contains("/repo"));
        assert_eq!(msgs[1], Message::user("fix it"));
        assert_eq!(msgs[2], history[0]);
    }

    #[test]
    fn test_synthesis_includes_results() {
        let pb = DefaultPlaybook::default();
        let results = vec![ToolResult::ok(ToolCall::new("grep-search"), json!("3 matches"), 4, 1)];
        let msgs = pb.synthesis_messages("find it", "done", &results, 2);
        assert!(msgs[1].content.contains("3 matches"));
        assert!(msgs[1].content.contains("Rounds used: 2"));
    }

    #[test]
    fn test_fallback_summary_never_empty() {
        assert!(!fallback_summary(&[]).is_empty());
        let results = vec![ToolResult::failed(ToolCall::new("read-file"), "denied", 1, 1)];
        let text = fallback_summary(&results);
        assert!(text.contains("1 failed"));
        assert!(text.contains("denied"));
    }
}
