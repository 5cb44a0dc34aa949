//! 推理预言机抽象
//!
//! 编排内核只通过 complete(messages) -> text 使用预言机；具体后端（OpenAI 兼容、本地模型等）由上层注入。

use async_trait::async_trait;

use crate::memory::Message;

/// 预言机客户端 trait：按顺序给出 {role, content} 消息，返回生成文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
