//! Mock 预言机（用于测试，无需 API）
//!
//! 按脚本依次返回预设回复；脚本耗尽后回显最后一条 User 消息。记录调用次数与收到的消息。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

/// 脚本化 Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    /// 脚本耗尽后固定返回的回复
    fallback: Option<String>,
    calls: AtomicUsize,
    received: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定回复
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(responses.into_iter().map(|s| Ok(s.into())).collect()),
            ..Self::default()
        }
    }

    /// 脚本耗尽后总是返回 text
    pub fn repeating(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::default()
        }
    }

    /// 在脚本末尾追加一次失败
    pub fn then_fail(self, error: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(Err(error.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的消息
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(messages.to_vec());

        let next = self.script.lock().unwrap_or_else(|p| p.into_inner()).pop_front();
        if let Some(reply) = next {
            return reply;
        }
        if let Some(ref text) = self.fallback {
            return Ok(text.clone());
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {last_user}"))
    }
}
