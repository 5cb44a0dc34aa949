//! 对话历史窗口
//!
//! 只保留最近 N 轮（每轮约 2 条消息），长会话中内存不随轮数增长；仅由轮次控制器在自己的回合内修改。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::ToolResult;

/// 消息角色（与预言机 API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 有界历史：超出 max_turns*2 条时从队首丢弃
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: VecDeque<Message>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push_back(msg);
        let cap = self.max_turns * 2;
        while self.messages.len() > cap {
            self.messages.pop_front();
        }
    }

    /// 记录一轮：预言机原始输出 + 工具结果观察
    pub fn record_round(&mut self, raw_output: &str, results: &[ToolResult]) {
        self.push(Message::assistant(raw_output.to_string()));
        if results.is_empty() {
            return;
        }
        let observation = results
            .iter()
            .map(|r| r.summary_line(300))
            .collect::<Vec<_>>()
            .join("\n");
        self.push(Message::user(format!("Tool results:\n{observation}")));
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
