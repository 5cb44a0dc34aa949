//! 记忆层：有界对话历史

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
