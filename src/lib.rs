//! Forager - 多轮工具编排内核
//!
//! 模块划分：
//! - **agent**: 会话门面（run、计划生命周期、统计）
//! - **cache**: 工具结果 TTL 缓存
//! - **config**: 配置加载（TOML + 环境变量）
//! - **core**: 错误类型、共享数据模型、工具池与执行统计
//! - **llm**: 推理预言机抽象与 Mock
//! - **memory**: 有界对话历史
//! - **observability**: tracing 初始化
//! - **planning**: 复杂度评估、多阶段计划与计划执行
//! - **react**: 轮次控制器、输出解析、消息构造、继续启发式
//! - **scheduler**: 依赖感知的分阶段调度与参数增强
//! - **tools**: 工具 trait、注册表与带超时的执行器

pub mod agent;
pub mod cache;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planning;
pub mod react;
pub mod scheduler;
pub mod tools;

pub use agent::{Agent, AgentStats, ModificationMenu};
pub use core::{AgentError, ExecutionContext, ToolCall, ToolResult};
