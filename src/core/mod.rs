//! 核心层：错误类型、工具池与执行统计、共享数据模型

pub mod error;
pub mod task_scheduler;
pub mod types;

pub use error::{failure_hint, AgentError};
pub use task_scheduler::{ExecutionStats, StatsSnapshot, TaskScheduler};
pub use types::{duration_ms, ExecutionContext, ToolCall, ToolResult};
