//! 可观测性：tracing-subscriber 初始化
//!
//! 默认级别 info，可用 RUST_LOG 覆盖（如 `RUST_LOG=forager=debug`）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 安装全局订阅者；已安装时静默忽略
pub fn init() {
    let _ = try_init();
}

/// 安装全局订阅者；已有订阅者时返回错误
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init()
}
