//! 预言机层：客户端抽象与测试用 Mock

pub mod mock;
pub mod traits;

pub use mock::MockLlmClient;
pub use traits::LlmClient;
