//! 轮次控制：解析预言机输出、构造消息、继续启发式、主循环与过程事件

pub mod continuation;
pub mod events;
pub mod loop_;
pub mod parser;
pub mod playbook;

pub use continuation::{
    BucketClassifier, ContinuationHeuristic, CoverageBucket, Decision, DecisionContext, TaskProfile,
};
pub use events::SessionEvent;
pub use loop_::{RoundController, RoundState, RunOutcome};
pub use parser::parse_tool_calls;
pub use playbook::{fallback_summary, DefaultPlaybook, Playbook};
