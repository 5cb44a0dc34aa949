//! 规划层：复杂度评估、多阶段计划合成与按阶段执行

pub mod builder;
pub mod complexity;
pub mod engine;
pub mod executor;
pub mod intent;
pub mod types;

pub use builder::{PlanBuildError, PlanBuilder};
pub use complexity::ComplexityScore;
pub use engine::PlanningEngine;
pub use executor::{PlanExecutor, PlanOutcome};
pub use intent::DetectedIntent;
pub use types::*;
