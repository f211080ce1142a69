//! The reorder engine: an editable plan language plus its interpreter.

mod exec;
mod plan;

pub use exec::{ReorderEngine, ReorderOutcome, ReorderReport};
pub use plan::{diff, generate, Command, ParentSpec, Plan, PlanDiff};
