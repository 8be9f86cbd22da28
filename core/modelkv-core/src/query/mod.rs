//! Query module: filter parsing, access-path planning and execution.
//!
//! ```text
//! Filter + OrderBy + limit → plan() → ExecutionPlan → execute() → [Resource]
//! ```

pub mod executor;
pub mod filter;
pub mod planner;

pub use executor::{execute, sort_by_property};
pub use filter::{Filter, OrderBy};
pub use planner::{AccessPath, ExecutionPlan, PlanOrder, plan};
