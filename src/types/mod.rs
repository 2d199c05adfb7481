//! Shared data structures for health-check and auto-repair runs
//!
//! - `tool`: tool identities (`ToolId`), execution results, and the `ToolError` taxonomy
//! - `health`: severity tiers and per-tool results (`CheckResult`, `RepairResult`)
//! - `summary`: the aggregate of one orchestrator run (`RunSummary`)

mod health;
mod summary;
mod tool;

pub use health::*;
pub use summary::*;
pub use tool::*;
