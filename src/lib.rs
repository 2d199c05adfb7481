//! ops-health: operational health checks and auto-repair
//!
//! Probes every external dependency of a transcription and analysis service
//! (PostgreSQL, Slack, a speech-to-text provider, a language-model provider,
//! object storage), classifies each finding as Healthy, Degraded or Critical,
//! optionally runs corrective repairs, and renders a markdown report.
//!
//! ## Architecture
//!
//! - **Tools**: 15 check tools and 5 repair tools behind one [`tools::Tool`]
//!   trait, each with a typed input validated before the handler runs
//! - **Registry**: type-erased tool table whose `safe_execute` never fails
//!   and never panics outward
//! - **Collaborators**: trait objects for every external system, built once
//!   from configuration and credentials and injected via [`tools::ToolContext`]
//! - **Orchestrator**: runs checks (concurrently, each under its own
//!   timeout), plans repairs, and summarises the run

pub mod collaborators;
pub mod config;
pub mod notify;
pub mod orchestrator;
pub mod tools;
pub mod types;

pub use collaborators::{build_context, Credentials, DependencyError};
pub use config::OpsConfig;
pub use orchestrator::{Orchestrator, RunPhase};
pub use tools::{default_registry, ToolContext, ToolRegistry};
pub use types::{CheckResult, RepairResult, RunSummary, Severity, ToolError, ToolId};
