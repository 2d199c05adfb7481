//! Orchestrator - one health run from checks to report
//!
//! ```text
//! Idle -> RunningChecks -> DecidingRepairs -> RunningRepairs -> Reporting -> Done
//! ```
//!
//! Every registered check runs (concurrently by default), each raced against
//! its own `check_timeout_ms`. A check that times out becomes a `Critical`
//! result for that check only; the others are unaffected. When auto-repair is
//! enabled, Degraded and Critical results queue their dependency's repair
//! once. A live repair that claims success re-runs the checks that queued it
//! and only stays `repaired` if all of them now pass. `Done` is always
//! reached and `execute` never fails.

mod planner;
mod report;

pub use planner::{plan_repairs, PlannedRepair};
pub use report::render as render_report;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{CheckResult, RepairResult, RunSummary, ToolError, ToolId};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    RunningChecks,
    DecidingRepairs,
    RunningRepairs,
    Reporting,
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::RunningChecks => "running_checks",
            RunPhase::DecidingRepairs => "deciding_repairs",
            RunPhase::RunningRepairs => "running_repairs",
            RunPhase::Reporting => "reporting",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    ctx: Arc<ToolContext>,
    settings: OrchestratorConfig,
    phase: RunPhase,
}

impl Orchestrator {
    /// Orchestrator using the `[orchestrator]` section of the context's config.
    pub fn new(registry: Arc<ToolRegistry>, ctx: Arc<ToolContext>) -> Self {
        let settings = ctx.config().orchestrator.clone();
        Self {
            registry,
            ctx,
            settings,
            phase: RunPhase::Idle,
        }
    }

    /// Replace the orchestrator settings (CLI overrides).
    pub fn with_settings(mut self, settings: OrchestratorConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &OrchestratorConfig {
        &self.settings
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn transition(&mut self, next: RunPhase) {
        info!(from = %self.phase, to = %next, "Run phase changed");
        self.phase = next;
    }

    /// Run every check, optionally repair, and summarise.
    pub async fn execute(&mut self) -> RunSummary {
        let run_id = Uuid::new_v4();
        let timestamp = Utc::now();
        let started = Instant::now();
        info!(
            %run_id,
            parallel_checks = self.settings.enable_parallel_checks,
            auto_repair = self.settings.enable_auto_repair,
            dry_run = self.settings.dry_run,
            "Starting health run"
        );

        self.transition(RunPhase::RunningChecks);
        let check_results = self.run_checks().await;

        self.transition(RunPhase::DecidingRepairs);
        let planned = if self.settings.enable_auto_repair {
            plan_repairs(&check_results, self.ctx.config(), &self.settings)
        } else {
            Vec::new()
        };
        for repair in &planned {
            info!(tool = %repair.tool, triggered_by = ?repair.triggered_by, "Repair queued");
        }

        self.transition(RunPhase::RunningRepairs);
        let repair_results = self.run_repairs(planned).await;

        self.transition(RunPhase::Reporting);
        let summary = RunSummary::new(
            run_id,
            timestamp,
            elapsed_ms(started),
            check_results,
            repair_results,
        );
        info!(
            %run_id,
            overall = %summary.overall(),
            healthy = summary.healthy_count(),
            degraded = summary.degraded_count(),
            critical = summary.critical_count(),
            repaired = summary.repair_success_count(),
            repair_failures = summary.repair_failure_count(),
            repair_dry_runs = summary.repair_dry_run_count(),
            total_time_ms = summary.total_time_ms(),
            "Health run complete"
        );

        self.transition(RunPhase::Done);
        summary
    }

    /// Markdown report for a finished run.
    pub fn generate_report(&self, summary: &RunSummary) -> String {
        render_report(&self.ctx.config().notify.report_title, summary)
    }

    async fn run_checks(&self) -> Vec<CheckResult> {
        let ids = self.registry.check_tools();
        if self.settings.enable_parallel_checks {
            // join_all keeps input order, so results stay in registration order
            join_all(ids.iter().map(|&id| self.run_check(id))).await
        } else {
            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                results.push(self.run_check(id).await);
            }
            results
        }
    }

    async fn run_check(&self, id: ToolId) -> CheckResult {
        let limit_ms = self.settings.check_timeout_ms;
        let call = self.registry.safe_execute(id.as_str(), json!({}), &self.ctx);
        let Ok(execution) = timeout(Duration::from_millis(limit_ms), call).await else {
            warn!(tool = %id, timeout_ms = limit_ms, "Check timed out");
            return CheckResult::from_tool_error(id, &ToolError::Timeout(limit_ms))
                .with_metric("execution_time_ms", limit_ms);
        };

        let elapsed = execution.execution_time_ms();
        let result = match execution.into_result() {
            Ok(output) => output.into_check().unwrap_or_else(|| {
                CheckResult::critical(id.as_str(), "tool returned a repair result")
            }),
            Err(error) => CheckResult::critical(id.as_str(), error),
        };
        info!(tool = %id, status = %result.status(), elapsed_ms = elapsed, "Check finished");
        result.with_metric("execution_time_ms", elapsed)
    }

    async fn run_repairs(&self, planned: Vec<PlannedRepair>) -> Vec<RepairResult> {
        if self.settings.enable_parallel_repairs {
            join_all(planned.into_iter().map(|p| self.run_repair(p))).await
        } else {
            let mut results = Vec::with_capacity(planned.len());
            for repair in planned {
                results.push(self.run_repair(repair).await);
            }
            results
        }
    }

    async fn run_repair(&self, planned: PlannedRepair) -> RepairResult {
        let id = planned.tool;
        let dry_run = planned
            .input
            .get("dryRun")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let limit_ms = self.settings.repair_timeout_ms;
        let call = self.registry.safe_execute(id.as_str(), planned.input, &self.ctx);
        let Ok(execution) = timeout(Duration::from_millis(limit_ms), call).await else {
            warn!(tool = %id, timeout_ms = limit_ms, "Repair timed out");
            return RepairResult::new(
                id.as_str(),
                dry_run,
                false,
                vec![format!("timed out after {limit_ms} ms")],
            )
            .with_execution_time(limit_ms);
        };

        let elapsed = execution.execution_time_ms();
        let mut result = match execution.into_result() {
            Ok(output) => output.into_repair().unwrap_or_else(|| {
                RepairResult::new(id.as_str(), dry_run, false, vec!["tool returned a check result".into()])
            }),
            Err(error) => RepairResult::new(id.as_str(), dry_run, false, vec![format!("failed: {error}")]),
        };
        if result.repaired() {
            result = self.recheck(result, &planned.triggered_by).await;
        }
        info!(
            tool = %id,
            repaired = result.repaired(),
            dry_run = result.dry_run(),
            elapsed_ms = elapsed,
            "Repair finished"
        );
        result.with_execution_time(elapsed)
    }

    /// Re-run the checks that queued a repair against the repaired dependency.
    async fn recheck(&self, mut result: RepairResult, triggered_by: &[String]) -> RepairResult {
        let mut resolved = true;
        for name in triggered_by {
            let Ok(check) = name.parse::<ToolId>() else {
                continue;
            };
            let after = self.run_check(check).await;
            if after.status().needs_repair() {
                resolved = false;
                result = result.with_action(format!("recheck: {check} still {}", after.status()));
            } else {
                result = result.with_action(format!("recheck: {check} healthy"));
            }
        }
        if resolved {
            result
        } else {
            warn!(tool = result.tool_name(), "Repair ran but its triggering checks still fail");
            result.unresolved()
        }
    }
}
