//! Aggregate result of one orchestrator run

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use uuid::Uuid;

use super::health::{CheckResult, RepairResult, Severity};

/// Everything one orchestrator run produced.
///
/// Counts are derived from the result arrays on demand and cannot drift from them.
#[derive(Debug, Clone)]
pub struct RunSummary {
    run_id: Uuid,
    timestamp: DateTime<Utc>,
    total_time_ms: u64,
    check_results: Vec<CheckResult>,
    repair_results: Vec<RepairResult>,
}

impl RunSummary {
    pub fn new(
        run_id: Uuid,
        timestamp: DateTime<Utc>,
        total_time_ms: u64,
        check_results: Vec<CheckResult>,
        repair_results: Vec<RepairResult>,
    ) -> Self {
        Self {
            run_id,
            timestamp,
            total_time_ms,
            check_results,
            repair_results,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn total_time_ms(&self) -> u64 {
        self.total_time_ms
    }

    pub fn check_results(&self) -> &[CheckResult] {
        &self.check_results
    }

    pub fn repair_results(&self) -> &[RepairResult] {
        &self.repair_results
    }

    fn count_status(&self, status: Severity) -> usize {
        self.check_results
            .iter()
            .filter(|r| r.status() == status)
            .count()
    }

    pub fn healthy_count(&self) -> usize {
        self.count_status(Severity::Healthy)
    }

    pub fn degraded_count(&self) -> usize {
        self.count_status(Severity::Degraded)
    }

    pub fn critical_count(&self) -> usize {
        self.count_status(Severity::Critical)
    }

    pub fn repair_success_count(&self) -> usize {
        self.repair_results.iter().filter(|r| r.repaired()).count()
    }

    /// Live repairs that did not resolve their trigger.
    pub fn repair_failure_count(&self) -> usize {
        self.repair_results
            .iter()
            .filter(|r| !r.repaired() && !r.dry_run())
            .count()
    }

    pub fn repair_dry_run_count(&self) -> usize {
        self.repair_results.iter().filter(|r| r.dry_run()).count()
    }

    /// Worst severity across all checks (`Healthy` when there are none).
    pub fn overall(&self) -> Severity {
        self.check_results
            .iter()
            .map(CheckResult::status)
            .max()
            .unwrap_or(Severity::Healthy)
    }
}

impl Serialize for RunSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RunSummary", 12)?;
        s.serialize_field("runId", &self.run_id)?;
        s.serialize_field("timestamp", &self.timestamp)?;
        s.serialize_field("totalTimeMs", &self.total_time_ms)?;
        s.serialize_field("overall", &self.overall())?;
        s.serialize_field("healthyCount", &self.healthy_count())?;
        s.serialize_field("degradedCount", &self.degraded_count())?;
        s.serialize_field("criticalCount", &self.critical_count())?;
        s.serialize_field("repairSuccessCount", &self.repair_success_count())?;
        s.serialize_field("repairFailureCount", &self.repair_failure_count())?;
        s.serialize_field("repairDryRunCount", &self.repair_dry_run_count())?;
        s.serialize_field("checkResults", &self.check_results)?;
        s.serialize_field("repairResults", &self.repair_results)?;
        s.end()
    }
}
