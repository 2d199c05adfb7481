//! Database checks: connectivity, index health, referential integrity

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::time::Duration;

use super::{millis, probe, settle, CheckInput};
use crate::tools::classify::{classify_latency, classify_ratio, completion_rate};
use crate::tools::{Tool, ToolContext};
use crate::types::{CheckResult, Dependency, Severity, ToolError, ToolId};

const DEP: Dependency = Dependency::Database;

// ============================================================================
// Connectivity
// ============================================================================

pub struct DatabaseConnectivityCheck;

impl DatabaseConnectivityCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let db = ctx.database()?;
        let settings = &ctx.config().database;
        let latency = probe(DEP, input.timeout(settings.probe_timeout_ms), db.ping()).await?;
        let slow = Duration::from_millis(settings.slow_query_ms);
        let status = classify_latency(latency, slow);
        let details = match status {
            Severity::Healthy => format!("SELECT 1 in {} ms", millis(latency)),
            _ => format!(
                "SELECT 1 took {} ms (threshold {} ms)",
                millis(latency),
                settings.slow_query_ms
            ),
        };
        Ok(CheckResult::classified(ToolId::DatabaseConnectivity.as_str(), status, details)
            .with_metric("latency_ms", millis(latency)))
    }
}

#[async_trait]
impl Tool for DatabaseConnectivityCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::DatabaseConnectivity
    }

    fn description(&self) -> &'static str {
        "Round-trip a trivial query; Degraded above the slow-query threshold, Critical when unreachable"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}

// ============================================================================
// Indexes
// ============================================================================

pub struct DatabaseIndexesCheck;

impl DatabaseIndexesCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let db = ctx.database()?;
        let settings = &ctx.config().database;
        let indexes = probe(
            DEP,
            input.timeout(settings.probe_timeout_ms),
            db.list_indexes(&settings.schema),
        )
        .await?;

        let present: HashSet<&str> = indexes.iter().map(|i| i.name.as_str()).collect();
        let missing: Vec<&str> = settings
            .expected_indexes
            .iter()
            .map(String::as_str)
            .filter(|name| !present.contains(name))
            .collect();
        let invalid: Vec<&str> = indexes
            .iter()
            .filter(|i| !i.valid)
            .map(|i| i.name.as_str())
            .collect();

        let expected = settings.expected_indexes.len();
        let status = if expected > 0 && missing.len() * 2 > expected {
            Severity::Critical
        } else if !missing.is_empty() || !invalid.is_empty() {
            Severity::Degraded
        } else {
            Severity::Healthy
        };

        let details = match status {
            Severity::Healthy => format!("{} indexes in schema '{}', all valid", indexes.len(), settings.schema),
            _ => format!(
                "{} of {expected} expected indexes missing, {} invalid",
                missing.len(),
                invalid.len()
            ),
        };
        Ok(CheckResult::classified(ToolId::DatabaseIndexes.as_str(), status, details)
            .with_metric("index_count", indexes.len())
            .with_metric("expected_indexes", expected)
            .with_metric("missing_indexes", json!(missing))
            .with_metric("invalid_indexes", json!(invalid)))
    }
}

#[async_trait]
impl Tool for DatabaseIndexesCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::DatabaseIndexes
    }

    fn description(&self) -> &'static str {
        "Compare the schema's indexes against the expected set and flag invalid indexes"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}

// ============================================================================
// Integrity
// ============================================================================

pub struct DatabaseIntegrityCheck;

impl DatabaseIntegrityCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let db = ctx.database()?;
        let settings = &ctx.config().database;
        let limit = input.timeout(settings.probe_timeout_ms);

        let mut orphans_by_rule = Map::new();
        let mut orphaned_total: i64 = 0;
        for rule in &settings.orphan_rules {
            let count = probe(DEP, limit, db.count_orphans(rule)).await?;
            orphaned_total += count;
            orphans_by_rule.insert(rule.name.clone(), Value::from(count));
        }

        let counts = probe(DEP, limit, db.status_counts(&settings.analyses)).await?;
        let total = u64::try_from(counts.total).unwrap_or(0);
        let done = u64::try_from(counts.done).unwrap_or(0);
        let rate = completion_rate(done, total);

        let ratio_status = classify_ratio(rate);
        let orphan_status = if orphaned_total > 0 {
            Severity::Degraded
        } else {
            Severity::Healthy
        };
        let status = ratio_status.max(orphan_status);

        let details = format!(
            "{orphaned_total} orphaned records; {done}/{total} analyses completed ({:.1}%)",
            rate * 100.0
        );
        Ok(CheckResult::classified(ToolId::DatabaseIntegrity.as_str(), status, details)
            .with_metric("orphaned_records", orphaned_total)
            .with_metric("orphans_by_rule", Value::Object(orphans_by_rule))
            .with_metric("analyses_total", counts.total)
            .with_metric("analyses_completed", counts.done)
            .with_metric("failed_analyses", counts.failed)
            .with_metric("completion_rate", rate))
    }
}

#[async_trait]
impl Tool for DatabaseIntegrityCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::DatabaseIntegrity
    }

    fn description(&self) -> &'static str {
        "Count orphaned records per reference rule and classify the analysis completion ratio"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}
