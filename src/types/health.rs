//! Severity tiers, check results and repair results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::tool::{ToolError, ToolId};

// ============================================================================
// Severity
// ============================================================================

/// Health classification of a single dependency concern.
///
/// Ordered from best to worst so `max()` yields the worst of several.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Dependency is operating normally
    Healthy,
    /// Soft signal: elevated latency, partial loss, sub-critical threshold breach
    Degraded,
    /// Hard failure: auth failure, unreachable, critical threshold breach
    Critical,
}

impl Severity {
    /// Whether a result at this tier should be routed to a repair tool.
    pub fn needs_repair(self) -> bool {
        self != Severity::Healthy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Healthy => "HEALTHY",
            Severity::Degraded => "DEGRADED",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form diagnostic metrics attached to a check result.
pub type Metrics = BTreeMap<String, Value>;

// ============================================================================
// Check Result
// ============================================================================

/// Classification produced by one check tool.
///
/// Whenever `error` is set the status is `Critical`; the constructors are the
/// only way to build one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    status: Severity,
    tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metrics: Metrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    timestamp: DateTime<Utc>,
}

impl CheckResult {
    fn new(tool_name: impl Into<String>, status: Severity) -> Self {
        Self {
            status,
            tool_name: tool_name.into(),
            details: None,
            metrics: Metrics::new(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn healthy(tool_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(tool_name, Severity::Healthy).with_details(details)
    }

    pub fn degraded(tool_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(tool_name, Severity::Degraded).with_details(details)
    }

    /// Hard failure carrying an error message.
    pub fn critical(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::new(tool_name, Severity::Critical);
        result.error = Some(error.into());
        result
    }

    /// Result of a threshold classification; no error is attached.
    pub fn classified(
        tool_name: impl Into<String>,
        status: Severity,
        details: impl Into<String>,
    ) -> Self {
        Self::new(tool_name, status).with_details(details)
    }

    /// Convert a tool-layer error into a result for `tool`.
    ///
    /// Soft dependency signals become `Degraded`; everything else is `Critical`.
    pub fn from_tool_error(tool: ToolId, error: &ToolError) -> Self {
        if error.is_degraded() {
            Self::degraded(tool.as_str(), error.to_string())
        } else {
            Self::critical(tool.as_str(), error.to_string())
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics.extend(metrics);
        self
    }

    pub fn status(&self) -> Severity {
        self.status
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metric(&self, key: &str) -> Option<&Value> {
        self.metrics.get(key)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

// ============================================================================
// Repair Result
// ============================================================================

/// Outcome of one repair tool invocation.
///
/// A dry run never reports `repaired = true`; its `actions` are the steps that
/// would have been taken.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairResult {
    repaired: bool,
    tool_name: String,
    actions: Vec<String>,
    dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_time_ms: Option<u64>,
    timestamp: DateTime<Utc>,
}

impl RepairResult {
    /// Build a result; `repaired` is forced to `false` for dry runs.
    pub fn new(
        tool_name: impl Into<String>,
        dry_run: bool,
        repaired: bool,
        actions: Vec<String>,
    ) -> Self {
        Self {
            repaired: repaired && !dry_run,
            tool_name: tool_name.into(),
            actions,
            dry_run,
            execution_time_ms: None,
            timestamp: Utc::now(),
        }
    }

    /// Simulated run listing intended steps.
    pub fn planned(tool_name: impl Into<String>, steps: Vec<String>) -> Self {
        Self::new(tool_name, true, false, steps)
    }

    pub fn with_execution_time(mut self, execution_time_ms: u64) -> Self {
        self.execution_time_ms = Some(execution_time_ms);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// The actions ran but the triggering fault is still there.
    pub fn unresolved(mut self) -> Self {
        self.repaired = false;
        self
    }

    pub fn repaired(&self) -> bool {
        self.repaired
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn execution_time_ms(&self) -> Option<u64> {
        self.execution_time_ms
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_orders_best_to_worst() {
        assert!(Severity::Healthy < Severity::Degraded);
        assert!(Severity::Degraded < Severity::Critical);
        assert_eq!(
            [Severity::Degraded, Severity::Critical, Severity::Healthy]
                .into_iter()
                .max(),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn test_critical_always_carries_error() {
        let result = CheckResult::critical("database_connectivity", "connection refused");
        assert_eq!(result.status(), Severity::Critical);
        assert_eq!(result.error(), Some("connection refused"));
    }

    #[test]
    fn test_degraded_tool_error_stays_degraded() {
        let err = ToolError::DependencyDegraded {
            dependency: crate::types::Dependency::Llm,
            reason: "rate limited".to_string(),
        };
        let result = CheckResult::from_tool_error(ToolId::LlmApi, &err);
        assert_eq!(result.status(), Severity::Degraded);
        assert!(result.error().is_none());

        let result = CheckResult::from_tool_error(ToolId::LlmApi, &ToolError::Timeout(1000));
        assert_eq!(result.status(), Severity::Critical);
        assert!(result.error().unwrap().contains("1000"));
    }

    #[test]
    fn test_dry_run_never_claims_repaired() {
        let result = RepairResult::new("slack_repair", true, true, vec!["join #ops".into()]);
        assert!(!result.repaired());
        assert!(result.dry_run());

        let live = RepairResult::new("slack_repair", false, true, Vec::new());
        assert!(live.repaired());
    }

    #[test]
    fn test_check_result_serializes_metrics_camel_case() {
        let result = CheckResult::healthy("llm_api", "ok").with_metric("latency_ms", 120);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["toolName"], "llm_api");
        assert_eq!(json["metrics"]["latency_ms"], 120);
        assert!(json.get("error").is_none());
    }
}
