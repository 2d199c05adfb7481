//! Check tools: side-effect-free probes classified into a severity
//!
//! A check never returns `Err` for a dependency problem. Missing credentials,
//! probe failures and probe timeouts are folded into the `CheckResult`
//! (`Critical`, or `Degraded` for rate limiting) so the orchestrator sees the
//! same shape for every outcome.

use schemars::JsonSchema;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use super::classify::{classify_latency, classify_remaining};
use super::{ToolInput, ToolRegistry};
use crate::collaborators::{DependencyError, ProviderProbe};
use crate::types::{CheckResult, Dependency, Metrics, Severity, ToolError, ToolId};

mod database;
mod llm;
mod slack;
mod speech;
mod storage;

pub use database::{DatabaseConnectivityCheck, DatabaseIndexesCheck, DatabaseIntegrityCheck};
pub use llm::{LlmApiCheck, LlmQuotaCheck};
pub use slack::{SlackConnectivityCheck, SlackEventFlowCheck, SlackPermissionsCheck, SlackSendPathCheck};
pub use speech::{SpeechApiCheck, SpeechJobsCheck, SpeechQuotaCheck};
pub use storage::{StorageIntegrityCheck, StoragePermissionsCheck, StorageUsageCheck};

/// Input shared by every check tool. The orchestrator passes `{}`.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckInput {
    /// Override for the per-probe timeout (ms)
    #[serde(default)]
    pub probe_timeout_ms: Option<u64>,
}

impl ToolInput for CheckInput {
    fn validate(&self) -> Vec<String> {
        match self.probe_timeout_ms {
            Some(0) => vec!["probeTimeoutMs must be > 0".to_string()],
            _ => Vec::new(),
        }
    }
}

impl CheckInput {
    pub(crate) fn timeout(&self, default_ms: u64) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.unwrap_or(default_ms))
    }
}

/// Register all 15 check tools in canonical order.
pub fn register_all(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    registry.register(DatabaseConnectivityCheck)?;
    registry.register(DatabaseIndexesCheck)?;
    registry.register(DatabaseIntegrityCheck)?;
    registry.register(SlackConnectivityCheck)?;
    registry.register(SlackPermissionsCheck)?;
    registry.register(SlackEventFlowCheck)?;
    registry.register(SlackSendPathCheck)?;
    registry.register(SpeechApiCheck)?;
    registry.register(SpeechQuotaCheck)?;
    registry.register(SpeechJobsCheck)?;
    registry.register(LlmApiCheck)?;
    registry.register(LlmQuotaCheck)?;
    registry.register(StorageUsageCheck)?;
    registry.register(StorageIntegrityCheck)?;
    registry.register(StoragePermissionsCheck)?;
    Ok(())
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Race one collaborator call against `limit`.
pub(crate) async fn probe<T, F>(dependency: Dependency, limit: Duration, call: F) -> Result<T, ToolError>
where
    F: Future<Output = Result<T, DependencyError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ToolError::from_dependency(dependency, e)),
        Err(_) => Err(ToolError::from_dependency(dependency, DependencyError::Timeout)),
    }
}

/// Fold an evaluation error into the result for `tool`.
pub(crate) fn settle(tool: ToolId, outcome: Result<CheckResult, ToolError>) -> CheckResult {
    outcome.unwrap_or_else(|e| {
        tracing::debug!(tool = %tool, error = %e, "Check reported failure");
        CheckResult::from_tool_error(tool, &e)
    })
}

pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Provider reachability classified on latency.
pub(crate) fn provider_api_result(tool: ToolId, probe: &ProviderProbe, slow: Duration) -> CheckResult {
    let status = classify_latency(probe.latency, slow);
    let details = match status {
        Severity::Healthy => format!(
            "{} reachable in {} ms",
            tool.dependency(),
            millis(probe.latency)
        ),
        _ => format!(
            "{} slow: {} ms (threshold {} ms)",
            tool.dependency(),
            millis(probe.latency),
            millis(slow)
        ),
    };
    CheckResult::classified(tool.as_str(), status, details)
        .with_metric("latency_ms", millis(probe.latency))
        .with_metric("models_listed", probe.model_count)
}

/// Provider quota classified on the tighter of the request and token budgets.
pub(crate) fn provider_quota_result(tool: ToolId, probe: &ProviderProbe, warning_ratio: f64) -> CheckResult {
    let budgets: Vec<(&str, _)> = [("requests", probe.requests), ("tokens", probe.tokens)]
        .into_iter()
        .filter_map(|(name, info)| info.map(|i| (name, i)))
        .collect();

    if budgets.is_empty() {
        return CheckResult::healthy(tool.as_str(), "provider reports no rate-limit headers")
            .with_metric("quota_reported", false);
    }

    let mut status = Severity::Healthy;
    let mut notes = Vec::new();
    let mut metrics = Metrics::new();
    for (name, info) in &budgets {
        status = status.max(classify_remaining(info, warning_ratio));
        notes.push(format!("{name} {}/{}", info.remaining, info.limit));
        metrics.insert(format!("{name}_remaining"), info.remaining.into());
        metrics.insert(format!("{name}_limit"), info.limit.into());
        if let Some(reset) = info.reset_after {
            metrics.insert(format!("{name}_reset_ms"), millis(reset).into());
        }
    }

    CheckResult::classified(tool.as_str(), status, format!("{status} quota: {}", notes.join(", ")))
        .with_metrics(metrics)
        .with_metric("quota_reported", true)
}
