//! Language-model repair: re-establish the provider connection and optionally
//! put failed analyses back in the queue.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_retry_attempts, default_dry_run, default_retry_attempts};
use crate::config::AnalysisTable;
use crate::tools::retry::retry_with_backoff;
use crate::tools::{Tool, ToolContext, ToolInput};
use crate::types::{RepairResult, ToolError, ToolId};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LlmRepairInput {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Move failed analyses back to pending once the provider answers
    #[serde(default)]
    pub requeue_failed_analyses: bool,
}

impl ToolInput for LlmRepairInput {
    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        check_retry_attempts(self.retry_attempts, &mut issues);
        issues
    }
}

pub struct LlmRepair;

impl LlmRepair {
    fn plan(input: &LlmRepairInput, analyses: &AnalysisTable) -> Vec<String> {
        let mut steps = vec![format!(
            "would probe the model provider (up to {} attempts)",
            input.retry_attempts
        )];
        if input.requeue_failed_analyses {
            steps.push(format!(
                "would set {}.{} from '{}' to '{}'",
                analyses.table, analyses.status_column, analyses.failed_value, analyses.pending_value
            ));
        }
        steps
    }
}

#[async_trait]
impl Tool for LlmRepair {
    type Input = LlmRepairInput;
    type Output = RepairResult;

    fn id(&self) -> ToolId {
        ToolId::LlmRepair
    }

    fn description(&self) -> &'static str {
        "Retry the model provider with backoff and optionally requeue failed analyses"
    }

    async fn call(&self, input: LlmRepairInput, ctx: &ToolContext) -> Result<RepairResult, ToolError> {
        let analyses = &ctx.config().database.analyses;
        if input.dry_run {
            return Ok(RepairResult::planned(self.id().as_str(), Self::plan(&input, analyses)));
        }

        let llm = ctx.llm()?;
        let policy = ctx.retry_policy(input.retry_attempts);
        let mut log = Vec::new();

        let probed = retry_with_backoff(&policy, "probe model provider", &mut log, || llm.probe()).await;
        let probe = match probed.result {
            Ok(probe) => probe,
            Err(_) => return Ok(RepairResult::new(self.id().as_str(), false, false, log)),
        };
        log.push(format!(
            "provider answered in {} ms with {} models",
            probe.latency.as_millis(),
            probe.model_count
        ));

        if !input.requeue_failed_analyses {
            return Ok(RepairResult::new(self.id().as_str(), false, true, log));
        }

        let db = ctx.database()?;
        let label = format!("requeue failed analyses in {}", analyses.table);
        let reset = retry_with_backoff(&policy, &label, &mut log, || {
            db.reset_status(analyses, &analyses.failed_value, &analyses.pending_value)
        })
        .await;
        let Ok(moved) = reset.result else {
            return Ok(RepairResult::new(self.id().as_str(), false, false, log));
        };
        log.push(format!("moved {moved} analyses back to '{}'", analyses.pending_value));

        let repaired = match db.status_counts(analyses).await {
            Ok(counts) if counts.failed == 0 => {
                log.push("verify: no failed analyses remain".to_string());
                true
            }
            Ok(counts) => {
                log.push(format!("verify: {} analyses still failed", counts.failed));
                false
            }
            Err(e) => {
                log.push(format!("verify: counting analyses failed: {e}"));
                false
            }
        };
        info!(tool = %self.id(), requeued = moved, repaired, "LLM repair finished");
        Ok(RepairResult::new(self.id().as_str(), false, repaired, log))
    }
}
