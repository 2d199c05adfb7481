//! Speech-to-text checks: API reachability, quota, stuck transcription jobs

use async_trait::async_trait;
use std::time::Duration;

use super::{millis, probe, provider_api_result, provider_quota_result, settle, CheckInput};
use crate::tools::classify::classify_staleness;
use crate::tools::{Tool, ToolContext};
use crate::types::{CheckResult, Dependency, ToolError, ToolId};

const DEP: Dependency = Dependency::Speech;

pub struct SpeechApiCheck;

#[async_trait]
impl Tool for SpeechApiCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::SpeechApi
    }

    fn description(&self) -> &'static str {
        "List recent transcripts to confirm the speech provider is reachable and responsive"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let outcome = async {
            let speech = ctx.speech()?;
            let settings = &ctx.config().speech;
            let result = probe(DEP, input.timeout(settings.request_timeout_ms), speech.probe()).await?;
            Ok::<_, ToolError>(provider_api_result(
                self.id(),
                &result,
                Duration::from_millis(settings.slow_request_ms),
            ))
        }
        .await;
        Ok(settle(self.id(), outcome))
    }
}

pub struct SpeechQuotaCheck;

#[async_trait]
impl Tool for SpeechQuotaCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::SpeechQuota
    }

    fn description(&self) -> &'static str {
        "Read the speech provider's rate-limit headers and classify the remaining budget"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let outcome = async {
            let speech = ctx.speech()?;
            let settings = &ctx.config().speech;
            let result = probe(DEP, input.timeout(settings.request_timeout_ms), speech.probe()).await?;
            Ok::<_, ToolError>(provider_quota_result(self.id(), &result, settings.quota_warning_ratio))
        }
        .await;
        Ok(settle(self.id(), outcome))
    }
}

pub struct SpeechJobsCheck;

impl SpeechJobsCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let tool = ToolId::SpeechJobs;
        let db = ctx.database()?;
        let config = ctx.config();
        let jobs = &config.speech.jobs;
        let stuck = Duration::from_secs(jobs.stuck_minutes.saturating_mul(60));
        let expire_after = Duration::from_secs(jobs.expire_after_minutes.saturating_mul(60));

        let stale = probe(
            DEP,
            input.timeout(config.database.probe_timeout_ms),
            db.stale_jobs(jobs, stuck),
        )
        .await?;

        // Rows come back oldest first
        let Some(oldest) = stale.first() else {
            return Ok(CheckResult::healthy(
                tool.as_str(),
                format!("no jobs stuck in '{}' for {} min", jobs.processing_value, jobs.stuck_minutes),
            )
            .with_metric("stuck_jobs", 0));
        };

        let status = classify_staleness(oldest.age, stuck, jobs.critical_multiplier);
        let expirable = stale.iter().filter(|j| j.age >= expire_after).count();
        let resubmittable = stale
            .iter()
            .filter(|j| j.age < expire_after && j.media_url.is_some())
            .count();
        let oldest_minutes = oldest.age.as_secs() / 60;
        let details = format!(
            "{} jobs stuck in '{}', oldest {oldest_minutes} min",
            stale.len(),
            jobs.processing_value
        );

        Ok(CheckResult::classified(tool.as_str(), status, details)
            .with_metric("stuck_jobs", stale.len())
            .with_metric("oldest_stuck_minutes", oldest_minutes)
            .with_metric("oldest_stuck_ms", millis(oldest.age))
            .with_metric("expirable_jobs", expirable)
            .with_metric("resubmittable_jobs", resubmittable))
    }
}

#[async_trait]
impl Tool for SpeechJobsCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::SpeechJobs
    }

    fn description(&self) -> &'static str {
        "Find transcription jobs stuck in processing and classify the oldest by age"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}
