//! Speech repair: resubmit or expire transcription jobs stuck in processing

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::{check_retry_attempts, default_dry_run, default_retry_attempts};
use crate::collaborators::{Database, SpeechApi, StaleJob};
use crate::config::JobTable;
use crate::tools::retry::{retry_with_backoff, RetryPolicy};
use crate::tools::{Tool, ToolContext, ToolInput};
use crate::types::{RepairResult, ToolError, ToolId};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpeechRepairInput {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Resubmit stuck jobs that still have their media URL
    #[serde(default = "default_requeue_stuck")]
    pub requeue_stuck: bool,
    /// Jobs stuck at least this long are expired instead of resubmitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_minutes: Option<u64>,
    /// Upper bound on jobs touched in one run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_jobs: Option<usize>,
}

fn default_requeue_stuck() -> bool {
    true
}

impl ToolInput for SpeechRepairInput {
    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        check_retry_attempts(self.retry_attempts, &mut issues);
        if self.expire_after_minutes == Some(0) {
            issues.push("expireAfterMinutes must be positive".to_string());
        }
        if self.max_jobs == Some(0) {
            issues.push("maxJobs must be positive".to_string());
        }
        issues
    }
}

pub struct SpeechRepair;

/// Jobs split by what the repair will do with them.
#[derive(Debug, Default)]
struct Triage<'a> {
    expire: Vec<&'a StaleJob>,
    resubmit: Vec<&'a StaleJob>,
    skipped: Vec<&'a StaleJob>,
}

fn triage(stale: &[StaleJob], expire_after: Duration, requeue: bool) -> Triage<'_> {
    let mut triage = Triage::default();
    for job in stale {
        if job.age >= expire_after {
            triage.expire.push(job);
        } else if requeue && job.media_url.is_some() {
            triage.resubmit.push(job);
        } else {
            triage.skipped.push(job);
        }
    }
    triage
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m.saturating_mul(60))
}

impl SpeechRepair {
    fn plan(input: &SpeechRepairInput, jobs: &JobTable) -> Vec<String> {
        let expire_after = input.expire_after_minutes.unwrap_or(jobs.expire_after_minutes);
        let mut steps = vec![
            "would check the speech provider answers before touching any job".to_string(),
            format!(
                "would list jobs in {} stuck in '{}' for at least {} min",
                jobs.table, jobs.processing_value, jobs.stuck_minutes
            ),
            format!("would mark jobs stuck for at least {expire_after} min as '{}'", jobs.expired_value),
        ];
        if input.requeue_stuck {
            steps.push("would resubmit remaining jobs that still have a media URL".to_string());
        }
        if let Some(max) = input.max_jobs {
            steps.push(format!("would touch at most {max} jobs"));
        }
        steps
    }

    async fn resubmit(
        db: &dyn Database,
        speech: &dyn SpeechApi,
        jobs: &JobTable,
        job: &StaleJob,
        policy: &RetryPolicy,
        log: &mut Vec<String>,
    ) -> bool {
        let Some(url) = job.media_url.as_deref() else {
            return false;
        };
        let label = format!("resubmit job {}", job.id);
        let submitted = retry_with_backoff(policy, &label, log, || speech.submit_transcription(url)).await;
        let Ok(external_id) = submitted.result else {
            return false;
        };
        let label = format!("requeue job {} as {external_id}", job.id);
        retry_with_backoff(policy, &label, log, || db.requeue_job(jobs, &job.id, &external_id))
            .await
            .succeeded()
    }
}

#[async_trait]
impl Tool for SpeechRepair {
    type Input = SpeechRepairInput;
    type Output = RepairResult;

    fn id(&self) -> ToolId {
        ToolId::SpeechRepair
    }

    fn description(&self) -> &'static str {
        "Resubmit stuck transcription jobs or expire ones past the cutoff, then confirm none remain stuck"
    }

    async fn call(&self, input: SpeechRepairInput, ctx: &ToolContext) -> Result<RepairResult, ToolError> {
        let jobs = &ctx.config().speech.jobs;
        if input.dry_run {
            return Ok(RepairResult::planned(self.id().as_str(), Self::plan(&input, jobs)));
        }

        let db = ctx.database()?;
        let speech = ctx.speech()?;
        let policy = ctx.retry_policy(input.retry_attempts);
        let stuck = minutes(jobs.stuck_minutes);
        let expire_after = minutes(input.expire_after_minutes.unwrap_or(jobs.expire_after_minutes));
        let mut log = Vec::new();

        let reached = retry_with_backoff(&policy, "reach speech provider", &mut log, || speech.probe()).await;
        match reached.result {
            Ok(answer) => log.push(format!("provider answered in {} ms", answer.latency.as_millis())),
            Err(_) => {
                log.push("speech provider unavailable, no jobs touched".to_string());
                return Ok(RepairResult::new(self.id().as_str(), false, false, log));
            }
        }

        let listed = retry_with_backoff(&policy, "list stuck jobs", &mut log, || db.stale_jobs(jobs, stuck)).await;
        let Ok(mut stale) = listed.result else {
            return Ok(RepairResult::new(self.id().as_str(), false, false, log));
        };
        if stale.is_empty() {
            log.push("no stuck jobs found".to_string());
            return Ok(RepairResult::new(self.id().as_str(), false, true, log));
        }
        if let Some(max) = input.max_jobs {
            stale.truncate(max);
        }

        let plan = triage(&stale, expire_after, input.requeue_stuck);
        let mut all_ok = true;
        let mut touched: Vec<String> = Vec::new();

        if !plan.expire.is_empty() {
            let ids: Vec<String> = plan.expire.iter().map(|j| j.id.clone()).collect();
            let label = format!("expire {} jobs", ids.len());
            let expired = retry_with_backoff(&policy, &label, &mut log, || db.expire_jobs(jobs, &ids)).await;
            match expired.result {
                Ok(count) => {
                    log.push(format!("marked {count} jobs as '{}'", jobs.expired_value));
                    touched.extend(ids);
                }
                Err(_) => all_ok = false,
            }
        }

        for job in &plan.resubmit {
            if Self::resubmit(db, speech, jobs, job, &policy, &mut log).await {
                touched.push(job.id.clone());
            } else {
                all_ok = false;
            }
        }

        for job in &plan.skipped {
            log.push(format!("job {} left untouched: no media URL or requeue disabled", job.id));
        }

        let verified = match db.stale_jobs(jobs, stuck).await {
            Ok(remaining) => {
                let still_stuck = remaining.iter().filter(|j| touched.contains(&j.id)).count();
                if still_stuck > 0 {
                    log.push(format!("verify: {still_stuck} repaired jobs still stuck"));
                } else {
                    log.push(format!("verify: {} jobs no longer stuck", touched.len()));
                }
                still_stuck == 0
            }
            Err(e) => {
                log.push(format!("verify: listing jobs failed: {e}"));
                false
            }
        };

        let repaired = all_ok && verified && plan.skipped.is_empty();
        info!(
            tool = %self.id(),
            expired = plan.expire.len(),
            resubmitted = plan.resubmit.len(),
            skipped = plan.skipped.len(),
            repaired,
            "Speech repair finished"
        );
        Ok(RepairResult::new(self.id().as_str(), false, repaired, log))
    }
}
