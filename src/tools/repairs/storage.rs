//! Storage repair: purge stale temporary objects and zero-byte uploads

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

use super::{check_retry_attempts, default_dry_run, default_retry_attempts};
use crate::collaborators::{ObjectStore, StoredObject};
use crate::config::{defaults, StorageSettings};
use crate::tools::retry::{retry_with_backoff, RetryPolicy};
use crate::tools::{Tool, ToolContext, ToolInput};
use crate::types::{RepairResult, ToolError, ToolId};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StorageRepairInput {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Prefix whose old objects are deleted; the configured purge prefix when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purge_prefix: Option<String>,
    /// Minimum age of purged objects; the configured age when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_than_days: Option<u32>,
    /// Also delete zero-byte objects anywhere in the bucket
    #[serde(default)]
    pub remove_empty_objects: bool,
}

impl ToolInput for StorageRepairInput {
    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        check_retry_attempts(self.retry_attempts, &mut issues);
        if let Some(prefix) = self.purge_prefix.as_deref() {
            let trimmed = prefix.trim();
            if trimmed.is_empty() || trimmed == "/" {
                issues.push("purgePrefix must name a folder, not the bucket root".to_string());
            }
        }
        if let Some(days) = self.older_than_days {
            if days == 0 || days > defaults::MAX_PURGE_AGE_DAYS {
                issues.push(format!("olderThanDays must be in 1..={}", defaults::MAX_PURGE_AGE_DAYS));
            }
        }
        issues
    }
}

/// What a live run will delete.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PurgeScope {
    prefix: Option<String>,
    older_than_days: u32,
    remove_empty: bool,
}

impl PurgeScope {
    fn resolve(input: &StorageRepairInput, settings: &StorageSettings) -> Self {
        Self {
            prefix: input.purge_prefix.clone().or_else(|| settings.purge_prefix.clone()),
            older_than_days: input.older_than_days.unwrap_or(settings.purge_older_than_days),
            remove_empty: input.remove_empty_objects,
        }
    }

    fn is_empty(&self) -> bool {
        self.prefix.is_none() && !self.remove_empty
    }

    /// Saturates at the earliest representable instant, which selects nothing.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::try_days(i64::from(self.older_than_days))
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Paths selected for deletion, sorted and unique. Folder placeholders
    /// are never selected.
    fn select(&self, under_prefix: &[StoredObject], everything: &[StoredObject], now: DateTime<Utc>) -> Vec<String> {
        let cutoff = self.cutoff(now);
        let mut paths = BTreeSet::new();
        for object in under_prefix.iter().filter(|o| !o.is_folder_placeholder()) {
            if object.updated_at.is_some_and(|t| t < cutoff) {
                paths.insert(object.path.clone());
            }
        }
        if self.remove_empty {
            for object in everything.iter().filter(|o| !o.is_folder_placeholder()) {
                if object.size == Some(0) {
                    paths.insert(object.path.clone());
                }
            }
        }
        paths.into_iter().collect()
    }
}

pub struct StorageRepair;

impl StorageRepair {
    fn plan(scope: &PurgeScope, bucket: &str) -> Vec<String> {
        let mut steps = Vec::new();
        if let Some(prefix) = &scope.prefix {
            steps.push(format!(
                "would delete objects under {bucket}/{prefix} older than {} days",
                scope.older_than_days
            ));
        }
        if scope.remove_empty {
            steps.push(format!("would delete zero-byte objects in {bucket}"));
        }
        if steps.is_empty() {
            steps.push("nothing to do: no purge prefix and removeEmptyObjects is false".to_string());
        }
        steps
    }

    async fn list(
        store: &dyn ObjectStore,
        settings: &StorageSettings,
        prefix: &str,
        policy: &RetryPolicy,
        log: &mut Vec<String>,
    ) -> Option<Vec<StoredObject>> {
        let label = format!("list {}/{prefix}", settings.bucket);
        retry_with_backoff(policy, &label, log, || {
            store.list_objects(&settings.bucket, prefix, settings.max_objects)
        })
        .await
        .result
        .ok()
    }

    /// Objects under the purge prefix and across the bucket, listing only what the scope needs.
    async fn snapshot(
        store: &dyn ObjectStore,
        settings: &StorageSettings,
        scope: &PurgeScope,
        policy: &RetryPolicy,
        log: &mut Vec<String>,
    ) -> Option<(Vec<StoredObject>, Vec<StoredObject>)> {
        let under_prefix = match &scope.prefix {
            Some(prefix) => Self::list(store, settings, prefix, policy, log).await?,
            None => Vec::new(),
        };
        let everything = if scope.remove_empty {
            Self::list(store, settings, "", policy, log).await?
        } else {
            Vec::new()
        };
        Some((under_prefix, everything))
    }
}

#[async_trait]
impl Tool for StorageRepair {
    type Input = StorageRepairInput;
    type Output = RepairResult;

    fn id(&self) -> ToolId {
        ToolId::StorageRepair
    }

    fn description(&self) -> &'static str {
        "Delete old objects under the purge prefix and zero-byte objects, then re-list to confirm"
    }

    async fn call(&self, input: StorageRepairInput, ctx: &ToolContext) -> Result<RepairResult, ToolError> {
        let settings = &ctx.config().storage;
        let scope = PurgeScope::resolve(&input, settings);
        if input.dry_run {
            return Ok(RepairResult::planned(self.id().as_str(), Self::plan(&scope, &settings.bucket)));
        }
        if scope.is_empty() {
            return Ok(RepairResult::new(self.id().as_str(), false, false, Self::plan(&scope, &settings.bucket)));
        }

        let store = ctx.storage()?;
        let policy = ctx.retry_policy(input.retry_attempts);
        let mut log = Vec::new();

        let Some((under_prefix, everything)) = Self::snapshot(store, settings, &scope, &policy, &mut log).await
        else {
            return Ok(RepairResult::new(self.id().as_str(), false, false, log));
        };
        let targets = scope.select(&under_prefix, &everything, Utc::now());
        if targets.is_empty() {
            log.push("no objects matched; nothing deleted".to_string());
            return Ok(RepairResult::new(self.id().as_str(), false, false, log));
        }

        let label = format!("delete {} objects", targets.len());
        let deleted = retry_with_backoff(&policy, &label, &mut log, || {
            store.delete_objects(&settings.bucket, &targets)
        })
        .await;
        let Ok(count) = deleted.result else {
            return Ok(RepairResult::new(self.id().as_str(), false, false, log));
        };
        log.push(format!("storage reported {count} of {} objects removed", targets.len()));

        let repaired = match Self::snapshot(store, settings, &scope, &policy, &mut log).await {
            Some((under_prefix, everything)) => {
                let remaining = under_prefix
                    .iter()
                    .chain(everything.iter())
                    .filter(|o| targets.contains(&o.path))
                    .count();
                if remaining == 0 {
                    log.push("verify: deleted objects no longer listed".to_string());
                } else {
                    log.push(format!("verify: {remaining} targeted objects still listed"));
                }
                remaining == 0
            }
            None => {
                log.push("verify: re-listing failed".to_string());
                false
            }
        };
        info!(tool = %self.id(), targeted = targets.len(), deleted = count, repaired, "Storage repair finished");
        Ok(RepairResult::new(self.id().as_str(), false, repaired, log))
    }
}
