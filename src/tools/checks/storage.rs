//! Object storage checks: usage against quota, object integrity, bucket access

use async_trait::async_trait;

use super::{probe, settle, CheckInput};
use crate::collaborators::{DependencyError, StoredObject};
use crate::tools::classify::{classify_ratio, classify_usage, completion_rate};
use crate::tools::{Tool, ToolContext};
use crate::types::{CheckResult, Dependency, Severity, ToolError, ToolId};

const DEP: Dependency = Dependency::Storage;

/// Every object in the bucket except folder placeholders.
async fn enumerate(input: &CheckInput, ctx: &ToolContext) -> Result<Vec<StoredObject>, ToolError> {
    let store = ctx.storage()?;
    let settings = &ctx.config().storage;
    let mut objects = probe(
        DEP,
        input.timeout(settings.request_timeout_ms),
        store.list_objects(&settings.bucket, "", settings.max_objects),
    )
    .await?;
    objects.retain(|o| !o.is_folder_placeholder());
    Ok(objects)
}

// ============================================================================
// Usage
// ============================================================================

pub struct StorageUsageCheck;

impl StorageUsageCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let settings = &ctx.config().storage;
        let objects = enumerate(input, ctx).await?;
        let used_bytes: u64 = objects.iter().filter_map(|o| o.size).sum();
        let usage = used_bytes as f64 / settings.quota_bytes.max(1) as f64;
        let status = classify_usage(usage, settings.usage_warning_ratio, settings.usage_critical_ratio);
        let truncated = objects.len() >= settings.max_objects;

        let mut details = format!(
            "{used_bytes} of {} bytes used ({:.1}%) across {} objects",
            settings.quota_bytes,
            usage * 100.0,
            objects.len()
        );
        if truncated {
            details.push_str(" (enumeration truncated)");
        }
        Ok(CheckResult::classified(ToolId::StorageUsage.as_str(), status, details)
            .with_metric("used_bytes", used_bytes)
            .with_metric("quota_bytes", settings.quota_bytes)
            .with_metric("usage_ratio", usage)
            .with_metric("object_count", objects.len())
            .with_metric("truncated", truncated))
    }
}

#[async_trait]
impl Tool for StorageUsageCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::StorageUsage
    }

    fn description(&self) -> &'static str {
        "Enumerate the bucket, sum object sizes and compare against the configured quota"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}

// ============================================================================
// Integrity
// ============================================================================

pub struct StorageIntegrityCheck;

impl StorageIntegrityCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let objects = enumerate(input, ctx).await?;
        let empty = objects.iter().filter(|o| o.size == Some(0)).count();
        let unreadable = objects.iter().filter(|o| o.size.is_none()).count();
        let bad = empty + unreadable;
        let good = objects.len() - bad;
        let rate = completion_rate(good as u64, objects.len() as u64);

        let status = if bad > 0 {
            classify_ratio(rate).max(Severity::Degraded)
        } else {
            Severity::Healthy
        };
        let details = format!(
            "{good}/{} objects intact; {empty} empty, {unreadable} without metadata",
            objects.len()
        );
        Ok(CheckResult::classified(ToolId::StorageIntegrity.as_str(), status, details)
            .with_metric("object_count", objects.len())
            .with_metric("empty_objects", empty)
            .with_metric("unreadable_objects", unreadable)
            .with_metric("integrity_rate", rate))
    }
}

#[async_trait]
impl Tool for StorageIntegrityCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::StorageIntegrity
    }

    fn description(&self) -> &'static str {
        "Flag zero-byte objects and objects without readable metadata"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}

// ============================================================================
// Permissions
// ============================================================================

pub struct StoragePermissionsCheck;

impl StoragePermissionsCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let tool = ToolId::StoragePermissions;
        let store = ctx.storage()?;
        let settings = &ctx.config().storage;
        let buckets = probe(DEP, input.timeout(settings.request_timeout_ms), store.list_buckets()).await?;

        let Some(bucket) = buckets.iter().find(|b| b.name == settings.bucket) else {
            return Err(ToolError::from_dependency(
                DEP,
                DependencyError::NotFound(format!("bucket '{}'", settings.bucket)),
            ));
        };

        let result = if bucket.public && settings.expect_private {
            CheckResult::degraded(
                tool.as_str(),
                format!("bucket '{}' is public but expected private", bucket.name),
            )
        } else {
            CheckResult::healthy(tool.as_str(), format!("bucket '{}' accessible", bucket.name))
        };
        Ok(result
            .with_metric("bucket", bucket.name.as_str())
            .with_metric("public", bucket.public)
            .with_metric("buckets_visible", buckets.len()))
    }
}

#[async_trait]
impl Tool for StoragePermissionsCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::StoragePermissions
    }

    fn description(&self) -> &'static str {
        "List buckets with the service key, confirm the bucket exists and has the expected visibility"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}
