//! Database repair: reconnect, rebuild invalid indexes, remove orphaned rows

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_retry_attempts, default_dry_run, default_retry_attempts};
use crate::collaborators::Database;
use crate::config::validation::is_safe_identifier;
use crate::config::DatabaseSettings;
use crate::tools::retry::{retry_with_backoff, RetryPolicy};
use crate::tools::{Tool, ToolContext, ToolInput};
use crate::types::{RepairResult, ToolError, ToolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseAction {
    /// Re-establish a working connection
    Reconnect,
    /// `REINDEX INDEX` each entry of `indexes`
    Reindex,
    /// Delete child rows whose parent no longer exists
    CleanOrphans,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatabaseRepairInput {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_actions")]
    pub actions: Vec<DatabaseAction>,
    /// Index names to rebuild (required with `reindex`)
    #[serde(default)]
    pub indexes: Vec<String>,
}

fn default_actions() -> Vec<DatabaseAction> {
    vec![DatabaseAction::Reconnect]
}

impl ToolInput for DatabaseRepairInput {
    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        check_retry_attempts(self.retry_attempts, &mut issues);
        if self.actions.is_empty() {
            issues.push("actions must not be empty".to_string());
        }
        if self.actions.contains(&DatabaseAction::Reindex) && self.indexes.is_empty() {
            issues.push("reindex requires at least one entry in indexes".to_string());
        }
        for index in &self.indexes {
            if !is_safe_identifier(index) {
                issues.push(format!("index '{index}' is not a plain SQL identifier"));
            }
        }
        issues
    }
}

impl DatabaseRepairInput {
    /// Requested actions without duplicates, in request order.
    fn actions(&self) -> Vec<DatabaseAction> {
        let mut unique = Vec::new();
        for action in &self.actions {
            if !unique.contains(action) {
                unique.push(*action);
            }
        }
        unique
    }
}

pub struct DatabaseRepair;

impl DatabaseRepair {
    fn plan(input: &DatabaseRepairInput, settings: &DatabaseSettings) -> Vec<String> {
        let mut steps = Vec::new();
        for action in input.actions() {
            match action {
                DatabaseAction::Reconnect => steps.push(format!(
                    "would ping the database (up to {} attempts)",
                    input.retry_attempts
                )),
                DatabaseAction::Reindex => {
                    for index in &input.indexes {
                        steps.push(format!("would run REINDEX INDEX {}.{index}", settings.schema));
                    }
                }
                DatabaseAction::CleanOrphans => {
                    for rule in &settings.orphan_rules {
                        steps.push(format!(
                            "would delete rows of {}.{} without a matching {}.{} ({})",
                            rule.child_table,
                            rule.child_column,
                            rule.parent_table,
                            rule.parent_column,
                            rule.name
                        ));
                    }
                }
            }
        }
        steps
    }

    async fn apply(
        db: &dyn Database,
        input: &DatabaseRepairInput,
        settings: &DatabaseSettings,
        policy: &RetryPolicy,
        log: &mut Vec<String>,
    ) -> bool {
        let mut all_ok = true;
        for action in input.actions() {
            match action {
                DatabaseAction::Reconnect => {
                    let outcome = retry_with_backoff(policy, "ping database", log, || db.ping()).await;
                    if !outcome.succeeded() {
                        log.push("database unreachable, skipping remaining steps".to_string());
                        return false;
                    }
                }
                DatabaseAction::Reindex => {
                    for index in &input.indexes {
                        let label = format!("REINDEX INDEX {}.{index}", settings.schema);
                        let outcome = retry_with_backoff(policy, &label, log, || {
                            db.reindex(&settings.schema, index)
                        })
                        .await;
                        all_ok &= outcome.succeeded();
                    }
                }
                DatabaseAction::CleanOrphans => {
                    for rule in &settings.orphan_rules {
                        let label = format!("delete orphans ({})", rule.name);
                        let outcome =
                            retry_with_backoff(policy, &label, log, || db.delete_orphans(rule)).await;
                        match outcome.result {
                            Ok(removed) => log.push(format!("{}: removed {removed} rows", rule.name)),
                            Err(_) => all_ok = false,
                        }
                    }
                }
            }
        }
        all_ok
    }

    /// Re-check what the repair touched.
    async fn verify(
        db: &dyn Database,
        input: &DatabaseRepairInput,
        settings: &DatabaseSettings,
        log: &mut Vec<String>,
    ) -> bool {
        let mut verified = true;
        match db.ping().await {
            Ok(latency) => log.push(format!("verify: ping ok in {} ms", latency.as_millis())),
            Err(e) => {
                log.push(format!("verify: ping failed: {e}"));
                return false;
            }
        }

        let actions = input.actions();
        if actions.contains(&DatabaseAction::Reindex) {
            match db.list_indexes(&settings.schema).await {
                Ok(indexes) => {
                    for target in &input.indexes {
                        let valid = indexes.iter().any(|i| &i.name == target && i.valid);
                        if !valid {
                            log.push(format!("verify: index {target} still missing or invalid"));
                            verified = false;
                        }
                    }
                }
                Err(e) => {
                    log.push(format!("verify: listing indexes failed: {e}"));
                    verified = false;
                }
            }
        }

        if actions.contains(&DatabaseAction::CleanOrphans) {
            for rule in &settings.orphan_rules {
                match db.count_orphans(rule).await {
                    Ok(0) => {}
                    Ok(remaining) => {
                        log.push(format!("verify: {remaining} orphans remain for {}", rule.name));
                        verified = false;
                    }
                    Err(e) => {
                        log.push(format!("verify: counting orphans for {} failed: {e}", rule.name));
                        verified = false;
                    }
                }
            }
        }
        verified
    }
}

#[async_trait]
impl Tool for DatabaseRepair {
    type Input = DatabaseRepairInput;
    type Output = RepairResult;

    fn id(&self) -> ToolId {
        ToolId::DatabaseRepair
    }

    fn description(&self) -> &'static str {
        "Reconnect, rebuild invalid indexes and delete orphaned rows, then re-verify"
    }

    async fn call(&self, input: DatabaseRepairInput, ctx: &ToolContext) -> Result<RepairResult, ToolError> {
        let settings = &ctx.config().database;
        if input.dry_run {
            return Ok(RepairResult::planned(self.id().as_str(), Self::plan(&input, settings)));
        }

        let db = ctx.database()?;
        let policy = ctx.retry_policy(input.retry_attempts);
        let mut log = Vec::new();
        let applied = Self::apply(db, &input, settings, &policy, &mut log).await;
        let verified = applied && Self::verify(db, &input, settings, &mut log).await;
        info!(tool = %self.id(), applied, verified, "Database repair finished");
        Ok(RepairResult::new(self.id().as_str(), false, verified, log))
    }
}
