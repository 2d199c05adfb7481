//! Repair planning: failing check results -> one repair invocation per dependency
//!
//! Parameters are derived from the metrics the checks attached, so a repair
//! only targets what was actually observed (the invalid indexes, the channel
//! the bot left, the stuck jobs).

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::config::{OpsConfig, OrchestratorConfig};
use crate::types::{CheckResult, Dependency, ToolId};

/// One queued repair and the checks that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRepair {
    pub tool: ToolId,
    pub input: Value,
    pub triggered_by: Vec<String>,
}

/// Select repairs for every Degraded or Critical check result, once per
/// dependency, ordered by dependency. `settings` supplies the run mode.
pub fn plan_repairs(
    results: &[CheckResult],
    config: &OpsConfig,
    settings: &OrchestratorConfig,
) -> Vec<PlannedRepair> {
    let mut failing: BTreeMap<Dependency, Vec<(ToolId, &CheckResult)>> = BTreeMap::new();
    for result in results.iter().filter(|r| r.status().needs_repair()) {
        let Ok(tool) = result.tool_name().parse::<ToolId>() else {
            continue;
        };
        failing.entry(tool.dependency()).or_default().push((tool, result));
    }

    failing
        .into_iter()
        .map(|(dependency, triggers)| {
            let mut input = match dependency {
                Dependency::Database => database_input(&triggers),
                Dependency::Slack => slack_input(&triggers),
                Dependency::Speech => speech_input(&triggers),
                Dependency::Llm => llm_input(results, config),
                Dependency::Storage => storage_input(&triggers, config),
            };
            input.insert("dryRun".into(), json!(settings.dry_run));
            input.insert("retryAttempts".into(), json!(settings.retry_attempts));
            PlannedRepair {
                tool: dependency.repair_tool(),
                input: Value::Object(input),
                triggered_by: triggers.iter().map(|(t, _)| t.as_str().to_string()).collect(),
            }
        })
        .collect()
}

fn metric_u64(result: &CheckResult, key: &str) -> u64 {
    result.metric(key).and_then(Value::as_u64).unwrap_or(0)
}

fn metric_str<'a>(result: &'a CheckResult, key: &str) -> Option<&'a str> {
    result.metric(key).and_then(Value::as_str)
}

fn metric_strings(result: &CheckResult, key: &str) -> Vec<String> {
    result
        .metric(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn push_unique(actions: &mut Vec<&'static str>, action: &'static str) {
    if !actions.contains(&action) {
        actions.push(action);
    }
}

fn database_input(triggers: &[(ToolId, &CheckResult)]) -> Map<String, Value> {
    let mut actions: Vec<&'static str> = Vec::new();
    let mut indexes: Vec<String> = Vec::new();

    for (tool, result) in triggers {
        if result.error().is_some() {
            push_unique(&mut actions, "reconnect");
            continue;
        }
        match tool {
            ToolId::DatabaseConnectivity => push_unique(&mut actions, "reconnect"),
            ToolId::DatabaseIndexes => {
                for index in metric_strings(result, "invalid_indexes") {
                    if !indexes.contains(&index) {
                        indexes.push(index);
                    }
                }
            }
            ToolId::DatabaseIntegrity if metric_u64(result, "orphaned_records") > 0 => {
                push_unique(&mut actions, "clean_orphans");
            }
            _ => {}
        }
    }
    if !indexes.is_empty() {
        push_unique(&mut actions, "reindex");
    }
    // Missing indexes cannot be rebuilt; the reconnect runs but the recheck
    // after it keeps the repair unresolved
    if actions.is_empty() {
        actions.push("reconnect");
    }

    let mut input = Map::new();
    input.insert("actions".into(), json!(actions));
    if !indexes.is_empty() {
        input.insert("indexes".into(), json!(indexes));
    }
    input
}

fn slack_input(triggers: &[(ToolId, &CheckResult)]) -> Map<String, Value> {
    let mut actions: Vec<&'static str> = Vec::new();
    let mut channel: Option<&str> = None;

    for (tool, result) in triggers {
        if result.error().is_some() {
            push_unique(&mut actions, "reconnect");
            continue;
        }
        let result_channel = metric_str(result, "channel");
        if result.metric("is_member").and_then(Value::as_bool) == Some(false) {
            if let Some(c) = result_channel {
                channel.get_or_insert(c);
                push_unique(&mut actions, "rejoin_channel");
            }
        }
        if *tool == ToolId::SlackEventFlow {
            if let Some(c) = result_channel {
                channel.get_or_insert(c);
                push_unique(&mut actions, "resend_message");
            }
        }
    }
    // Missing scopes need a reinstall; same as missing indexes above
    if actions.is_empty() {
        actions.push("reconnect");
    }

    let mut input = Map::new();
    input.insert("actions".into(), json!(actions));
    if let Some(c) = channel {
        input.insert("channel".into(), json!(c));
    }
    input
}

fn speech_input(triggers: &[(ToolId, &CheckResult)]) -> Map<String, Value> {
    let stuck: u64 = triggers
        .iter()
        .filter(|(tool, _)| *tool == ToolId::SpeechJobs)
        .map(|(_, r)| metric_u64(r, "stuck_jobs"))
        .sum();
    let mut input = Map::new();
    input.insert("requeueStuck".into(), json!(stuck > 0));
    if stuck > 0 {
        input.insert("maxJobs".into(), json!(stuck));
    }
    input
}

/// Failed analyses are reported by the database integrity check, so look at
/// every result, not only the triggering ones.
fn llm_input(results: &[CheckResult], config: &OpsConfig) -> Map<String, Value> {
    let failed: u64 = results
        .iter()
        .filter(|r| r.tool_name() == ToolId::DatabaseIntegrity.as_str())
        .map(|r| metric_u64(r, "failed_analyses"))
        .sum();
    let mut input = Map::new();
    input.insert(
        "requeueFailedAnalyses".into(),
        json!(config.llm.requeue_failed_analyses && failed > 0),
    );
    input
}

fn storage_input(triggers: &[(ToolId, &CheckResult)], config: &OpsConfig) -> Map<String, Value> {
    let settings = &config.storage;
    let mut input = Map::new();
    let empty: u64 = triggers
        .iter()
        .filter(|(tool, _)| *tool == ToolId::StorageIntegrity)
        .map(|(_, r)| metric_u64(r, "empty_objects"))
        .sum();
    input.insert("removeEmptyObjects".into(), json!(empty > 0));
    if let Some(prefix) = &settings.purge_prefix {
        input.insert("purgePrefix".into(), json!(prefix));
        input.insert("olderThanDays".into(), json!(settings.purge_older_than_days));
    }
    input
}
