//! Check Classification Tests
//!
//! Each check tool against in-memory collaborators seeded into its Degraded
//! and Critical states, with the thresholds pinned in the config so the
//! boundaries under test do not move with the defaults.

mod common;

use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use common::{test_config, Fakes};
use ops_health::collaborators::{DependencyError, SlackMessage, StaleJob, StoredObject};
use ops_health::config::DatabaseSettings;
use ops_health::tools::ToolOutput;
use ops_health::{default_registry, CheckResult, OpsConfig, Severity};

async fn check(fakes: &Fakes, config: OpsConfig, tool: &str) -> CheckResult {
    let ctx = fakes.context(config);
    let registry = default_registry().unwrap();
    let execution = registry.safe_execute(tool, json!({}), &ctx).await;
    assert!(execution.success(), "{tool}: {:?}", execution.error());
    execution
        .into_result()
        .ok()
        .and_then(ToolOutput::into_check)
        .unwrap()
}

fn channel_config() -> OpsConfig {
    let mut config = test_config();
    config.slack.monitored_channel = Some("C1".to_string());
    config.slack.event_stale_minutes = 30;
    config.slack.event_critical_multiplier = 4;
    config
}

fn message_minutes_ago(minutes: i64) -> SlackMessage {
    let at = Utc::now() - chrono::Duration::minutes(minutes);
    SlackMessage {
        ts: format!("{}.000100", at.timestamp()),
        text: Some("event".to_string()),
    }
}

fn object(path: &str, size: Option<u64>) -> StoredObject {
    StoredObject {
        path: path.to_string(),
        size,
        updated_at: Some(Utc::now()),
    }
}

fn stale_job(id: &str, minutes: u64, media: bool) -> StaleJob {
    StaleJob {
        id: id.to_string(),
        external_id: None,
        media_url: media.then(|| format!("https://media.test/{id}.mp3")),
        age: Duration::from_secs(minutes * 60),
    }
}

// ============================================================================
// Slack Permissions
// ============================================================================

#[tokio::test]
async fn some_missing_scopes_are_degraded() {
    let fakes = Fakes::healthy();
    fakes.slack.scopes.lock().unwrap().retain(|s| s != "channels:join");

    let result = check(&fakes, test_config(), "slack_permissions").await;

    assert_eq!(result.status(), Severity::Degraded);
    assert!(result.error().is_none());
    assert_eq!(result.metric("missing_scopes"), Some(&json!(["channels:join"])));
    assert!(result.details().unwrap().contains("missing scopes: channels:join"));
}

#[tokio::test]
async fn no_required_scope_granted_is_critical() {
    let fakes = Fakes::healthy();
    *fakes.slack.scopes.lock().unwrap() = vec!["users:read".to_string()];

    let result = check(&fakes, test_config(), "slack_permissions").await;

    assert_eq!(result.status(), Severity::Critical);
    assert!(result.error().unwrap().contains("no required scopes granted"));
}

#[tokio::test]
async fn bot_outside_monitored_channel_is_degraded() {
    let fakes = Fakes::healthy();
    *fakes.slack.is_member.lock().unwrap() = false;

    let permissions = check(&fakes, channel_config(), "slack_permissions").await;
    assert_eq!(permissions.status(), Severity::Degraded);
    assert_eq!(permissions.metric("is_member"), Some(&Value::Bool(false)));
    assert_eq!(permissions.metric("channel"), Some(&json!("C1")));

    let send_path = check(&fakes, channel_config(), "slack_send_path").await;
    assert_eq!(send_path.status(), Severity::Degraded);
    assert!(send_path.details().unwrap().contains("not a member of C1"));
}

// ============================================================================
// Slack Event Flow
// ============================================================================

#[tokio::test]
async fn event_flow_tiers_follow_message_age() {
    let cases = [
        (5, Severity::Healthy),
        (45, Severity::Degraded),
        (119, Severity::Degraded),
        (125, Severity::Critical),
    ];
    for (minutes, expected) in cases {
        let fakes = Fakes::healthy();
        *fakes.slack.history.lock().unwrap() = vec![message_minutes_ago(minutes)];

        let result = check(&fakes, channel_config(), "slack_event_flow").await;

        assert_eq!(result.status(), expected, "{minutes} min old");
        assert!(result.error().is_none());
        let age = result.metric("last_event_age_minutes").and_then(Value::as_u64).unwrap();
        assert!(age.abs_diff(minutes as u64) <= 1, "{age} vs {minutes}");
    }
}

#[tokio::test]
async fn event_flow_uses_the_newest_message() {
    let fakes = Fakes::healthy();
    *fakes.slack.history.lock().unwrap() = vec![message_minutes_ago(300), message_minutes_ago(2)];

    let result = check(&fakes, channel_config(), "slack_event_flow").await;

    assert_eq!(result.status(), Severity::Healthy);
}

#[tokio::test]
async fn silent_channel_is_degraded() {
    let fakes = Fakes::healthy();
    let result = check(&fakes, channel_config(), "slack_event_flow").await;
    assert_eq!(result.status(), Severity::Degraded);
    assert!(result.details().unwrap().contains("no messages in C1"));
}

#[tokio::test]
async fn event_flow_without_channel_is_skipped() {
    let fakes = Fakes::healthy();
    let result = check(&fakes, test_config(), "slack_event_flow").await;
    assert_eq!(result.status(), Severity::Healthy);
    assert_eq!(result.metric("skipped"), Some(&Value::Bool(true)));
    assert_eq!(fakes.slack.behaviour.calls(), 0);
}

// ============================================================================
// Slack Send Path
// ============================================================================

#[tokio::test]
async fn archived_report_channel_is_critical() {
    let fakes = Fakes::healthy();
    *fakes.slack.archived.lock().unwrap() = true;

    let result = check(&fakes, channel_config(), "slack_send_path").await;

    assert_eq!(result.status(), Severity::Critical);
    assert!(result.error().unwrap().contains("C1 is archived"));
    assert_eq!(result.metric("is_archived"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn missing_report_channel_is_critical() {
    let fakes = Fakes::healthy();
    fakes
        .slack
        .behaviour
        .fail_with(DependencyError::NotFound("channel_not_found".into()));
    let mut config = channel_config();
    config.slack.report_channel = Some("C9".to_string());

    let result = check(&fakes, config, "slack_send_path").await;

    assert_eq!(result.status(), Severity::Critical);
    assert!(result.error().unwrap().contains("C9: channel_not_found"));
}

#[tokio::test]
async fn member_of_live_channel_can_post() {
    let fakes = Fakes::healthy();
    let result = check(&fakes, channel_config(), "slack_send_path").await;
    assert_eq!(result.status(), Severity::Healthy);
}

// ============================================================================
// Database Indexes
// ============================================================================

#[tokio::test]
async fn one_missing_index_is_degraded() {
    let fakes = Fakes::healthy();
    fakes.database.indexes.lock().unwrap().retain(|i| i.name != "analyses_pkey");

    let result = check(&fakes, test_config(), "database_indexes").await;

    assert_eq!(result.status(), Severity::Degraded);
    assert_eq!(result.metric("missing_indexes"), Some(&json!(["analyses_pkey"])));
    assert_eq!(result.metric("invalid_indexes"), Some(&json!([])));
}

#[tokio::test]
async fn exactly_half_missing_is_still_degraded() {
    let fakes = Fakes::healthy();
    fakes.database.indexes.lock().unwrap().truncate(2);

    let result = check(&fakes, test_config(), "database_indexes").await;

    assert_eq!(DatabaseSettings::default().expected_indexes.len(), 4);
    assert_eq!(result.status(), Severity::Degraded);
}

#[tokio::test]
async fn more_than_half_missing_is_critical() {
    let fakes = Fakes::healthy();
    fakes.database.indexes.lock().unwrap().truncate(1);

    let result = check(&fakes, test_config(), "database_indexes").await;

    assert_eq!(result.status(), Severity::Critical);
    let missing = result.metric("missing_indexes").and_then(Value::as_array).unwrap();
    assert_eq!(missing.len(), 3);
}

#[tokio::test]
async fn invalid_index_is_degraded() {
    let fakes = Fakes::healthy();
    fakes.database.indexes.lock().unwrap()[1].valid = false;

    let result = check(&fakes, test_config(), "database_indexes").await;

    assert_eq!(result.status(), Severity::Degraded);
    assert_eq!(result.metric("invalid_indexes"), Some(&json!(["analyses_pkey"])));
}

// ============================================================================
// Database Integrity
// ============================================================================

#[tokio::test]
async fn orphans_alone_are_degraded() {
    let fakes = Fakes::healthy();
    *fakes.database.orphans.lock().unwrap() = 3;

    let result = check(&fakes, test_config(), "database_integrity").await;

    let rules = DatabaseSettings::default().orphan_rules.len() as u64;
    assert_eq!(result.status(), Severity::Degraded);
    assert_eq!(result.metric("orphaned_records").and_then(Value::as_u64), Some(3 * rules));
}

#[tokio::test]
async fn completion_ratio_tiers() {
    let cases = [
        (10, Severity::Healthy),
        (8, Severity::Healthy),
        (7, Severity::Degraded),
        (5, Severity::Degraded),
        (4, Severity::Critical),
    ];
    for (done, expected) in cases {
        let fakes = Fakes::healthy();
        {
            let mut counts = fakes.database.counts.lock().unwrap();
            counts.done = done;
            counts.failed = 10 - done;
        }

        let result = check(&fakes, test_config(), "database_integrity").await;

        assert_eq!(result.status(), expected, "{done}/10 done");
        assert_eq!(result.metric("failed_analyses").and_then(Value::as_i64), Some(10 - done));
    }
}

#[tokio::test]
async fn orphans_never_soften_a_critical_ratio() {
    let fakes = Fakes::healthy();
    *fakes.database.orphans.lock().unwrap() = 1;
    fakes.database.counts.lock().unwrap().done = 2;

    let result = check(&fakes, test_config(), "database_integrity").await;

    assert_eq!(result.status(), Severity::Critical);
}

// ============================================================================
// Storage
// ============================================================================

fn storage_config() -> OpsConfig {
    let mut config = test_config();
    config.storage.quota_bytes = 1_000;
    config.storage.usage_warning_ratio = 0.8;
    config.storage.usage_critical_ratio = 0.95;
    config
}

#[tokio::test]
async fn usage_tiers_follow_quota_ratio() {
    let cases = [
        (500, Severity::Healthy),
        (800, Severity::Degraded),
        (949, Severity::Degraded),
        (950, Severity::Critical),
    ];
    for (bytes, expected) in cases {
        let fakes = Fakes::healthy();
        *fakes.storage.objects.lock().unwrap() = vec![object("calls/a.mp3", Some(bytes))];

        let result = check(&fakes, storage_config(), "storage_usage").await;

        assert_eq!(result.status(), expected, "{bytes} bytes");
        assert_eq!(result.metric("used_bytes").and_then(Value::as_u64), Some(bytes));
    }
}

#[tokio::test]
async fn few_empty_objects_are_degraded() {
    let fakes = Fakes::healthy();
    *fakes.storage.objects.lock().unwrap() = vec![
        object("calls/a.mp3", Some(10)),
        object("calls/b.mp3", Some(10)),
        object("calls/c.mp3", Some(10)),
        object("calls/d.mp3", Some(10)),
        object("calls/empty.mp3", Some(0)),
    ];

    let result = check(&fakes, storage_config(), "storage_integrity").await;

    // 4/5 intact would be Healthy on ratio alone
    assert_eq!(result.status(), Severity::Degraded);
    assert_eq!(result.metric("empty_objects").and_then(Value::as_u64), Some(1));
}

#[tokio::test]
async fn mostly_broken_objects_are_critical() {
    let fakes = Fakes::healthy();
    *fakes.storage.objects.lock().unwrap() = vec![
        object("calls/a.mp3", Some(10)),
        object("calls/empty.mp3", Some(0)),
        object("calls/unknown.mp3", None),
    ];

    let result = check(&fakes, storage_config(), "storage_integrity").await;

    assert_eq!(result.status(), Severity::Critical);
    assert_eq!(result.metric("unreadable_objects").and_then(Value::as_u64), Some(1));
}

#[tokio::test]
async fn folder_placeholders_are_not_empty_objects() {
    let fakes = Fakes::healthy();
    *fakes.storage.objects.lock().unwrap() = vec![
        object("calls/a.mp3", Some(10)),
        object("calls/.emptyFolderPlaceholder", Some(0)),
        object("tmp/.emptyFolderPlaceholder", Some(0)),
        object(".emptyFolderPlaceholder", Some(0)),
    ];

    let integrity = check(&fakes, storage_config(), "storage_integrity").await;
    assert_eq!(integrity.status(), Severity::Healthy, "{:?}", integrity.details());
    assert_eq!(integrity.metric("empty_objects").and_then(Value::as_u64), Some(0));
    assert_eq!(integrity.metric("object_count").and_then(Value::as_u64), Some(1));

    let usage = check(&fakes, storage_config(), "storage_usage").await;
    assert_eq!(usage.metric("object_count").and_then(Value::as_u64), Some(1));
}

#[tokio::test]
async fn public_bucket_expected_private_is_degraded() {
    let fakes = Fakes::healthy();
    fakes.storage.bucket.lock().unwrap().public = true;

    let result = check(&fakes, storage_config(), "storage_permissions").await;
    assert_eq!(result.status(), Severity::Degraded);
    assert!(result.details().unwrap().contains("public but expected private"));

    let mut config = storage_config();
    config.storage.expect_private = false;
    let result = check(&fakes, config, "storage_permissions").await;
    assert_eq!(result.status(), Severity::Healthy);
}

#[tokio::test]
async fn absent_bucket_is_critical() {
    let fakes = Fakes::healthy();
    let mut config = storage_config();
    config.storage.bucket = "archive".to_string();

    let result = check(&fakes, config, "storage_permissions").await;

    assert_eq!(result.status(), Severity::Critical);
    assert!(result.error().unwrap().contains("bucket 'archive'"));
}

// ============================================================================
// Speech Jobs
// ============================================================================

fn jobs_config() -> OpsConfig {
    let mut config = test_config();
    config.speech.jobs.stuck_minutes = 30;
    config.speech.jobs.critical_multiplier = 4;
    config.speech.jobs.expire_after_minutes = 1_440;
    config
}

#[tokio::test]
async fn no_stuck_jobs_is_healthy() {
    let fakes = Fakes::healthy();
    *fakes.database.stale.lock().unwrap() = vec![stale_job("fresh", 10, true)];

    let result = check(&fakes, jobs_config(), "speech_jobs").await;

    assert_eq!(result.status(), Severity::Healthy);
    assert_eq!(result.metric("stuck_jobs").and_then(Value::as_u64), Some(0));
}

#[tokio::test]
async fn stuck_job_tiers_follow_oldest_age() {
    let cases = [(30, Severity::Degraded), (119, Severity::Degraded), (120, Severity::Critical)];
    for (minutes, expected) in cases {
        let fakes = Fakes::healthy();
        *fakes.database.stale.lock().unwrap() =
            vec![stale_job("oldest", minutes, true), stale_job("newer", 30, true)];

        let result = check(&fakes, jobs_config(), "speech_jobs").await;

        assert_eq!(result.status(), expected, "{minutes} min");
        assert!(result.error().is_none());
        assert_eq!(result.metric("stuck_jobs").and_then(Value::as_u64), Some(2));
        assert_eq!(result.metric("oldest_stuck_minutes").and_then(Value::as_u64), Some(minutes));
    }
}

#[tokio::test]
async fn stuck_jobs_are_split_into_expirable_and_resubmittable() {
    let fakes = Fakes::healthy();
    *fakes.database.stale.lock().unwrap() = vec![
        stale_job("ancient", 2_000, true),
        stale_job("young", 45, true),
        stale_job("lost", 45, false),
    ];

    let result = check(&fakes, jobs_config(), "speech_jobs").await;

    assert_eq!(result.status(), Severity::Critical);
    assert_eq!(result.metric("expirable_jobs").and_then(Value::as_u64), Some(1));
    assert_eq!(result.metric("resubmittable_jobs").and_then(Value::as_u64), Some(1));
}
