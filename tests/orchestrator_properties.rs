//! Orchestrator Property Tests
//!
//! Whole-run behaviour against in-memory collaborators: totality, isolation
//! of slow or failing dependencies, result ordering, count consistency, and
//! the per-check timeout.

mod common;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use common::{test_config, Fakes};
use ops_health::collaborators::DependencyError;
use ops_health::tools::checks::{CheckInput, DatabaseConnectivityCheck, SlackConnectivityCheck};
use ops_health::tools::{Tool, ToolRegistry};
use ops_health::types::ToolKind;
use ops_health::{
    default_registry, CheckResult, Orchestrator, RunPhase, Severity, ToolContext, ToolError, ToolId,
};

fn orchestrator(fakes: &Fakes, config: ops_health::OpsConfig) -> Orchestrator {
    let registry = Arc::new(default_registry().unwrap());
    Orchestrator::new(registry, fakes.context(config))
}

fn check_names() -> Vec<&'static str> {
    ToolId::ALL
        .iter()
        .filter(|id| id.kind() == ToolKind::Check)
        .map(|id| id.as_str())
        .collect()
}

// ============================================================================
// Totality
// ============================================================================

#[tokio::test]
async fn healthy_environment_yields_all_healthy() {
    let fakes = Fakes::healthy();
    let mut orch = orchestrator(&fakes, test_config());
    let summary = orch.execute().await;

    assert_eq!(summary.check_results().len(), 15);
    assert_eq!(summary.healthy_count(), 15, "{:#?}", summary.check_results());
    assert_eq!(summary.overall(), Severity::Healthy);
    assert!(summary.repair_results().is_empty());
    assert_eq!(orch.phase(), RunPhase::Done);
}

#[tokio::test]
async fn fully_broken_environment_reports_every_check_critical() {
    let registry = Arc::new(default_registry().unwrap());
    let ctx = Arc::new(ToolContext::new(Arc::new(test_config())));
    let mut orch = Orchestrator::new(registry, ctx);
    let summary = orch.execute().await;

    assert_eq!(summary.critical_count(), 15);
    for result in summary.check_results() {
        assert!(result.error().is_some(), "{} has no error", result.tool_name());
    }
    let report = orch.generate_report(&summary);
    assert!(report.contains("## Health Checks"));
    assert!(!report.contains("## Auto-Repairs"));
}

// ============================================================================
// Isolation & Ordering
// ============================================================================

#[tokio::test]
async fn one_failing_dependency_leaves_others_untouched() {
    let fakes = Fakes::healthy();
    fakes
        .database
        .behaviour
        .fail_with(DependencyError::Unreachable("connection refused".into()));
    let mut orch = orchestrator(&fakes, test_config());
    let summary = orch.execute().await;

    for result in summary.check_results() {
        let tool: ToolId = result.tool_name().parse().unwrap();
        // speech_jobs reads the job table, so it shares the database's fate
        let uses_database = tool.dependency() == ops_health::types::Dependency::Database
            || tool == ToolId::SpeechJobs;
        if uses_database {
            assert_eq!(result.status(), Severity::Critical, "{}", result.tool_name());
        } else {
            assert_eq!(result.status(), Severity::Healthy, "{}", result.tool_name());
        }
    }
}

#[tokio::test]
async fn results_follow_registration_order_in_both_modes() {
    for parallel in [true, false] {
        let fakes = Fakes::healthy();
        let mut config = test_config();
        config.orchestrator.enable_parallel_checks = parallel;
        let mut orch = orchestrator(&fakes, config);
        let summary = orch.execute().await;
        let names: Vec<&str> = summary.check_results().iter().map(|r| r.tool_name()).collect();
        assert_eq!(names, check_names(), "parallel = {parallel}");
    }
}

#[tokio::test]
async fn counts_always_match_results() {
    let fakes = Fakes::healthy();
    fakes.slack.behaviour.fail_with(DependencyError::RateLimited { retry_after: None });
    fakes.storage.behaviour.fail_with(DependencyError::Timeout);
    let mut config = test_config();
    config.orchestrator.enable_auto_repair = true;
    let mut orch = orchestrator(&fakes, config);
    let summary = orch.execute().await;

    let total = summary.healthy_count() + summary.degraded_count() + summary.critical_count();
    assert_eq!(total, summary.check_results().len());
    assert_eq!(
        summary.repair_success_count()
            + summary.repair_failure_count()
            + summary.repair_dry_run_count(),
        summary.repair_results().len()
    );
    // dry runs are planned, not failed
    assert_eq!(summary.repair_dry_run_count(), 2);
    assert_eq!(summary.repair_failure_count(), 0);
    // rate limiting is a soft signal; the channel checks are skipped without a channel
    assert_eq!(summary.degraded_count(), 2);
    assert_eq!(summary.critical_count(), 3);
    // one repair per failing dependency
    assert_eq!(summary.repair_results().len(), 2);
}

// ============================================================================
// Auto-Repair Verification
// ============================================================================

fn live_repair_config() -> ops_health::OpsConfig {
    let mut config = test_config();
    config.orchestrator.enable_auto_repair = true;
    config.orchestrator.dry_run = false;
    config.orchestrator.retry_attempts = 1;
    config
}

#[tokio::test]
async fn missing_index_is_not_reported_repaired_by_a_reconnect() {
    let fakes = Fakes::healthy();
    fakes
        .database
        .indexes
        .lock()
        .unwrap()
        .retain(|i| i.name != "analyses_pkey");
    let mut orch = orchestrator(&fakes, live_repair_config());
    let summary = orch.execute().await;

    let repairs = summary.repair_results();
    assert_eq!(repairs.len(), 1);
    assert_eq!(repairs[0].tool_name(), "database_repair");
    assert!(!repairs[0].repaired(), "{:#?}", repairs[0].actions());
    assert!(repairs[0]
        .actions()
        .iter()
        .any(|a| a == "recheck: database_indexes still DEGRADED"));
    assert_eq!(summary.repair_failure_count(), 1);
}

#[tokio::test]
async fn missing_slack_scope_is_not_reported_repaired_by_a_reconnect() {
    let fakes = Fakes::healthy();
    fakes
        .slack
        .scopes
        .lock()
        .unwrap()
        .retain(|s| s != "channels:join");
    let mut orch = orchestrator(&fakes, live_repair_config());
    let summary = orch.execute().await;

    let repairs = summary.repair_results();
    assert_eq!(repairs.len(), 1);
    assert_eq!(repairs[0].tool_name(), "slack_repair");
    assert!(!repairs[0].repaired(), "{:#?}", repairs[0].actions());
    assert!(repairs[0]
        .actions()
        .iter()
        .any(|a| a == "recheck: slack_permissions still DEGRADED"));
}

#[tokio::test]
async fn rejected_speech_key_is_not_reported_repaired() {
    let fakes = Fakes::healthy();
    fakes
        .speech
        .behaviour
        .fail_with(DependencyError::Unauthorized("invalid api key".into()));
    let mut orch = orchestrator(&fakes, live_repair_config());
    let summary = orch.execute().await;

    let repairs = summary.repair_results();
    assert_eq!(repairs.len(), 1);
    assert_eq!(repairs[0].tool_name(), "speech_repair");
    assert!(!repairs[0].repaired(), "{:#?}", repairs[0].actions());
    assert_eq!(summary.repair_success_count(), 0);
}

#[tokio::test]
async fn fixed_fault_passes_its_recheck() {
    let fakes = Fakes::healthy();
    fakes.database.indexes.lock().unwrap()[0].valid = false;
    let mut orch = orchestrator(&fakes, live_repair_config());
    let summary = orch.execute().await;

    let repairs = summary.repair_results();
    assert_eq!(repairs.len(), 1);
    assert!(repairs[0].repaired(), "{:#?}", repairs[0].actions());
    assert!(repairs[0]
        .actions()
        .iter()
        .any(|a| a == "recheck: database_indexes healthy"));
}

// ============================================================================
// Timeout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn slow_check_times_out_without_delaying_others() {
    let fakes = Fakes::healthy();
    fakes.database.behaviour.set_delay(Duration::from_secs(3));

    let mut registry = ToolRegistry::new();
    registry.register(DatabaseConnectivityCheck).unwrap();
    registry.register(SlackConnectivityCheck).unwrap();

    let mut config = test_config();
    config.orchestrator.check_timeout_ms = 1_000;
    config.orchestrator.enable_parallel_checks = true;
    let mut orch = Orchestrator::new(Arc::new(registry), fakes.context(config));
    let summary = orch.execute().await;

    let results = summary.check_results();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].tool_name(), "database_connectivity");
    assert_eq!(results[0].status(), Severity::Critical);
    assert!(results[0].error().unwrap().contains("timed out"));
    assert_eq!(results[1].tool_name(), "slack_connectivity");
    assert_eq!(results[1].status(), Severity::Healthy);

    let total = summary.total_time_ms();
    assert!((1_000..1_100).contains(&total), "total_time_ms = {total}");
}

/// Check whose handler panics.
struct PanickingCheck;

#[async_trait]
impl Tool for PanickingCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::SpeechApi
    }

    fn description(&self) -> &'static str {
        "panics on every call"
    }

    async fn call(&self, _input: CheckInput, _ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        panic!("speech client state corrupted");
    }
}

/// Check whose handler never settles.
struct HangingCheck;

#[async_trait]
impl Tool for HangingCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::LlmApi
    }

    fn description(&self) -> &'static str {
        "never returns"
    }

    async fn call(&self, _input: CheckInput, _ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_and_hanging_checks_are_contained() {
    for parallel in [true, false] {
        let fakes = Fakes::healthy();
        let mut registry = ToolRegistry::new();
        registry.register(DatabaseConnectivityCheck).unwrap();
        registry.register(PanickingCheck).unwrap();
        registry.register(SlackConnectivityCheck).unwrap();
        registry.register(HangingCheck).unwrap();

        let mut config = test_config();
        config.orchestrator.check_timeout_ms = 1_000;
        config.orchestrator.enable_parallel_checks = parallel;
        let mut orch = Orchestrator::new(Arc::new(registry), fakes.context(config));
        let summary = orch.execute().await;

        assert_eq!(orch.phase(), RunPhase::Done);
        let results = summary.check_results();
        let names: Vec<&str> = results.iter().map(|r| r.tool_name()).collect();
        assert_eq!(
            names,
            vec!["database_connectivity", "speech_api", "slack_connectivity", "llm_api"],
            "parallel = {parallel}"
        );

        assert_eq!(results[0].status(), Severity::Healthy);
        assert_eq!(results[1].status(), Severity::Critical);
        assert!(results[1].error().unwrap().contains("speech client state corrupted"));
        assert_eq!(results[2].status(), Severity::Healthy);
        assert_eq!(results[3].status(), Severity::Critical);
        assert!(results[3].error().unwrap().contains("timed out after 1000 ms"));
        assert_eq!(summary.critical_count(), 2);

        if parallel {
            let total = summary.total_time_ms();
            assert!((1_000..1_100).contains(&total), "total_time_ms = {total}");
        }
    }
}
