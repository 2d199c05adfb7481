//! Repair Dry-Run Tests
//!
//! A dry run must describe its steps without a single collaborator call,
//! whatever parameters it is given.

mod common;

use serde_json::json;
use std::sync::Arc;

use common::{test_config, Fakes};
use ops_health::default_registry;
use ops_health::tools::ToolOutput;

async fn dry_run(tool: &str, input: serde_json::Value) -> (Fakes, ops_health::RepairResult) {
    let fakes = Fakes::healthy();
    let ctx = fakes.context(test_config());
    let registry = default_registry().unwrap();
    let execution = registry.safe_execute(tool, input, &ctx).await;
    assert!(execution.success(), "{tool}: {:?}", execution.error());
    let repair = execution
        .into_result()
        .ok()
        .and_then(ToolOutput::into_repair)
        .unwrap();
    (fakes, repair)
}

#[tokio::test]
async fn every_repair_is_pure_in_dry_run() {
    let cases = [
        (
            "database_repair",
            json!({"actions": ["reconnect", "reindex", "clean_orphans"], "indexes": ["analyses_pkey"]}),
        ),
        (
            "slack_repair",
            json!({"actions": ["reconnect", "rejoin_channel", "resend_message"], "channel": "C1"}),
        ),
        ("speech_repair", json!({"requeueStuck": true, "expireAfterMinutes": 60, "maxJobs": 5})),
        ("llm_repair", json!({"requeueFailedAnalyses": true})),
        (
            "storage_repair",
            json!({"purgePrefix": "tmp/", "olderThanDays": 3, "removeEmptyObjects": true}),
        ),
    ];

    for (tool, input) in cases {
        let (fakes, repair) = dry_run(tool, input).await;
        assert_eq!(fakes.total_calls(), 0, "{tool} touched a collaborator");
        assert!(repair.dry_run(), "{tool}");
        assert!(!repair.repaired(), "{tool}");
        assert!(!repair.actions().is_empty(), "{tool} listed no steps");
        assert!(
            repair.actions().iter().all(|a| a.starts_with("would")),
            "{tool}: {:?}",
            repair.actions()
        );
    }
}

#[tokio::test]
async fn omitted_dry_run_defaults_to_true() {
    let (fakes, repair) = dry_run("database_repair", json!({})).await;
    assert!(repair.dry_run());
    assert_eq!(fakes.total_calls(), 0);
}

#[tokio::test]
async fn dry_run_needs_no_credentials() {
    let ctx = Arc::new(ops_health::ToolContext::new(Arc::new(test_config())));
    let registry = default_registry().unwrap();
    for tool in ["database_repair", "slack_repair", "speech_repair", "llm_repair", "storage_repair"] {
        let execution = registry.safe_execute(tool, json!({"dryRun": true}), &ctx).await;
        assert!(execution.success(), "{tool}: {:?}", execution.error());
    }
}
