//! Registry Boundary Tests
//!
//! Every built-in tool is invoked through `safe_execute` with hostile input
//! and an empty context. Nothing may panic outward and every failure must
//! come back as `success: false` with a readable error.

use serde_json::{json, Value};
use std::sync::Arc;

use ops_health::tools::checks::DatabaseConnectivityCheck;
use ops_health::tools::{ToolOutput, ToolRegistry};
use ops_health::types::ToolKind;
use ops_health::{default_registry, OpsConfig, Severity, ToolContext, ToolError, ToolId};

fn empty_context() -> Arc<ToolContext> {
    Arc::new(ToolContext::new(Arc::new(OpsConfig::default())))
}

fn repair_ids() -> Vec<ToolId> {
    ToolId::ALL
        .iter()
        .copied()
        .filter(|id| id.kind() == ToolKind::Repair)
        .collect()
}

#[tokio::test]
async fn unknown_tool_is_reported_not_raised() {
    let registry = default_registry().unwrap();
    let result = registry
        .safe_execute("kafka_connectivity", json!({}), &empty_context())
        .await;
    assert!(!result.success());
    assert_eq!(result.execution_time_ms(), 0);
    assert!(result.error().unwrap().contains("tool not registered: kafka_connectivity"));
}

#[tokio::test]
async fn checks_without_collaborators_are_critical_results() {
    let registry = default_registry().unwrap();
    let ctx = empty_context();
    for id in registry.tool_ids(ToolKind::Check) {
        let execution = registry.safe_execute(id.as_str(), json!({}), &ctx).await;
        assert!(execution.success(), "{id}: {:?}", execution.error());
        let check = execution
            .into_result()
            .ok()
            .and_then(ToolOutput::into_check)
            .unwrap();
        assert_eq!(check.status(), Severity::Critical, "{id}");
        assert!(check.error().unwrap().contains("is not configured"), "{id}");
    }
}

#[tokio::test]
async fn repair_inputs_are_validated_before_the_handler_runs() {
    let registry = default_registry().unwrap();
    let ctx = empty_context();
    let bad_inputs: [Value; 4] = [
        json!({"retryAttempts": 0}),
        json!({"retryAttempts": 6}),
        json!({"dryRun": "yes"}),
        json!({"notAField": true}),
    ];

    for id in repair_ids() {
        for input in bad_inputs.iter().cloned() {
            let execution = registry.safe_execute(id.as_str(), input.clone(), &ctx).await;
            assert!(!execution.success(), "{id} accepted {input}");
            let error = execution.error().unwrap();
            assert!(error.starts_with(&format!("invalid input for {id}")), "{id}: {error}");
        }
    }
}

#[tokio::test]
async fn tool_specific_rules_are_enforced() {
    let registry = default_registry().unwrap();
    let ctx = empty_context();
    let cases = [
        ("database_repair", json!({"actions": []})),
        ("database_repair", json!({"actions": ["reindex"]})),
        ("database_repair", json!({"actions": ["reindex"], "indexes": ["idx; drop table x"]})),
        ("database_repair", json!({"actions": ["vacuum_full"]})),
        ("slack_repair", json!({"actions": ["rejoin_channel"]})),
        ("slack_repair", json!({"actions": ["resend_message"], "channel": "   "})),
        ("speech_repair", json!({"maxJobs": 0})),
        ("speech_repair", json!({"expireAfterMinutes": 0})),
        ("storage_repair", json!({"purgePrefix": "/"})),
        ("storage_repair", json!({"olderThanDays": 0})),
    ];

    for (tool, input) in cases {
        let execution = registry.safe_execute(tool, input.clone(), &ctx).await;
        assert!(!execution.success(), "{tool} accepted {input}");
    }
}

#[tokio::test]
async fn live_repair_without_credentials_fails_cleanly() {
    let registry = default_registry().unwrap();
    let ctx = empty_context();
    for id in repair_ids() {
        let execution = registry
            .safe_execute(id.as_str(), json!({"dryRun": false}), &ctx)
            .await;
        assert!(!execution.success(), "{id}");
        assert!(execution.error().unwrap().contains("is not configured"), "{id}");
    }
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut registry = ToolRegistry::new();
    registry.register(DatabaseConnectivityCheck).unwrap();
    let err = registry.register(DatabaseConnectivityCheck).unwrap_err();
    assert!(matches!(err, ToolError::DuplicateTool(ref name) if name == "database_connectivity"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn descriptors_publish_an_input_schema_for_every_tool() {
    let registry = default_registry().unwrap();
    let descriptors = registry.descriptors();
    assert_eq!(descriptors.len(), ToolId::ALL.len());
    for descriptor in descriptors {
        assert!(!descriptor.description.is_empty(), "{}", descriptor.id);
        assert!(descriptor.input_schema.is_object(), "{}", descriptor.id);
    }
}
