//! Tool identities, execution results and the tool error taxonomy

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::collaborators::DependencyError;

// ============================================================================
// Dependency Classes
// ============================================================================

/// External dependency class a tool probes or repairs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    Database,
    Slack,
    Speech,
    Llm,
    Storage,
}

impl Dependency {
    /// Repair tool that mirrors this dependency's check tools.
    pub const fn repair_tool(self) -> ToolId {
        match self {
            Dependency::Database => ToolId::DatabaseRepair,
            Dependency::Slack => ToolId::SlackRepair,
            Dependency::Speech => ToolId::SpeechRepair,
            Dependency::Llm => ToolId::LlmRepair,
            Dependency::Storage => ToolId::StorageRepair,
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dependency::Database => write!(f, "database"),
            Dependency::Slack => write!(f, "slack"),
            Dependency::Speech => write!(f, "speech-to-text provider"),
            Dependency::Llm => write!(f, "language-model provider"),
            Dependency::Storage => write!(f, "object storage"),
        }
    }
}

// ============================================================================
// Tool Identity
// ============================================================================

/// Whether a tool only observes a dependency or may mutate it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Check,
    Repair,
}

/// Closed set of every tool the engine knows about.
///
/// Names follow `<dependency>_<concern>`; each dependency has exactly one
/// `<dependency>_repair` tool that check failures are routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    DatabaseConnectivity,
    DatabaseIndexes,
    DatabaseIntegrity,
    SlackConnectivity,
    SlackPermissions,
    SlackEventFlow,
    SlackSendPath,
    SpeechApi,
    SpeechQuota,
    SpeechJobs,
    LlmApi,
    LlmQuota,
    StorageUsage,
    StorageIntegrity,
    StoragePermissions,
    DatabaseRepair,
    SlackRepair,
    SpeechRepair,
    LlmRepair,
    StorageRepair,
}

impl ToolId {
    /// Every tool, checks first, in default registration order.
    pub const ALL: [ToolId; 20] = [
        ToolId::DatabaseConnectivity,
        ToolId::DatabaseIndexes,
        ToolId::DatabaseIntegrity,
        ToolId::SlackConnectivity,
        ToolId::SlackPermissions,
        ToolId::SlackEventFlow,
        ToolId::SlackSendPath,
        ToolId::SpeechApi,
        ToolId::SpeechQuota,
        ToolId::SpeechJobs,
        ToolId::LlmApi,
        ToolId::LlmQuota,
        ToolId::StorageUsage,
        ToolId::StorageIntegrity,
        ToolId::StoragePermissions,
        ToolId::DatabaseRepair,
        ToolId::SlackRepair,
        ToolId::SpeechRepair,
        ToolId::LlmRepair,
        ToolId::StorageRepair,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ToolId::DatabaseConnectivity => "database_connectivity",
            ToolId::DatabaseIndexes => "database_indexes",
            ToolId::DatabaseIntegrity => "database_integrity",
            ToolId::SlackConnectivity => "slack_connectivity",
            ToolId::SlackPermissions => "slack_permissions",
            ToolId::SlackEventFlow => "slack_event_flow",
            ToolId::SlackSendPath => "slack_send_path",
            ToolId::SpeechApi => "speech_api",
            ToolId::SpeechQuota => "speech_quota",
            ToolId::SpeechJobs => "speech_jobs",
            ToolId::LlmApi => "llm_api",
            ToolId::LlmQuota => "llm_quota",
            ToolId::StorageUsage => "storage_usage",
            ToolId::StorageIntegrity => "storage_integrity",
            ToolId::StoragePermissions => "storage_permissions",
            ToolId::DatabaseRepair => "database_repair",
            ToolId::SlackRepair => "slack_repair",
            ToolId::SpeechRepair => "speech_repair",
            ToolId::LlmRepair => "llm_repair",
            ToolId::StorageRepair => "storage_repair",
        }
    }

    pub const fn kind(self) -> ToolKind {
        match self {
            ToolId::DatabaseRepair
            | ToolId::SlackRepair
            | ToolId::SpeechRepair
            | ToolId::LlmRepair
            | ToolId::StorageRepair => ToolKind::Repair,
            _ => ToolKind::Check,
        }
    }

    pub const fn dependency(self) -> Dependency {
        match self {
            ToolId::DatabaseConnectivity
            | ToolId::DatabaseIndexes
            | ToolId::DatabaseIntegrity
            | ToolId::DatabaseRepair => Dependency::Database,
            ToolId::SlackConnectivity
            | ToolId::SlackPermissions
            | ToolId::SlackEventFlow
            | ToolId::SlackSendPath
            | ToolId::SlackRepair => Dependency::Slack,
            ToolId::SpeechApi | ToolId::SpeechQuota | ToolId::SpeechJobs | ToolId::SpeechRepair => {
                Dependency::Speech
            }
            ToolId::LlmApi | ToolId::LlmQuota | ToolId::LlmRepair => Dependency::Llm,
            ToolId::StorageUsage
            | ToolId::StorageIntegrity
            | ToolId::StoragePermissions
            | ToolId::StorageRepair => Dependency::Storage,
        }
    }

    /// Repair tool for a check tool; `None` for repair tools themselves.
    pub const fn repair_tool(self) -> Option<ToolId> {
        match self.kind() {
            ToolKind::Check => Some(self.dependency().repair_tool()),
            ToolKind::Repair => None,
        }
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ToolError::ToolNotFound(s.to_string()))
    }
}

// ============================================================================
// Execution Result
// ============================================================================

/// Outcome of one registry invocation.
///
/// Exactly one of `output` / `error` is populated, matching `success`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    execution_time_ms: u64,
}

impl<T> ExecutionResult<T> {
    pub fn ok(output: T, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            execution_time_ms,
        }
    }

    pub fn failed(error: impl std::fmt::Display, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.to_string()),
            execution_time_ms,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn output(&self) -> Option<&T> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn execution_time_ms(&self) -> u64 {
        self.execution_time_ms
    }

    /// Split into the populated half.
    pub fn into_result(self) -> Result<T, String> {
        match (self.output, self.error) {
            (Some(output), _) => Ok(output),
            (None, Some(error)) => Err(error),
            (None, None) => Err("tool produced no output".to_string()),
        }
    }
}

// ============================================================================
// Error Taxonomy
// ============================================================================

/// Errors raised inside the tool layer.
///
/// None of these escape `ToolRegistry::safe_execute`; they are converted to
/// failed `ExecutionResult`s or `Critical` / `Degraded` check results.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("invalid input for {tool}: {}", .issues.join("; "))]
    Validation { tool: String, issues: Vec<String> },

    #[error("tool not registered: {0}")]
    ToolNotFound(String),

    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    #[error("{0} is not configured")]
    MissingCredential(&'static str),

    #[error("{dependency} unavailable: {source}")]
    DependencyUnavailable {
        dependency: Dependency,
        #[source]
        source: DependencyError,
    },

    #[error("{dependency} degraded: {reason}")]
    DependencyDegraded { dependency: Dependency, reason: String },

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    /// Wrap a collaborator failure, keeping soft signals soft.
    pub fn from_dependency(dependency: Dependency, source: DependencyError) -> Self {
        match source {
            DependencyError::RateLimited { .. } => ToolError::DependencyDegraded {
                dependency,
                reason: source.to_string(),
            },
            source => ToolError::DependencyUnavailable { dependency, source },
        }
    }

    /// Whether this error only indicates a soft threshold breach.
    pub fn is_degraded(&self) -> bool {
        matches!(self, ToolError::DependencyDegraded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_round_trip_through_from_str() {
        for id in ToolId::ALL {
            assert_eq!(id.as_str().parse::<ToolId>().unwrap(), id);
        }
        assert!(matches!(
            "no_such_tool".parse::<ToolId>(),
            Err(ToolError::ToolNotFound(_))
        ));
    }

    #[test]
    fn test_check_tools_route_to_their_dependency_repair() {
        assert_eq!(ToolId::SlackEventFlow.repair_tool(), Some(ToolId::SlackRepair));
        assert_eq!(ToolId::DatabaseIndexes.repair_tool(), Some(ToolId::DatabaseRepair));
        assert_eq!(ToolId::StorageUsage.repair_tool(), Some(ToolId::StorageRepair));
        assert_eq!(ToolId::LlmRepair.repair_tool(), None);
    }

    #[test]
    fn test_repair_tool_names_follow_dependency_prefix() {
        for id in ToolId::ALL.iter().filter(|id| id.kind() == ToolKind::Check) {
            let repair = id.repair_tool().unwrap();
            let prefix = repair.as_str().trim_end_matches("_repair");
            assert!(id.as_str().starts_with(prefix), "{id} -> {repair}");
        }
    }

    #[test]
    fn test_execution_result_populates_exactly_one_side() {
        let ok = ExecutionResult::ok(7_u32, 3);
        assert!(ok.success() && ok.output().is_some() && ok.error().is_none());

        let failed: ExecutionResult<u32> = ExecutionResult::failed("boom", 4);
        assert!(!failed.success() && failed.output().is_none());
        assert_eq!(failed.error(), Some("boom"));
        assert_eq!(failed.into_result(), Err("boom".to_string()));
    }

    #[test]
    fn test_rate_limit_maps_to_degraded() {
        let err = ToolError::from_dependency(
            Dependency::Llm,
            DependencyError::RateLimited { retry_after: None },
        );
        assert!(err.is_degraded());

        let err = ToolError::from_dependency(
            Dependency::Llm,
            DependencyError::Unauthorized("bad key".to_string()),
        );
        assert!(!err.is_degraded());
    }
}
