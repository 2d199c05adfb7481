//! System-wide default constants.
//!
//! Centralises magic numbers used across the tool layer and orchestrator.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Config Loading
// ============================================================================

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "OPS_HEALTH_CONFIG";

/// Config file looked up in the working directory when the env var is unset.
pub const CONFIG_FILE_NAME: &str = "ops_health.toml";

// ============================================================================
// Orchestrator
// ============================================================================

/// Per-check budget before the check is recorded as `Critical` (ms).
pub const CHECK_TIMEOUT_MS: u64 = 10_000;

/// Per-repair budget before the repair is recorded as failed (ms).
pub const REPAIR_TIMEOUT_MS: u64 = 60_000;

// ============================================================================
// Repair Retry
// ============================================================================

/// Attempts per corrective action when the caller does not specify one.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Hard bounds on `retryAttempts` accepted by repair tools.
pub const MIN_RETRY_ATTEMPTS: u32 = 1;
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff (ms).
///
/// `delay = min(base * 2^(attempt - 1), cap)`
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Backoff cap (ms).
pub const RETRY_MAX_DELAY_MS: u64 = 10_000;

// ============================================================================
// Classification
// ============================================================================

/// Completion ratio below which a completeness check is `Critical`.
pub const RATIO_CRITICAL_BELOW: f64 = 0.5;

/// Completion ratio below which a completeness check is `Degraded`.
pub const RATIO_DEGRADED_BELOW: f64 = 0.8;

/// Storage usage ratio at which usage becomes `Degraded`.
pub const STORAGE_USAGE_WARNING_RATIO: f64 = 0.8;

/// Storage usage ratio at which usage becomes `Critical`.
pub const STORAGE_USAGE_CRITICAL_RATIO: f64 = 0.95;

/// Remaining-quota fraction below which provider quota is `Degraded`.
pub const QUOTA_WARNING_RATIO: f64 = 0.1;

// ============================================================================
// Collaborators
// ============================================================================

/// Query latency above which the database is `Degraded` (ms).
pub const SLOW_QUERY_MS: u64 = 1_000;

/// HTTP latency above which an API is `Degraded` (ms).
pub const SLOW_REQUEST_MS: u64 = 3_000;

/// Default timeout for a single probe inside a check (ms).
pub const PROBE_TIMEOUT_MS: u64 = 5_000;

/// HTTP client request timeout for collaborator clients (ms).
pub const HTTP_REQUEST_TIMEOUT_MS: u64 = 8_000;

/// Connection pool size for the database collaborator.
pub const DB_MAX_CONNECTIONS: u32 = 5;

/// Maximum stale jobs fetched per query.
pub const STALE_JOB_LIMIT: i64 = 500;

/// Page size for object storage enumeration.
pub const STORAGE_LIST_PAGE_SIZE: usize = 1_000;

/// Upper bound on enumerated objects per run.
///
/// 10 000 keeps a usage scan within a few seconds on typical buckets.
pub const STORAGE_MAX_OBJECTS: usize = 10_000;

/// Longest purge age a storage repair accepts, in days.
pub const MAX_PURGE_AGE_DAYS: u32 = 3_650;

/// Messages read from channel history when probing event flow.
pub const SLACK_HISTORY_LIMIT: u32 = 5;

/// User-Agent sent by every HTTP collaborator.
pub const USER_AGENT: &str = concat!("ops-health/", env!("CARGO_PKG_VERSION"));
