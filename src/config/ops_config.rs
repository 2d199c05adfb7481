//! Ops Configuration - thresholds, endpoints and orchestrator settings as TOML values
//!
//! Each section implements `Default`, so an empty or partial file is always
//! valid and unspecified keys fall back to the built-in values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one deployment of the engine.
///
/// Load with `OpsConfig::load()`, which takes the first of:
/// 1. an explicit path (`--config` or `$OPS_HEALTH_CONFIG`)
/// 2. `./ops_health.toml`
/// 3. built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpsConfig {
    /// Run-level behaviour: parallelism, auto-repair, timeouts
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Backoff shape shared by every repair tool
    #[serde(default)]
    pub retry: RetrySettings,

    /// Relational database probes and repair targets
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Slack bot platform probes
    #[serde(default)]
    pub slack: SlackSettings,

    /// Speech-to-text provider and transcription job table
    #[serde(default)]
    pub speech: SpeechSettings,

    /// Language-model provider
    #[serde(default)]
    pub llm: LlmSettings,

    /// Object storage bucket
    #[serde(default)]
    pub storage: StorageSettings,

    /// Report hand-off
    #[serde(default)]
    pub notify: NotifySettings,
}

impl OpsConfig {
    /// Load configuration from `explicit` when given (the `--config` flag or
    /// `$OPS_HEALTH_CONFIG`), else `./ops_health.toml` when present, else the
    /// built-in defaults. A file that exists but fails to load is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded config");
            return Ok(config);
        }
        let local = Path::new(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            let config = Self::load_from_file(local)?;
            info!("Loaded config from ./{}", defaults::CONFIG_FILE_NAME);
            return Ok(config);
        }
        info!("No {} found, using built-in defaults", defaults::CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Validate settings for internal consistency.
    ///
    /// Rules:
    /// - Timeouts and latency thresholds must be > 0
    /// - `retry_attempts` must be within 1..=5 and base delay <= cap
    /// - Warning thresholds must sit below their critical counterparts
    /// - Every SQL identifier must be a plain (optionally schema-qualified) name
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let o = &self.orchestrator;
        Self::check_positive(o.check_timeout_ms, "orchestrator.check_timeout_ms", &mut errors);
        Self::check_positive(o.repair_timeout_ms, "orchestrator.repair_timeout_ms", &mut errors);
        if !(defaults::MIN_RETRY_ATTEMPTS..=defaults::MAX_RETRY_ATTEMPTS)
            .contains(&o.retry_attempts)
        {
            errors.push(format!(
                "orchestrator.retry_attempts = {} must be within {}..={}",
                o.retry_attempts,
                defaults::MIN_RETRY_ATTEMPTS,
                defaults::MAX_RETRY_ATTEMPTS
            ));
        }

        let r = &self.retry;
        Self::check_positive(r.base_delay_ms, "retry.base_delay_ms", &mut errors);
        if r.max_delay_ms < r.base_delay_ms {
            errors.push(format!(
                "retry.max_delay_ms ({}) must be >= base_delay_ms ({})",
                r.max_delay_ms, r.base_delay_ms
            ));
        }

        let d = &self.database;
        Self::check_positive(d.slow_query_ms, "database.slow_query_ms", &mut errors);
        Self::check_positive(d.probe_timeout_ms, "database.probe_timeout_ms", &mut errors);
        if d.max_connections == 0 {
            errors.push("database.max_connections must be > 0".to_string());
        }

        let s = &self.slack;
        Self::check_positive(s.slow_request_ms, "slack.slow_request_ms", &mut errors);
        Self::check_positive(s.event_stale_minutes, "slack.event_stale_minutes", &mut errors);
        if s.event_critical_multiplier < 1 {
            errors.push("slack.event_critical_multiplier must be >= 1".to_string());
        }

        let sp = &self.speech;
        Self::check_positive(sp.slow_request_ms, "speech.slow_request_ms", &mut errors);
        Self::check_ratio(sp.quota_warning_ratio, "speech.quota_warning_ratio", &mut errors);
        Self::check_positive(sp.jobs.stuck_minutes, "speech.jobs.stuck_minutes", &mut errors);
        if sp.jobs.critical_multiplier < 1 {
            errors.push("speech.jobs.critical_multiplier must be >= 1".to_string());
        }
        if sp.jobs.expire_after_minutes < sp.jobs.stuck_minutes {
            errors.push(format!(
                "speech.jobs.expire_after_minutes ({}) must be >= stuck_minutes ({})",
                sp.jobs.expire_after_minutes, sp.jobs.stuck_minutes
            ));
        }

        let l = &self.llm;
        Self::check_positive(l.slow_request_ms, "llm.slow_request_ms", &mut errors);
        Self::check_ratio(l.quota_warning_ratio, "llm.quota_warning_ratio", &mut errors);

        let st = &self.storage;
        if st.bucket.trim().is_empty() {
            errors.push("storage.bucket must not be empty".to_string());
        }
        if st.quota_bytes == 0 {
            errors.push("storage.quota_bytes must be > 0".to_string());
        }
        if st.purge_older_than_days == 0 || st.purge_older_than_days > defaults::MAX_PURGE_AGE_DAYS {
            errors.push(format!(
                "storage.purge_older_than_days must be in 1..={}",
                defaults::MAX_PURGE_AGE_DAYS
            ));
        }
        Self::check_ratio(st.usage_warning_ratio, "storage.usage_warning_ratio", &mut errors);
        Self::check_ratio(st.usage_critical_ratio, "storage.usage_critical_ratio", &mut errors);
        Self::check_escalation(
            st.usage_warning_ratio,
            st.usage_critical_ratio,
            "storage.usage_ratio",
            &mut errors,
        );

        // SQL identifiers and suspicious ranges
        let (range_errors, range_warnings) = super::validation::validate_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: u64, name: &str, errors: &mut Vec<String>) {
        if value == 0 {
            errors.push(format!("{name} must be > 0"));
        }
    }

    fn check_ratio(value: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass, so test finiteness first
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            errors.push(format!("{name} = {value} must be within (0, 1]"));
        }
    }

    fn check_escalation(warning: f64, critical: f64, name: &str, errors: &mut Vec<String>) {
        if !warning.is_finite() || !critical.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got warning={warning}, critical={critical})"
            ));
            return;
        }
        if critical <= warning {
            errors.push(format!(
                "{name}: critical ({critical:.3}) must be > warning ({warning:.3})"
            ));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Run-level behaviour of the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Dispatch all checks concurrently, each raced against its own timeout
    #[serde(default = "default_true")]
    pub enable_parallel_checks: bool,

    /// Route Degraded / Critical checks to their repair tools
    #[serde(default)]
    pub enable_auto_repair: bool,

    /// Run queued repairs concurrently instead of one at a time
    #[serde(default)]
    pub enable_parallel_repairs: bool,

    /// Budget per check (ms)
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,

    /// Budget per repair (ms)
    #[serde(default = "default_repair_timeout_ms")]
    pub repair_timeout_ms: u64,

    /// Repairs only describe their steps unless this is `false`
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Attempts per corrective action (1..=5)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_true() -> bool {
    true
}
fn default_check_timeout_ms() -> u64 {
    defaults::CHECK_TIMEOUT_MS
}
fn default_repair_timeout_ms() -> u64 {
    defaults::REPAIR_TIMEOUT_MS
}
fn default_retry_attempts() -> u32 {
    defaults::RETRY_ATTEMPTS
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enable_parallel_checks: true,
            enable_auto_repair: false,
            enable_parallel_repairs: false,
            check_timeout_ms: default_check_timeout_ms(),
            repair_timeout_ms: default_repair_timeout_ms(),
            dry_run: true,
            retry_attempts: default_retry_attempts(),
        }
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Exponential backoff shape: `delay = min(base * 2^(attempt - 1), cap)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    defaults::RETRY_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    defaults::RETRY_MAX_DELAY_MS
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

// ============================================================================
// Database
// ============================================================================

/// Relational database probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Schema whose indexes are inspected
    #[serde(default = "default_schema")]
    pub schema: String,

    /// `SELECT 1` latency above which the database is Degraded (ms)
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_ms: u64,

    /// Timeout for a single probe query (ms)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Index names that must exist in `schema`
    #[serde(default = "default_expected_indexes")]
    pub expected_indexes: Vec<String>,

    /// Child → parent references whose dangling rows count as orphans
    #[serde(default = "default_orphan_rules")]
    pub orphan_rules: Vec<OrphanRule>,

    /// Analysis backlog table used for completion ratio and requeueing
    #[serde(default)]
    pub analyses: AnalysisTable,
}

fn default_schema() -> String {
    "public".to_string()
}
fn default_slow_query_ms() -> u64 {
    defaults::SLOW_QUERY_MS
}
fn default_probe_timeout_ms() -> u64 {
    defaults::PROBE_TIMEOUT_MS
}
fn default_max_connections() -> u32 {
    defaults::DB_MAX_CONNECTIONS
}
fn default_expected_indexes() -> Vec<String> {
    vec![
        "conversations_pkey".to_string(),
        "analyses_pkey".to_string(),
        "analyses_conversation_id_idx".to_string(),
        "transcription_jobs_status_idx".to_string(),
    ]
}
fn default_orphan_rules() -> Vec<OrphanRule> {
    vec![
        OrphanRule {
            name: "analyses_without_conversation".to_string(),
            child_table: "analyses".to_string(),
            child_column: "conversation_id".to_string(),
            parent_table: "conversations".to_string(),
            parent_column: default_parent_column(),
        },
        OrphanRule {
            name: "jobs_without_conversation".to_string(),
            child_table: "transcription_jobs".to_string(),
            child_column: "conversation_id".to_string(),
            parent_table: "conversations".to_string(),
            parent_column: default_parent_column(),
        },
    ]
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            slow_query_ms: default_slow_query_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_connections: default_max_connections(),
            expected_indexes: default_expected_indexes(),
            orphan_rules: default_orphan_rules(),
            analyses: AnalysisTable::default(),
        }
    }
}

/// A foreign-key style reference checked for dangling child rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanRule {
    /// Label used in metrics and action logs
    pub name: String,
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    #[serde(default = "default_parent_column")]
    pub parent_column: String,
}

fn default_parent_column() -> String {
    "id".to_string()
}

/// Table tracking per-conversation analysis status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTable {
    #[serde(default = "default_analysis_table")]
    pub table: String,
    #[serde(default = "default_status_column")]
    pub status_column: String,
    #[serde(default = "default_done_value")]
    pub done_value: String,
    #[serde(default = "default_failed_value")]
    pub failed_value: String,
    #[serde(default = "default_pending_value")]
    pub pending_value: String,
}

fn default_analysis_table() -> String {
    "analyses".to_string()
}
fn default_status_column() -> String {
    "status".to_string()
}
fn default_done_value() -> String {
    "completed".to_string()
}
fn default_failed_value() -> String {
    "failed".to_string()
}
fn default_pending_value() -> String {
    "pending".to_string()
}

impl Default for AnalysisTable {
    fn default() -> Self {
        Self {
            table: default_analysis_table(),
            status_column: default_status_column(),
            done_value: default_done_value(),
            failed_value: default_failed_value(),
            pending_value: default_pending_value(),
        }
    }
}

// ============================================================================
// Slack
// ============================================================================

/// Slack Web API probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackSettings {
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,

    /// Channel whose history proves events are flowing
    #[serde(default)]
    pub monitored_channel: Option<String>,

    /// Channel the bot must be able to post reports to
    #[serde(default)]
    pub report_channel: Option<String>,

    /// OAuth scopes the bot token must carry
    #[serde(default = "default_required_scopes")]
    pub required_scopes: Vec<String>,

    #[serde(default = "default_slow_request_ms")]
    pub slow_request_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Age of the newest monitored message at which event flow is Degraded
    #[serde(default = "default_event_stale_minutes")]
    pub event_stale_minutes: u64,

    /// Multiple of `event_stale_minutes` at which event flow is Critical
    #[serde(default = "default_event_critical_multiplier")]
    pub event_critical_multiplier: u32,

    /// Text posted when a repair resends a verification message
    #[serde(default = "default_heartbeat_message")]
    pub heartbeat_message: String,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}
fn default_required_scopes() -> Vec<String> {
    vec![
        "chat:write".to_string(),
        "channels:read".to_string(),
        "channels:history".to_string(),
        "channels:join".to_string(),
    ]
}
fn default_slow_request_ms() -> u64 {
    defaults::SLOW_REQUEST_MS
}
fn default_request_timeout_ms() -> u64 {
    defaults::HTTP_REQUEST_TIMEOUT_MS
}
fn default_event_stale_minutes() -> u64 {
    120
}
fn default_event_critical_multiplier() -> u32 {
    12
}
fn default_heartbeat_message() -> String {
    "ops-health: delivery check".to_string()
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            api_base: default_slack_api_base(),
            monitored_channel: None,
            report_channel: None,
            required_scopes: default_required_scopes(),
            slow_request_ms: default_slow_request_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            event_stale_minutes: default_event_stale_minutes(),
            event_critical_multiplier: default_event_critical_multiplier(),
            heartbeat_message: default_heartbeat_message(),
        }
    }
}

// ============================================================================
// Model Providers (speech-to-text, language model)
// ============================================================================

/// How an API key is presented to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `Authorization: Token <key>`
    Token,
    /// `Authorization: <key>`
    Raw,
}

/// Speech-to-text provider plus the transcription job table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    #[serde(default = "default_speech_base_url")]
    pub base_url: String,

    /// Listing endpoint used for health probing without spending quota
    #[serde(default = "default_speech_models_path")]
    pub models_path: String,

    /// Transcript submission / status endpoint
    #[serde(default = "default_speech_transcripts_path")]
    pub transcripts_path: String,

    #[serde(default = "default_speech_auth")]
    pub auth_scheme: AuthScheme,

    #[serde(default = "default_slow_request_ms")]
    pub slow_request_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Remaining / limit fraction below which quota is Degraded
    #[serde(default = "default_quota_warning_ratio")]
    pub quota_warning_ratio: f64,

    #[serde(default)]
    pub jobs: JobTable,
}

fn default_speech_base_url() -> String {
    "https://api.assemblyai.com".to_string()
}
fn default_speech_models_path() -> String {
    "/v2/transcript?limit=1".to_string()
}
fn default_speech_transcripts_path() -> String {
    "/v2/transcript".to_string()
}
fn default_speech_auth() -> AuthScheme {
    AuthScheme::Raw
}
fn default_quota_warning_ratio() -> f64 {
    defaults::QUOTA_WARNING_RATIO
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            base_url: default_speech_base_url(),
            models_path: default_speech_models_path(),
            transcripts_path: default_speech_transcripts_path(),
            auth_scheme: default_speech_auth(),
            slow_request_ms: default_slow_request_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            quota_warning_ratio: default_quota_warning_ratio(),
            jobs: JobTable::default(),
        }
    }
}

/// Table tracking transcription jobs submitted to the speech provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTable {
    #[serde(default = "default_jobs_table")]
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_status_column")]
    pub status_column: String,
    #[serde(default = "default_updated_column")]
    pub updated_column: String,
    #[serde(default = "default_external_id_column")]
    pub external_id_column: String,
    #[serde(default = "default_media_url_column")]
    pub media_url_column: String,
    #[serde(default = "default_processing_value")]
    pub processing_value: String,
    #[serde(default = "default_expired_value")]
    pub expired_value: String,

    /// Minutes in `processing_value` after which a job counts as stuck (Degraded)
    #[serde(default = "default_stuck_minutes")]
    pub stuck_minutes: u64,

    /// Multiple of `stuck_minutes` at which stuck jobs are Critical
    #[serde(default = "default_job_critical_multiplier")]
    pub critical_multiplier: u32,

    /// Stuck jobs older than this are expired instead of resubmitted
    #[serde(default = "default_expire_after_minutes")]
    pub expire_after_minutes: u64,
}

fn default_jobs_table() -> String {
    "transcription_jobs".to_string()
}
fn default_id_column() -> String {
    "id".to_string()
}
fn default_updated_column() -> String {
    "updated_at".to_string()
}
fn default_external_id_column() -> String {
    "external_id".to_string()
}
fn default_media_url_column() -> String {
    "audio_url".to_string()
}
fn default_processing_value() -> String {
    "processing".to_string()
}
fn default_expired_value() -> String {
    "expired".to_string()
}
fn default_stuck_minutes() -> u64 {
    30
}
fn default_job_critical_multiplier() -> u32 {
    4
}
fn default_expire_after_minutes() -> u64 {
    1_440
}

impl Default for JobTable {
    fn default() -> Self {
        Self {
            table: default_jobs_table(),
            id_column: default_id_column(),
            status_column: default_status_column(),
            updated_column: default_updated_column(),
            external_id_column: default_external_id_column(),
            media_url_column: default_media_url_column(),
            processing_value: default_processing_value(),
            expired_value: default_expired_value(),
            stuck_minutes: default_stuck_minutes(),
            critical_multiplier: default_job_critical_multiplier(),
            expire_after_minutes: default_expire_after_minutes(),
        }
    }
}

/// Language-model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_models_path")]
    pub models_path: String,

    #[serde(default = "default_llm_auth")]
    pub auth_scheme: AuthScheme,

    #[serde(default = "default_slow_request_ms")]
    pub slow_request_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_quota_warning_ratio")]
    pub quota_warning_ratio: f64,

    /// Let auto-repair reset failed analyses to pending once the provider recovers
    #[serde(default)]
    pub requeue_failed_analyses: bool,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_llm_models_path() -> String {
    "/v1/models".to_string()
}
fn default_llm_auth() -> AuthScheme {
    AuthScheme::Bearer
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            models_path: default_llm_models_path(),
            auth_scheme: default_llm_auth(),
            slow_request_ms: default_slow_request_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            quota_warning_ratio: default_quota_warning_ratio(),
            requeue_failed_analyses: false,
        }
    }
}

// ============================================================================
// Object Storage
// ============================================================================

/// Object storage bucket (Supabase-style storage REST API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Project URL; the storage API lives under `/storage/v1`
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Bytes the bucket may hold before usage is Critical
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,

    #[serde(default = "default_usage_warning_ratio")]
    pub usage_warning_ratio: f64,

    #[serde(default = "default_usage_critical_ratio")]
    pub usage_critical_ratio: f64,

    /// Upper bound on objects enumerated per scan
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,

    /// A public bucket is reported as Degraded when this is set
    #[serde(default = "default_true")]
    pub expect_private: bool,

    /// Prefix holding temporary uploads that repairs may purge
    #[serde(default = "default_purge_prefix")]
    pub purge_prefix: Option<String>,

    #[serde(default = "default_purge_older_than_days")]
    pub purge_older_than_days: u32,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_bucket() -> String {
    "recordings".to_string()
}
fn default_quota_bytes() -> u64 {
    // 1 GiB
    1_073_741_824
}
fn default_usage_warning_ratio() -> f64 {
    defaults::STORAGE_USAGE_WARNING_RATIO
}
fn default_usage_critical_ratio() -> f64 {
    defaults::STORAGE_USAGE_CRITICAL_RATIO
}
fn default_max_objects() -> usize {
    defaults::STORAGE_MAX_OBJECTS
}
fn default_purge_prefix() -> Option<String> {
    Some("tmp/".to_string())
}
fn default_purge_older_than_days() -> u32 {
    7
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            bucket: default_bucket(),
            quota_bytes: default_quota_bytes(),
            usage_warning_ratio: default_usage_warning_ratio(),
            usage_critical_ratio: default_usage_critical_ratio(),
            max_objects: default_max_objects(),
            expect_private: true,
            purge_prefix: default_purge_prefix(),
            purge_older_than_days: default_purge_older_than_days(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

// ============================================================================
// Notify
// ============================================================================

/// Report hand-off to the external notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySettings {
    /// Only send when the run's worst severity is at least this
    #[serde(default = "default_notify_min_severity")]
    pub min_severity: crate::types::Severity,

    /// Heading of the rendered report
    #[serde(default = "default_report_title")]
    pub report_title: String,
}

fn default_notify_min_severity() -> crate::types::Severity {
    crate::types::Severity::Degraded
}
fn default_report_title() -> String {
    "Operational Health Report".to_string()
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            min_severity: default_notify_min_severity(),
            report_title: default_report_title(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = OpsConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: OpsConfig = toml::from_str("").expect("empty TOML should parse");
        assert!(config.orchestrator.enable_parallel_checks);
        assert!(!config.orchestrator.enable_auto_repair);
        assert!(config.orchestrator.dry_run);
        assert_eq!(config.orchestrator.retry_attempts, 3);
        assert_eq!(config.speech.jobs.stuck_minutes, 30);
        assert_eq!(config.llm.auth_scheme, AuthScheme::Bearer);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[orchestrator]
enable_auto_repair = true
check_timeout_ms = 2500

[slack]
monitored_channel = "C0123"
"#;
        let config: OpsConfig = toml::from_str(toml_str).expect("partial TOML should parse");
        assert!(config.orchestrator.enable_auto_repair);
        assert_eq!(config.orchestrator.check_timeout_ms, 2500);
        assert_eq!(config.slack.monitored_channel.as_deref(), Some("C0123"));
        // Non-overridden values retain defaults
        assert!(config.orchestrator.dry_run);
        assert_eq!(config.slack.api_base, "https://slack.com/api");
    }

    #[test]
    fn test_validation_rejects_out_of_range_retry_attempts() {
        let mut config = OpsConfig::default();
        config.orchestrator.retry_attempts = 9;
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Validation(ref e)) if e.iter().any(|m| m.contains("retry_attempts"))));
    }

    #[test]
    fn test_validation_rejects_inverted_storage_ratios() {
        let mut config = OpsConfig::default();
        config.storage.usage_warning_ratio = 0.9;
        config.storage.usage_critical_ratio = 0.85;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_cap_below_base() {
        let mut config = OpsConfig::default();
        config.retry.base_delay_ms = 2_000;
        config.retry.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_nan_ratio() {
        let mut config = OpsConfig::default();
        config.llm.quota_warning_ratio = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let original = OpsConfig::default();
        let toml_str = original.to_toml().expect("serialization should work");
        let roundtripped = OpsConfig::from_toml_str(&toml_str).expect("deserialization should work");
        assert_eq!(roundtripped.database.orphan_rules, original.database.orphan_rules);
        assert_eq!(roundtripped.speech.jobs, original.speech.jobs);
        assert_eq!(roundtripped.storage.purge_prefix, original.storage.purge_prefix);
    }
}
