//! Config validation: unknown-key detection with Levenshtein suggestions,
//! SQL identifier checks and cross-field range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `OpsConfig`.
///
/// Must be kept in step with the struct hierarchy in `ops_config.rs`.
/// Array-of-table entries (`database.orphan_rules`) are not descended into.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [orchestrator]
        "orchestrator",
        "orchestrator.enable_parallel_checks",
        "orchestrator.enable_auto_repair",
        "orchestrator.enable_parallel_repairs",
        "orchestrator.check_timeout_ms",
        "orchestrator.repair_timeout_ms",
        "orchestrator.dry_run",
        "orchestrator.retry_attempts",
        // [retry]
        "retry",
        "retry.base_delay_ms",
        "retry.max_delay_ms",
        // [database]
        "database",
        "database.schema",
        "database.slow_query_ms",
        "database.probe_timeout_ms",
        "database.max_connections",
        "database.expected_indexes",
        "database.orphan_rules",
        // [database.analyses]
        "database.analyses",
        "database.analyses.table",
        "database.analyses.status_column",
        "database.analyses.done_value",
        "database.analyses.failed_value",
        "database.analyses.pending_value",
        // [slack]
        "slack",
        "slack.api_base",
        "slack.monitored_channel",
        "slack.report_channel",
        "slack.required_scopes",
        "slack.slow_request_ms",
        "slack.request_timeout_ms",
        "slack.event_stale_minutes",
        "slack.event_critical_multiplier",
        "slack.heartbeat_message",
        // [speech]
        "speech",
        "speech.base_url",
        "speech.models_path",
        "speech.transcripts_path",
        "speech.auth_scheme",
        "speech.slow_request_ms",
        "speech.request_timeout_ms",
        "speech.quota_warning_ratio",
        // [speech.jobs]
        "speech.jobs",
        "speech.jobs.table",
        "speech.jobs.id_column",
        "speech.jobs.status_column",
        "speech.jobs.updated_column",
        "speech.jobs.external_id_column",
        "speech.jobs.media_url_column",
        "speech.jobs.processing_value",
        "speech.jobs.expired_value",
        "speech.jobs.stuck_minutes",
        "speech.jobs.critical_multiplier",
        "speech.jobs.expire_after_minutes",
        // [llm]
        "llm",
        "llm.base_url",
        "llm.models_path",
        "llm.auth_scheme",
        "llm.slow_request_ms",
        "llm.request_timeout_ms",
        "llm.quota_warning_ratio",
        "llm.requeue_failed_analyses",
        // [storage]
        "storage",
        "storage.base_url",
        "storage.bucket",
        "storage.quota_bytes",
        "storage.usage_warning_ratio",
        "storage.usage_critical_ratio",
        "storage.max_objects",
        "storage.expect_private",
        "storage.purge_prefix",
        "storage.purge_older_than_days",
        "storage.request_timeout_ms",
        // [notify]
        "notify",
        "notify.min_severity",
        "notify.report_title",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new(); // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| {
            let suggestion = suggest_correction(&key, &known);
            ValidationWarning {
                message: format!("Unknown config key '{key}'"),
                field: key,
                suggestion,
            }
        })
        .collect()
}

// ============================================================================
// SQL Identifiers
// ============================================================================

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
            .unwrap_or_else(|_| unreachable!("static identifier pattern is valid"))
    })
}

/// Whether `name` may be spliced into SQL as a (schema-qualified) identifier.
///
/// Table and column names come from config and cannot be bound as query
/// parameters, so anything beyond `[A-Za-z_][A-Za-z0-9_]*` is refused.
pub fn is_safe_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate identifiers and cross-field ranges on a parsed `OpsConfig`.
///
/// Returns (errors, warnings): errors must prevent startup; warnings are
/// suspicious but not fatal.
pub fn validate_ranges(config: &super::OpsConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let db = &config.database;
    let jobs = &config.speech.jobs;
    let mut identifiers: Vec<(String, &str)> = vec![
        ("database.schema".to_string(), db.schema.as_str()),
        ("database.analyses.table".to_string(), db.analyses.table.as_str()),
        (
            "database.analyses.status_column".to_string(),
            db.analyses.status_column.as_str(),
        ),
        ("speech.jobs.table".to_string(), jobs.table.as_str()),
        ("speech.jobs.id_column".to_string(), jobs.id_column.as_str()),
        ("speech.jobs.status_column".to_string(), jobs.status_column.as_str()),
        ("speech.jobs.updated_column".to_string(), jobs.updated_column.as_str()),
        (
            "speech.jobs.external_id_column".to_string(),
            jobs.external_id_column.as_str(),
        ),
        (
            "speech.jobs.media_url_column".to_string(),
            jobs.media_url_column.as_str(),
        ),
    ];
    for (i, rule) in db.orphan_rules.iter().enumerate() {
        let prefix = format!("database.orphan_rules[{i}]");
        identifiers.push((format!("{prefix}.child_table"), rule.child_table.as_str()));
        identifiers.push((format!("{prefix}.child_column"), rule.child_column.as_str()));
        identifiers.push((format!("{prefix}.parent_table"), rule.parent_table.as_str()));
        identifiers.push((format!("{prefix}.parent_column"), rule.parent_column.as_str()));
    }
    for index in &db.expected_indexes {
        identifiers.push(("database.expected_indexes".to_string(), index.as_str()));
    }
    for (field, value) in identifiers {
        if !is_safe_identifier(value) {
            errors.push(format!("{field} = '{value}' is not a plain SQL identifier"));
        }
    }

    // A probe that outlives its check can never report; the check times out first
    let check_budget = config.orchestrator.check_timeout_ms;
    for (field, probe) in [
        ("database.probe_timeout_ms", db.probe_timeout_ms),
        ("slack.request_timeout_ms", config.slack.request_timeout_ms),
        ("speech.request_timeout_ms", config.speech.request_timeout_ms),
        ("llm.request_timeout_ms", config.llm.request_timeout_ms),
        ("storage.request_timeout_ms", config.storage.request_timeout_ms),
    ] {
        if probe > check_budget {
            warnings.push(ValidationWarning {
                field: field.to_string(),
                message: format!(
                    "{field} = {probe} exceeds orchestrator.check_timeout_ms = {check_budget}"
                ),
                suggestion: None,
            });
        }
    }

    if db.slow_query_ms >= db.probe_timeout_ms {
        warnings.push(ValidationWarning {
            field: "database.slow_query_ms".to_string(),
            message: format!(
                "database.slow_query_ms = {} is not below probe_timeout_ms = {}; slow queries will time out instead of degrading",
                db.slow_query_ms, db.probe_timeout_ms
            ),
            suggestion: None,
        });
    }

    if let Some(prefix) = &config.storage.purge_prefix {
        if prefix.trim_matches('/').is_empty() {
            errors.push(
                "storage.purge_prefix must not be empty or '/' (would purge the whole bucket)"
                    .to_string(),
            );
        }
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
