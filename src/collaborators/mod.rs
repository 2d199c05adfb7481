//! Collaborator clients for every external dependency
//!
//! Tool handlers never talk to the network or read the environment directly;
//! they receive trait objects from the [`ToolContext`](crate::tools::ToolContext).
//! Each trait has one production implementation:
//!
//! | Trait | Implementation | Transport |
//! |-------|----------------|-----------|
//! | [`Database`] | [`PgDatabase`] | sqlx / PostgreSQL |
//! | [`SlackApi`] | [`SlackWebClient`] | Slack Web API |
//! | [`SpeechApi`] | [`HttpSpeechProvider`] | provider REST API |
//! | [`ModelProvider`] | [`HttpModelProvider`] | provider REST API |
//! | [`ObjectStore`] | [`StorageRestClient`] | Supabase-style storage API |

mod database;
pub mod http;
mod provider;
mod slack;
mod speech;
mod storage;

pub use database::{Database, IndexInfo, PgDatabase, StaleJob, StatusCounts};
pub use provider::{HttpModelProvider, ModelProvider, ProviderProbe, RateLimitInfo};
pub use slack::{ChannelInfo, SlackApi, SlackIdentity, SlackMessage, SlackWebClient};
pub use speech::{HttpSpeechProvider, SpeechApi};
pub use storage::{BucketInfo, ObjectStore, StorageRestClient, StoredObject};

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::OpsConfig;
use crate::tools::ToolContext;

// ============================================================================
// Error Type
// ============================================================================

/// Failure reported by a collaborator call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DependencyError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited{}", .retry_after.map(|d| format!(" (retry after {} ms)", d.as_millis())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out")]
    Timeout,

    #[error("api error {code}: {message}")]
    Api {
        code: String,
        message: String,
        retryable: bool,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl DependencyError {
    /// Transport failures, rate limiting and server-side errors may succeed on retry;
    /// credential and missing-resource failures never will.
    pub fn is_retryable(&self) -> bool {
        match self {
            DependencyError::Unreachable(_)
            | DependencyError::RateLimited { .. }
            | DependencyError::Timeout => true,
            DependencyError::Api { retryable, .. } => *retryable,
            DependencyError::Unauthorized(_)
            | DependencyError::NotFound(_)
            | DependencyError::InvalidResponse(_) => false,
        }
    }

    /// Server-requested wait before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DependencyError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this is a platform error with the given code (e.g. `not_in_channel`).
    pub fn is_api_code(&self, expected: &str) -> bool {
        matches!(self, DependencyError::Api { code, .. } if code == expected)
    }
}

impl From<reqwest::Error> for DependencyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DependencyError::Timeout
        } else if e.is_decode() {
            DependencyError::InvalidResponse(e.to_string())
        } else {
            DependencyError::Unreachable(e.to_string())
        }
    }
}

impl From<sqlx::Error> for DependencyError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut => DependencyError::Timeout,
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                DependencyError::Unreachable(e.to_string())
            }
            sqlx::Error::Configuration(_) => DependencyError::Unauthorized(e.to_string()),
            sqlx::Error::RowNotFound => DependencyError::NotFound(e.to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // invalid_password / invalid_authorization_specification
                Some("28P01" | "28000") => DependencyError::Unauthorized(db.message().to_string()),
                // undefined_table / undefined_column / undefined_object
                Some(code @ ("42P01" | "42703" | "42704")) => DependencyError::Api {
                    code: code.to_string(),
                    message: db.message().to_string(),
                    retryable: false,
                },
                // serialization_failure / deadlock_detected / too_many_connections
                Some(code @ ("40001" | "40P01" | "53300")) => DependencyError::Api {
                    code: code.to_string(),
                    message: db.message().to_string(),
                    retryable: true,
                },
                code => DependencyError::Api {
                    code: code.unwrap_or("unknown").to_string(),
                    message: db.message().to_string(),
                    retryable: false,
                },
            },
            _ => DependencyError::InvalidResponse(e.to_string()),
        }
    }
}

// ============================================================================
// Construction
// ============================================================================

/// Secrets read once at startup. Absent values leave the matching
/// collaborator unset so its checks report `Critical` without a network call.
#[derive(Clone, Default)]
pub struct Credentials {
    pub database_url: Option<String>,
    pub slack_bot_token: Option<String>,
    pub speech_api_key: Option<String>,
    pub llm_api_key: Option<String>,
    pub storage_service_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("Credentials")
            .field("database_url", &mask(&self.database_url))
            .field("slack_bot_token", &mask(&self.slack_bot_token))
            .field("speech_api_key", &mask(&self.speech_api_key))
            .field("llm_api_key", &mask(&self.llm_api_key))
            .field("storage_service_key", &mask(&self.storage_service_key))
            .finish()
    }
}

/// Build every collaborator for which credentials are present.
///
/// No connection is opened here: the database pool connects lazily and HTTP
/// clients only build their request defaults. A client that cannot be built
/// is logged and left unset.
pub fn build_context(config: Arc<OpsConfig>, credentials: &Credentials) -> ToolContext {
    let mut ctx = ToolContext::new(Arc::clone(&config));

    if let Some(url) = non_empty(&credentials.database_url) {
        match PgDatabase::connect_lazy(url, &config.database) {
            Ok(db) => ctx = ctx.with_database(Arc::new(db)),
            Err(e) => warn!(error = %e, "Database client unavailable"),
        }
    }

    if let Some(token) = non_empty(&credentials.slack_bot_token) {
        match SlackWebClient::new(&config.slack, token) {
            Ok(client) => ctx = ctx.with_slack(Arc::new(client)),
            Err(e) => warn!(error = %e, "Slack client unavailable"),
        }
    }

    if let Some(key) = non_empty(&credentials.speech_api_key) {
        match HttpSpeechProvider::new(&config.speech, key) {
            Ok(client) => ctx = ctx.with_speech(Arc::new(client)),
            Err(e) => warn!(error = %e, "Speech provider client unavailable"),
        }
    }

    if let Some(key) = non_empty(&credentials.llm_api_key) {
        match HttpModelProvider::new(
            "llm",
            &config.llm.base_url,
            &config.llm.models_path,
            config.llm.auth_scheme,
            key,
            config.llm.request_timeout_ms,
        ) {
            Ok(client) => ctx = ctx.with_llm(Arc::new(client)),
            Err(e) => warn!(error = %e, "LLM provider client unavailable"),
        }
    }

    match (&config.storage.base_url, non_empty(&credentials.storage_service_key)) {
        (Some(base_url), Some(key)) => {
            match StorageRestClient::new(base_url, key, config.storage.request_timeout_ms) {
                Ok(client) => ctx = ctx.with_storage(Arc::new(client)),
                Err(e) => warn!(error = %e, "Storage client unavailable"),
            }
        }
        (None, Some(_)) => warn!("STORAGE_SERVICE_KEY set but storage.base_url is not configured"),
        _ => {}
    }

    info!(
        database = ctx.has_database(),
        slack = ctx.has_slack(),
        speech = ctx.has_speech(),
        llm = ctx.has_llm(),
        storage = ctx.has_storage(),
        "Collaborators configured"
    );
    ctx
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
