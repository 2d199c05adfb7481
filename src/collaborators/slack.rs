//! Slack Web API collaborator

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

use super::http::{auth_headers, build_client, ensure_success, join_url};
use super::DependencyError;
use crate::config::{AuthScheme, SlackSettings};

/// Identity behind the bot token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackIdentity {
    pub user_id: String,
    pub team: Option<String>,
    /// Scopes granted to the token (from the `x-oauth-scopes` response header)
    pub scopes: Vec<String>,
    pub latency: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub is_member: bool,
    pub is_archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackMessage {
    pub ts: String,
    pub text: Option<String>,
}

impl SlackMessage {
    /// Slack `ts` values are `"<unix seconds>.<sequence>"`.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let (secs, micros) = self.ts.split_once('.').unwrap_or((self.ts.as_str(), "0"));
        let secs: i64 = secs.parse().ok()?;
        let micros: u32 = micros.get(..6).unwrap_or(micros).parse().unwrap_or(0);
        Utc.timestamp_opt(secs, micros.saturating_mul(1_000)).single()
    }
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn auth_test(&self) -> Result<SlackIdentity, DependencyError>;

    async fn channel_info(&self, channel: &str) -> Result<ChannelInfo, DependencyError>;

    /// Most recent messages, newest first.
    async fn history(&self, channel: &str, limit: u32) -> Result<Vec<SlackMessage>, DependencyError>;

    async fn join_channel(&self, channel: &str) -> Result<(), DependencyError>;

    /// Post `text`; returns the message `ts`.
    async fn post_message(&self, channel: &str, text: &str) -> Result<String, DependencyError>;
}

/// Map a Slack `error` code to a dependency error.
pub(crate) fn slack_error(code: &str, headers: &HeaderMap) -> DependencyError {
    match code {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
        | "token_expired" | "missing_scope" => DependencyError::Unauthorized(code.to_string()),
        "channel_not_found" | "is_archived" => DependencyError::NotFound(code.to_string()),
        "ratelimited" => DependencyError::RateLimited {
            retry_after: super::http::parse_retry_after(headers),
        },
        "internal_error" | "fatal_error" | "service_unavailable" | "request_timeout" => {
            DependencyError::Api {
                code: code.to_string(),
                message: "slack platform error".to_string(),
                retryable: true,
            }
        }
        other => DependencyError::Api {
            code: other.to_string(),
            message: "slack api error".to_string(),
            retryable: false,
        },
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    error: Option<String>,
    #[serde(flatten)]
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AuthTestBody {
    user_id: Option<String>,
    team: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelBody {
    channel: ChannelFlags,
}

#[derive(Debug, Deserialize)]
struct ChannelFlags {
    #[serde(default)]
    is_member: bool,
    #[serde(default)]
    is_archived: bool,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    ts: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostBody {
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

/// Arguments for one Web API method. Read methods only accept form-encoded
/// arguments; JSON bodies are for write methods.
enum Args {
    Form(Vec<(&'static str, String)>),
    Json(serde_json::Value),
}

pub struct SlackWebClient {
    http: reqwest::Client,
    api_base: String,
}

impl SlackWebClient {
    pub fn new(settings: &SlackSettings, bot_token: &str) -> Result<Self, DependencyError> {
        let headers = auth_headers(AuthScheme::Bearer, bot_token)?;
        Ok(Self {
            http: build_client(settings.request_timeout_ms, headers)?,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// POST a Web API method and decode its envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Args,
    ) -> Result<(T, HeaderMap), DependencyError> {
        let request = self.http.post(join_url(&self.api_base, method));
        let request = match &args {
            Args::Form(params) => request.form(params),
            Args::Json(payload) => request.json(payload),
        };
        let response = request.send().await?;
        let response = ensure_success(response).await?;
        let headers = response.headers().clone();
        let envelope: Envelope<T> = response.json().await?;
        if !envelope.ok {
            let code = envelope.error.unwrap_or_else(|| "unknown_error".to_string());
            return Err(slack_error(&code, &headers));
        }
        let body = envelope.body.ok_or_else(|| {
            DependencyError::InvalidResponse(format!("slack {method} returned an empty body"))
        })?;
        Ok((body, headers))
    }
}

#[async_trait]
impl SlackApi for SlackWebClient {
    async fn auth_test(&self) -> Result<SlackIdentity, DependencyError> {
        let started = Instant::now();
        let (body, headers): (AuthTestBody, _) = self.call("auth.test", Args::Form(Vec::new())).await?;
        let latency = started.elapsed();
        let user_id = body
            .user_id
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| DependencyError::InvalidResponse("auth.test missing user_id".into()))?;
        let scopes = headers
            .get("x-oauth-scopes")
            .and_then(|v| v.to_str().ok())
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(SlackIdentity {
            user_id,
            team: body.team,
            scopes,
            latency,
        })
    }

    async fn channel_info(&self, channel: &str) -> Result<ChannelInfo, DependencyError> {
        let (body, _): (ChannelBody, _) = self
            .call("conversations.info", Args::Form(vec![("channel", channel.to_string())]))
            .await?;
        Ok(ChannelInfo {
            is_member: body.channel.is_member,
            is_archived: body.channel.is_archived,
        })
    }

    async fn history(&self, channel: &str, limit: u32) -> Result<Vec<SlackMessage>, DependencyError> {
        let (body, _): (HistoryBody, _) = self
            .call(
                "conversations.history",
                Args::Form(vec![("channel", channel.to_string()), ("limit", limit.to_string())]),
            )
            .await?;
        Ok(body
            .messages
            .into_iter()
            .map(|m| SlackMessage { ts: m.ts, text: m.text })
            .collect())
    }

    async fn join_channel(&self, channel: &str) -> Result<(), DependencyError> {
        let _: (Empty, _) = self
            .call("conversations.join", Args::Json(json!({ "channel": channel })))
            .await?;
        Ok(())
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<String, DependencyError> {
        let (body, _): (PostBody, _) = self
            .call(
                "chat.postMessage",
                Args::Json(json!({
                    "channel": channel,
                    "text": text,
                    "unfurl_links": false,
                    "unfurl_media": false,
                })),
            )
            .await?;
        body.ts
            .ok_or_else(|| DependencyError::InvalidResponse("chat.postMessage missing ts".into()))
    }
}
