//! Slack checks: token validity, scopes, event flow, send path

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;

use super::{millis, probe, settle, CheckInput};
use crate::collaborators::DependencyError;
use crate::config::defaults;
use crate::tools::classify::{classify_latency, classify_staleness};
use crate::tools::{Tool, ToolContext};
use crate::types::{CheckResult, Dependency, Severity, ToolError, ToolId};

const DEP: Dependency = Dependency::Slack;

fn skipped(tool: ToolId, reason: &str) -> CheckResult {
    CheckResult::healthy(tool.as_str(), format!("skipped: {reason}")).with_metric("skipped", true)
}

// ============================================================================
// Connectivity
// ============================================================================

pub struct SlackConnectivityCheck;

impl SlackConnectivityCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let slack = ctx.slack()?;
        let settings = &ctx.config().slack;
        let identity = probe(DEP, input.timeout(settings.request_timeout_ms), slack.auth_test()).await?;
        let slow = Duration::from_millis(settings.slow_request_ms);
        let status = classify_latency(identity.latency, slow);
        let details = format!(
            "authenticated as {} in {} ms",
            identity.user_id,
            millis(identity.latency)
        );
        let mut result = CheckResult::classified(ToolId::SlackConnectivity.as_str(), status, details)
            .with_metric("latency_ms", millis(identity.latency))
            .with_metric("bot_user_id", identity.user_id);
        if let Some(team) = identity.team {
            result = result.with_metric("team", team);
        }
        Ok(result)
    }
}

#[async_trait]
impl Tool for SlackConnectivityCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::SlackConnectivity
    }

    fn description(&self) -> &'static str {
        "Validate the bot token with auth.test and measure API latency"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}

// ============================================================================
// Permissions
// ============================================================================

pub struct SlackPermissionsCheck;

impl SlackPermissionsCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let slack = ctx.slack()?;
        let settings = &ctx.config().slack;
        let limit = input.timeout(settings.request_timeout_ms);
        let identity = probe(DEP, limit, slack.auth_test()).await?;

        let mut status = Severity::Healthy;
        let mut notes = Vec::new();
        let mut result_metrics = Vec::new();

        if identity.scopes.is_empty() {
            notes.push("token scopes not reported".to_string());
            result_metrics.push(("scopes_reported", json!(false)));
        } else {
            let missing: Vec<&str> = settings
                .required_scopes
                .iter()
                .map(String::as_str)
                .filter(|s| !identity.scopes.iter().any(|granted| granted == s))
                .collect();
            if !settings.required_scopes.is_empty() && missing.len() == settings.required_scopes.len() {
                status = Severity::Critical;
                notes.push("no required scopes granted".to_string());
            } else if !missing.is_empty() {
                status = Severity::Degraded;
                notes.push(format!("missing scopes: {}", missing.join(", ")));
            }
            result_metrics.push(("missing_scopes", json!(missing)));
            result_metrics.push(("granted_scopes", json!(identity.scopes)));
        }

        if let Some(channel) = &settings.monitored_channel {
            result_metrics.push(("channel", json!(channel)));
            match tokio::time::timeout(limit, slack.channel_info(channel)).await {
                Ok(Ok(info)) => {
                    result_metrics.push(("is_member", json!(info.is_member)));
                    if !info.is_member {
                        status = status.max(Severity::Degraded);
                        notes.push(format!("bot is not a member of {channel}"));
                    }
                }
                Ok(Err(DependencyError::NotFound(code))) => {
                    status = Severity::Critical;
                    notes.push(format!("{channel}: {code}"));
                }
                Ok(Err(e)) => return Err(ToolError::from_dependency(DEP, e)),
                Err(_) => return Err(ToolError::from_dependency(DEP, DependencyError::Timeout)),
            }
        }

        let details = if notes.is_empty() {
            "all required scopes granted".to_string()
        } else {
            notes.join("; ")
        };
        let mut result = if status == Severity::Critical {
            CheckResult::critical(ToolId::SlackPermissions.as_str(), details)
        } else {
            CheckResult::classified(ToolId::SlackPermissions.as_str(), status, details)
        };
        for (key, value) in result_metrics {
            result = result.with_metric(key, value);
        }
        Ok(result)
    }
}

#[async_trait]
impl Tool for SlackPermissionsCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::SlackPermissions
    }

    fn description(&self) -> &'static str {
        "Compare granted OAuth scopes with the required set and confirm channel membership"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}

// ============================================================================
// Event Flow
// ============================================================================

pub struct SlackEventFlowCheck;

impl SlackEventFlowCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let tool = ToolId::SlackEventFlow;
        let slack = ctx.slack()?;
        let settings = &ctx.config().slack;
        let Some(channel) = settings.monitored_channel.as_deref() else {
            return Ok(skipped(tool, "slack.monitored_channel not set"));
        };

        let limit = input.timeout(settings.request_timeout_ms);
        let messages = match tokio::time::timeout(limit, slack.history(channel, defaults::SLACK_HISTORY_LIMIT)).await {
            Ok(Ok(messages)) => messages,
            Ok(Err(e)) if e.is_api_code("not_in_channel") => {
                return Ok(CheckResult::degraded(
                    tool.as_str(),
                    format!("bot cannot read {channel}: not_in_channel"),
                )
                .with_metric("channel", channel)
                .with_metric("is_member", false));
            }
            Ok(Err(e)) => return Err(ToolError::from_dependency(DEP, e)),
            Err(_) => return Err(ToolError::from_dependency(DEP, DependencyError::Timeout)),
        };

        let latest = messages.iter().filter_map(|m| m.timestamp()).max();
        let Some(latest) = latest else {
            return Ok(CheckResult::degraded(tool.as_str(), format!("no messages in {channel}"))
                .with_metric("channel", channel)
                .with_metric("messages_sampled", messages.len()));
        };

        let age = (Utc::now() - latest).to_std().unwrap_or(Duration::ZERO);
        let stuck = Duration::from_secs(settings.event_stale_minutes.saturating_mul(60));
        let status = classify_staleness(age, stuck, settings.event_critical_multiplier);
        let age_minutes = age.as_secs() / 60;
        let details = format!("latest event in {channel} is {age_minutes} min old");

        Ok(CheckResult::classified(tool.as_str(), status, details)
            .with_metric("channel", channel)
            .with_metric("last_event_age_minutes", age_minutes)
            .with_metric("last_event_at", latest.to_rfc3339())
            .with_metric("messages_sampled", messages.len()))
    }
}

#[async_trait]
impl Tool for SlackEventFlowCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::SlackEventFlow
    }

    fn description(&self) -> &'static str {
        "Read recent history of the monitored channel and classify how stale the newest event is"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}

// ============================================================================
// Send Path
// ============================================================================

pub struct SlackSendPathCheck;

impl SlackSendPathCheck {
    async fn evaluate(input: &CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let tool = ToolId::SlackSendPath;
        let slack = ctx.slack()?;
        let settings = &ctx.config().slack;
        let Some(channel) = settings
            .report_channel
            .as_deref()
            .or(settings.monitored_channel.as_deref())
        else {
            return Ok(skipped(tool, "no report or monitored channel configured"));
        };

        let limit = input.timeout(settings.request_timeout_ms);
        let info = match tokio::time::timeout(limit, slack.channel_info(channel)).await {
            Ok(Ok(info)) => info,
            Ok(Err(DependencyError::NotFound(code))) => {
                return Ok(CheckResult::critical(tool.as_str(), format!("{channel}: {code}"))
                    .with_metric("channel", channel));
            }
            Ok(Err(e)) => return Err(ToolError::from_dependency(DEP, e)),
            Err(_) => return Err(ToolError::from_dependency(DEP, DependencyError::Timeout)),
        };

        let result = if info.is_archived {
            CheckResult::critical(tool.as_str(), format!("{channel} is archived"))
        } else if !info.is_member {
            CheckResult::degraded(tool.as_str(), format!("bot is not a member of {channel}"))
        } else {
            CheckResult::healthy(tool.as_str(), format!("bot can post to {channel}"))
        };
        Ok(result
            .with_metric("channel", channel)
            .with_metric("is_member", info.is_member)
            .with_metric("is_archived", info.is_archived))
    }
}

#[async_trait]
impl Tool for SlackSendPathCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::SlackSendPath
    }

    fn description(&self) -> &'static str {
        "Confirm the report channel exists, is not archived, and has the bot as a member"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        Ok(settle(self.id(), Self::evaluate(&input, ctx).await))
    }
}
