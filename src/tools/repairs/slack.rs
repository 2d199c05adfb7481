//! Slack repair: re-authenticate, rejoin a channel, resend a heartbeat message

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_retry_attempts, default_dry_run, default_retry_attempts};
use crate::collaborators::{DependencyError, SlackApi};
use crate::config::defaults;
use crate::tools::retry::{retry_with_backoff, RetryPolicy};
use crate::tools::{Tool, ToolContext, ToolInput};
use crate::types::{RepairResult, ToolError, ToolId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SlackAction {
    Reconnect,
    RejoinChannel,
    ResendMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SlackRepairInput {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_actions")]
    pub actions: Vec<SlackAction>,
    /// Channel id for `rejoin_channel` and `resend_message`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Text for `resend_message`; the configured heartbeat when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn default_actions() -> Vec<SlackAction> {
    vec![SlackAction::Reconnect]
}

impl ToolInput for SlackRepairInput {
    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        check_retry_attempts(self.retry_attempts, &mut issues);
        if self.actions.is_empty() {
            issues.push("actions must not be empty".to_string());
        }
        let needs_channel = self
            .actions
            .iter()
            .any(|a| matches!(a, SlackAction::RejoinChannel | SlackAction::ResendMessage));
        match self.channel.as_deref() {
            None if needs_channel => {
                issues.push("rejoin_channel and resend_message require a channel".to_string());
            }
            Some(c) if c.trim().is_empty() => issues.push("channel must not be blank".to_string()),
            _ => {}
        }
        if self.message.as_deref().is_some_and(|m| m.trim().is_empty()) {
            issues.push("message must not be blank".to_string());
        }
        issues
    }
}

impl SlackRepairInput {
    fn actions(&self) -> Vec<SlackAction> {
        let mut unique = Vec::new();
        for action in &self.actions {
            if !unique.contains(action) {
                unique.push(*action);
            }
        }
        unique
    }
}

pub struct SlackRepair;

impl SlackRepair {
    fn plan(input: &SlackRepairInput, message: &str) -> Vec<String> {
        let channel = input.channel.as_deref().unwrap_or("-");
        input
            .actions()
            .into_iter()
            .map(|action| match action {
                SlackAction::Reconnect => format!(
                    "would call auth.test (up to {} attempts)",
                    input.retry_attempts
                ),
                SlackAction::RejoinChannel => format!("would join channel {channel}"),
                SlackAction::ResendMessage => {
                    format!("would post \"{message}\" to {channel} and confirm it in history")
                }
            })
            .collect()
    }

    async fn rejoin(slack: &dyn SlackApi, channel: &str, policy: &RetryPolicy, log: &mut Vec<String>) -> bool {
        let label = format!("join {channel}");
        let joined = retry_with_backoff(policy, &label, log, || slack.join_channel(channel)).await;
        if !joined.succeeded() {
            return false;
        }
        match slack.channel_info(channel).await {
            Ok(info) if info.is_member => {
                log.push(format!("verify: bot is a member of {channel}"));
                true
            }
            Ok(_) => {
                log.push(format!("verify: bot still not a member of {channel}"));
                false
            }
            Err(e) => {
                log.push(format!("verify: channel lookup failed: {e}"));
                false
            }
        }
    }

    async fn resend(
        slack: &dyn SlackApi,
        channel: &str,
        message: &str,
        policy: &RetryPolicy,
        log: &mut Vec<String>,
    ) -> bool {
        let label = format!("post to {channel}");
        let mut posted = retry_with_backoff(policy, &label, log, || slack.post_message(channel, message)).await;

        // The bot may have been removed; join once and try again
        if matches!(&posted.result, Err(e) if e.is_api_code("not_in_channel")) {
            log.push(format!("bot not in {channel}, joining before resending"));
            if !Self::rejoin(slack, channel, policy, log).await {
                return false;
            }
            posted = retry_with_backoff(policy, &label, log, || slack.post_message(channel, message)).await;
        }

        let Ok(ts) = posted.result else {
            return false;
        };
        match slack.history(channel, defaults::SLACK_HISTORY_LIMIT).await {
            Ok(messages) if messages.iter().any(|m| m.ts == ts) => {
                log.push(format!("verify: message {ts} visible in {channel}"));
                true
            }
            Ok(_) => {
                log.push(format!("verify: message {ts} not found in recent history"));
                false
            }
            Err(e) => {
                log.push(format!("verify: reading history failed: {e}"));
                false
            }
        }
    }

    async fn apply(
        slack: &dyn SlackApi,
        input: &SlackRepairInput,
        message: &str,
        policy: &RetryPolicy,
        log: &mut Vec<String>,
    ) -> bool {
        let mut all_ok = true;
        for action in input.actions() {
            match action {
                SlackAction::Reconnect => {
                    let outcome = retry_with_backoff(policy, "auth.test", log, || slack.auth_test()).await;
                    match outcome.result {
                        Ok(identity) => log.push(format!("authenticated as {}", identity.user_id)),
                        Err(DependencyError::Unauthorized(reason)) => {
                            log.push(format!("token rejected ({reason}); a new token is required"));
                            return false;
                        }
                        Err(_) => {
                            log.push("slack unreachable, skipping remaining steps".to_string());
                            return false;
                        }
                    }
                }
                SlackAction::RejoinChannel => {
                    let Some(channel) = input.channel.as_deref() else {
                        return false;
                    };
                    all_ok &= Self::rejoin(slack, channel, policy, log).await;
                }
                SlackAction::ResendMessage => {
                    let Some(channel) = input.channel.as_deref() else {
                        return false;
                    };
                    all_ok &= Self::resend(slack, channel, message, policy, log).await;
                }
            }
        }
        all_ok
    }
}

#[async_trait]
impl Tool for SlackRepair {
    type Input = SlackRepairInput;
    type Output = RepairResult;

    fn id(&self) -> ToolId {
        ToolId::SlackRepair
    }

    fn description(&self) -> &'static str {
        "Re-authenticate the bot, rejoin a channel or resend a heartbeat, confirming each step"
    }

    async fn call(&self, input: SlackRepairInput, ctx: &ToolContext) -> Result<RepairResult, ToolError> {
        let message = input
            .message
            .clone()
            .unwrap_or_else(|| ctx.config().slack.heartbeat_message.clone());
        if input.dry_run {
            return Ok(RepairResult::planned(self.id().as_str(), Self::plan(&input, &message)));
        }

        let slack = ctx.slack()?;
        let policy = ctx.retry_policy(input.retry_attempts);
        let mut log = Vec::new();
        let repaired = Self::apply(slack, &input, &message, &policy, &mut log).await;
        info!(tool = %self.id(), repaired, "Slack repair finished");
        Ok(RepairResult::new(self.id().as_str(), false, repaired, log))
    }
}
