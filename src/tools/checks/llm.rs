//! Language-model provider checks

use async_trait::async_trait;
use std::time::Duration;

use super::{probe, provider_api_result, provider_quota_result, settle, CheckInput};
use crate::tools::{Tool, ToolContext};
use crate::types::{CheckResult, Dependency, ToolError, ToolId};

const DEP: Dependency = Dependency::Llm;

pub struct LlmApiCheck;

#[async_trait]
impl Tool for LlmApiCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::LlmApi
    }

    fn description(&self) -> &'static str {
        "List models to confirm the language-model provider accepts the key and responds in time"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let outcome = async {
            let llm = ctx.llm()?;
            let settings = &ctx.config().llm;
            let result = probe(DEP, input.timeout(settings.request_timeout_ms), llm.probe()).await?;
            Ok::<_, ToolError>(provider_api_result(
                self.id(),
                &result,
                Duration::from_millis(settings.slow_request_ms),
            ))
        }
        .await;
        Ok(settle(self.id(), outcome))
    }
}

pub struct LlmQuotaCheck;

#[async_trait]
impl Tool for LlmQuotaCheck {
    type Input = CheckInput;
    type Output = CheckResult;

    fn id(&self) -> ToolId {
        ToolId::LlmQuota
    }

    fn description(&self) -> &'static str {
        "Classify the remaining request and token budgets from the provider's rate-limit headers"
    }

    async fn call(&self, input: CheckInput, ctx: &ToolContext) -> Result<CheckResult, ToolError> {
        let outcome = async {
            let llm = ctx.llm()?;
            let settings = &ctx.config().llm;
            let result = probe(DEP, input.timeout(settings.request_timeout_ms), llm.probe()).await?;
            Ok::<_, ToolError>(provider_quota_result(self.id(), &result, settings.quota_warning_ratio))
        }
        .await;
        Ok(settle(self.id(), outcome))
    }
}
