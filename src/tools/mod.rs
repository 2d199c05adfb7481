//! Tool layer: the tool contract, the registry, and every check and repair tool
//!
//! ## Contract
//!
//! A tool has a stable [`ToolId`], a description, a strongly typed input that
//! is deserialized from JSON, validated and described by a JSON schema, and an
//! async handler. Check tools produce a [`CheckResult`]; repair tools produce a
//! [`RepairResult`].
//!
//! All invocations go through [`ToolRegistry::safe_execute`], which never fails.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::{CheckResult, RepairResult, ToolError, ToolId};

pub mod checks;
pub mod classify;
mod context;
mod registry;
pub mod repairs;
pub mod retry;

pub use context::ToolContext;
pub use registry::{ToolDescriptor, ToolRegistry};

/// Input accepted by a tool.
pub trait ToolInput: DeserializeOwned + JsonSchema + Send + 'static {
    /// Semantic checks beyond what deserialization enforces; one message per issue.
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }
}

#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Input: ToolInput;
    type Output: Into<ToolOutput> + Send;

    fn id(&self) -> ToolId;

    fn description(&self) -> &'static str;

    async fn call(&self, input: Self::Input, ctx: &ToolContext) -> Result<Self::Output, ToolError>;
}

/// Type-erased output of any tool.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Check(CheckResult),
    Repair(RepairResult),
}

impl ToolOutput {
    pub fn into_check(self) -> Option<CheckResult> {
        match self {
            ToolOutput::Check(c) => Some(c),
            ToolOutput::Repair(_) => None,
        }
    }

    pub fn into_repair(self) -> Option<RepairResult> {
        match self {
            ToolOutput::Repair(r) => Some(r),
            ToolOutput::Check(_) => None,
        }
    }
}

impl From<CheckResult> for ToolOutput {
    fn from(result: CheckResult) -> Self {
        ToolOutput::Check(result)
    }
}

impl From<RepairResult> for ToolOutput {
    fn from(result: RepairResult) -> Self {
        ToolOutput::Repair(result)
    }
}

/// Registry holding every built-in tool, checks first, in [`ToolId::ALL`] order.
pub fn default_registry() -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    checks::register_all(&mut registry)?;
    repairs::register_all(&mut registry)?;
    Ok(registry)
}
