//! Tool registry and the failure boundary around every invocation

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Tool, ToolContext, ToolInput, ToolOutput};
use crate::types::{ExecutionResult, ToolError, ToolId, ToolKind};

type PreparedCall = BoxFuture<'static, Result<ToolOutput, ToolError>>;

/// Object-safe view of a [`Tool`] with JSON in and [`ToolOutput`] out.
trait ErasedTool: Send + Sync {
    fn id(&self) -> ToolId;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;

    /// Deserialize and validate `input`, returning the handler future.
    fn prepare(&self, input: Value, ctx: Arc<ToolContext>) -> Result<PreparedCall, ToolError>;
}

struct Erased<T>(Arc<T>);

impl<T: Tool> ErasedTool for Erased<T> {
    fn id(&self) -> ToolId {
        self.0.id()
    }

    fn description(&self) -> &'static str {
        self.0.description()
    }

    fn input_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(T::Input)).unwrap_or(Value::Null)
    }

    fn prepare(&self, input: Value, ctx: Arc<ToolContext>) -> Result<PreparedCall, ToolError> {
        let tool_name = self.0.id().as_str().to_string();
        let parsed: T::Input = serde_json::from_value(input).map_err(|e| ToolError::Validation {
            tool: tool_name.clone(),
            issues: vec![e.to_string()],
        })?;
        let issues = ToolInput::validate(&parsed);
        if !issues.is_empty() {
            return Err(ToolError::Validation {
                tool: tool_name,
                issues,
            });
        }
        let tool = Arc::clone(&self.0);
        Ok(async move { tool.call(parsed, &ctx).await.map(Into::into) }.boxed())
    }
}

/// Public description of a registered tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub id: ToolId,
    pub kind: ToolKind,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Tools keyed by name, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn ErasedTool>>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; a second tool with the same name is rejected.
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<(), ToolError> {
        let id = tool.id();
        if self.index.contains_key(id.as_str()) {
            return Err(ToolError::DuplicateTool(id.as_str().to_string()));
        }
        self.index.insert(id.as_str(), self.tools.len());
        self.tools.push(Box::new(Erased(Arc::new(tool))));
        debug!(tool = %id, "Registered tool");
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool ids of `kind`, in registration order.
    pub fn tool_ids(&self, kind: ToolKind) -> Vec<ToolId> {
        self.tools
            .iter()
            .map(|t| t.id())
            .filter(|id| id.kind() == kind)
            .collect()
    }

    /// Check tools in registration order; the orchestrator runs exactly these.
    pub fn check_tools(&self) -> Vec<ToolId> {
        self.tool_ids(ToolKind::Check)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                id: t.id(),
                kind: t.id().kind(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Invoke `name` with `input`. Never fails and never panics outward:
    /// unknown tools, invalid input, handler errors and handler panics all
    /// come back as `success: false`.
    ///
    /// Execution time covers the handler only, from just before it starts
    /// until it settles.
    pub async fn safe_execute(
        &self,
        name: &str,
        input: Value,
        ctx: &Arc<ToolContext>,
    ) -> ExecutionResult<ToolOutput> {
        let Some(tool) = self.index.get(name).and_then(|&i| self.tools.get(i)) else {
            warn!(tool = name, "Unknown tool requested");
            return ExecutionResult::failed(ToolError::ToolNotFound(name.to_string()), 0);
        };

        let prepared = std::panic::catch_unwind(AssertUnwindSafe(|| {
            tool.prepare(input, Arc::clone(ctx))
        }));
        let call = match prepared {
            Ok(Ok(call)) => call,
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, "Tool input rejected");
                return ExecutionResult::failed(e, 0);
            }
            Err(panic) => {
                let e = ToolError::Panicked(panic_message(panic.as_ref()));
                warn!(tool = name, error = %e, "Tool panicked during input validation");
                return ExecutionResult::failed(e, 0);
            }
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(call).catch_unwind().await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(Ok(output)) => {
                debug!(tool = name, elapsed_ms, "Tool completed");
                ExecutionResult::ok(output, elapsed_ms)
            }
            Ok(Err(e)) => {
                info!(tool = name, elapsed_ms, error = %e, "Tool failed");
                ExecutionResult::failed(e, elapsed_ms)
            }
            Err(panic) => {
                let e = ToolError::Panicked(panic_message(panic.as_ref()));
                warn!(tool = name, elapsed_ms, error = %e, "Tool panicked");
                ExecutionResult::failed(e, elapsed_ms)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
