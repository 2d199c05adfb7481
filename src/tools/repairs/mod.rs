//! Repair tools: corrective actions per dependency class
//!
//! Every repair accepts `dryRun` (default `true`) and `retryAttempts`
//! (1..=5, default 3). A dry run only describes its steps and never touches a
//! collaborator. A live run retries each step with exponential backoff and
//! reports `repaired` only after re-checking the dependency.

use crate::config::defaults;
use crate::tools::ToolRegistry;
use crate::types::ToolError;

mod database;
mod llm;
mod slack;
mod speech;
mod storage;

pub use database::{DatabaseAction, DatabaseRepair, DatabaseRepairInput};
pub use llm::{LlmRepair, LlmRepairInput};
pub use slack::{SlackAction, SlackRepair, SlackRepairInput};
pub use speech::{SpeechRepair, SpeechRepairInput};
pub use storage::{StorageRepair, StorageRepairInput};

/// Register all 5 repair tools in canonical order.
pub fn register_all(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    registry.register(DatabaseRepair)?;
    registry.register(SlackRepair)?;
    registry.register(SpeechRepair)?;
    registry.register(LlmRepair)?;
    registry.register(StorageRepair)?;
    Ok(())
}

pub(crate) fn default_dry_run() -> bool {
    true
}

pub(crate) fn default_retry_attempts() -> u32 {
    defaults::RETRY_ATTEMPTS
}

pub(crate) fn check_retry_attempts(attempts: u32, issues: &mut Vec<String>) {
    if !(defaults::MIN_RETRY_ATTEMPTS..=defaults::MAX_RETRY_ATTEMPTS).contains(&attempts) {
        issues.push(format!(
            "retryAttempts = {attempts} must be within {}..={}",
            defaults::MIN_RETRY_ATTEMPTS,
            defaults::MAX_RETRY_ATTEMPTS
        ));
    }
}
