//! Collaborators and configuration handed to every tool invocation

use std::sync::Arc;

use crate::collaborators::{Database, ModelProvider, ObjectStore, SlackApi, SpeechApi};
use crate::config::OpsConfig;
use crate::tools::retry::RetryPolicy;
use crate::types::ToolError;

/// Everything a tool handler may touch.
///
/// Resolved once at startup and shared read-only across a run. A missing
/// collaborator means its credentials were not provided.
#[derive(Clone)]
pub struct ToolContext {
    config: Arc<OpsConfig>,
    database: Option<Arc<dyn Database>>,
    slack: Option<Arc<dyn SlackApi>>,
    speech: Option<Arc<dyn SpeechApi>>,
    llm: Option<Arc<dyn ModelProvider>>,
    storage: Option<Arc<dyn ObjectStore>>,
}

impl ToolContext {
    pub fn new(config: Arc<OpsConfig>) -> Self {
        Self {
            config,
            database: None,
            slack: None,
            speech: None,
            llm: None,
            storage: None,
        }
    }

    pub fn with_database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_slack(mut self, slack: Arc<dyn SlackApi>) -> Self {
        self.slack = Some(slack);
        self
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechApi>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn ModelProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn config(&self) -> &OpsConfig {
        &self.config
    }

    pub fn database(&self) -> Result<&dyn Database, ToolError> {
        self.database
            .as_deref()
            .ok_or(ToolError::MissingCredential("DATABASE_URL"))
    }

    pub fn slack(&self) -> Result<&dyn SlackApi, ToolError> {
        self.slack
            .as_deref()
            .ok_or(ToolError::MissingCredential("SLACK_BOT_TOKEN"))
    }

    pub fn speech(&self) -> Result<&dyn SpeechApi, ToolError> {
        self.speech
            .as_deref()
            .ok_or(ToolError::MissingCredential("SPEECH_API_KEY"))
    }

    pub fn llm(&self) -> Result<&dyn ModelProvider, ToolError> {
        self.llm
            .as_deref()
            .ok_or(ToolError::MissingCredential("LLM_API_KEY"))
    }

    pub fn storage(&self) -> Result<&dyn ObjectStore, ToolError> {
        self.storage
            .as_deref()
            .ok_or(ToolError::MissingCredential("STORAGE_SERVICE_KEY with storage.base_url"))
    }

    pub fn has_database(&self) -> bool {
        self.database.is_some()
    }

    pub fn has_slack(&self) -> bool {
        self.slack.is_some()
    }

    pub fn has_speech(&self) -> bool {
        self.speech.is_some()
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Backoff policy for a repair asking for `attempts` tries.
    pub fn retry_policy(&self, attempts: u32) -> RetryPolicy {
        RetryPolicy::from_settings(attempts, &self.config.retry)
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("database", &self.has_database())
            .field("slack", &self.has_slack())
            .field("speech", &self.has_speech())
            .field("llm", &self.has_llm())
            .field("storage", &self.has_storage())
            .finish_non_exhaustive()
    }
}
