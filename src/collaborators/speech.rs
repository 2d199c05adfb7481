//! Speech-to-text provider collaborator

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::http::ensure_success;
use super::provider::{HttpModelProvider, ModelProvider, ProviderProbe};
use super::DependencyError;
use crate::config::SpeechSettings;

#[async_trait]
pub trait SpeechApi: ModelProvider {
    /// Submit `media_url` for transcription; returns the provider's job id.
    async fn submit_transcription(&self, media_url: &str) -> Result<String, DependencyError>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: Option<String>,
}

pub struct HttpSpeechProvider {
    inner: HttpModelProvider,
    transcripts_path: String,
}

impl HttpSpeechProvider {
    pub fn new(settings: &SpeechSettings, api_key: &str) -> Result<Self, DependencyError> {
        Ok(Self {
            inner: HttpModelProvider::new(
                "speech",
                &settings.base_url,
                &settings.models_path,
                settings.auth_scheme,
                api_key,
                settings.request_timeout_ms,
            )?,
            transcripts_path: settings.transcripts_path.clone(),
        })
    }
}

#[async_trait]
impl ModelProvider for HttpSpeechProvider {
    async fn probe(&self) -> Result<ProviderProbe, DependencyError> {
        self.inner.probe().await
    }
}

#[async_trait]
impl SpeechApi for HttpSpeechProvider {
    async fn submit_transcription(&self, media_url: &str) -> Result<String, DependencyError> {
        let response = self
            .inner
            .http()
            .post(self.inner.url(&self.transcripts_path))
            .json(&json!({ "audio_url": media_url }))
            .send()
            .await?;
        let body: SubmitResponse = ensure_success(response).await?.json().await?;
        body.id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DependencyError::InvalidResponse("transcript submission missing id".into()))
    }
}
