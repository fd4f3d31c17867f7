//! # Transcription Module
//!
//! The seam between the pipeline and whichever speech-to-text provider the
//! deployment talks to. The orchestrator only ever sees
//! [`TranscriptionClient`]; swapping providers is a configuration change.
//!
//! ## Providers:
//! - **openai**: OpenAI `/audio/transcriptions` (`whisper-1` by default)
//! - **azure**: Azure OpenAI Whisper deployments
//!
//! ## Contract:
//! - A call suspends the calling unit until it succeeds or fails
//! - Clients never retry internally
//! - An empty transcript is a success, not an error

pub mod azure;
pub mod openai;

pub use azure::AzureWhisperClient;
pub use openai::OpenAiWhisperClient;

use crate::config::ProviderConfig;
use crate::pipeline::media::EncodedChunk;
use async_trait::async_trait;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Failures of a single transcription call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("provider misconfigured: {0}")]
    Configuration(String),
}

/// Submit one encoded chunk, get its text back.
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Short provider name for logs and health output.
    fn name(&self) -> &str;

    async fn transcribe(&self, chunk: &EncodedChunk) -> Result<String, ProviderError>;
}

/// Which provider implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Azure,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "azure" => Ok(ProviderKind::Azure),
            other => Err(format!("unknown provider '{}' (expected openai or azure)", other)),
        }
    }
}

/// Build the configured provider client.
pub fn create_client(config: &ProviderConfig) -> Result<Arc<dyn TranscriptionClient>, ProviderError> {
    let kind: ProviderKind = config.kind.parse().map_err(ProviderError::Configuration)?;

    let api_key = config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ProviderError::Configuration("an API key is required".to_string()))?;

    match kind {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiWhisperClient::new(
            api_key,
            config.base_url.clone(),
            config.model.clone(),
            config.language.clone(),
        ))),
        ProviderKind::Azure => {
            let base_url = config.base_url.as_deref().ok_or_else(|| {
                ProviderError::Configuration("azure requires provider.base_url".to_string())
            })?;
            let deployment = config.azure_deployment.as_deref().ok_or_else(|| {
                ProviderError::Configuration("azure requires provider.azure_deployment".to_string())
            })?;
            Ok(Arc::new(AzureWhisperClient::new(
                base_url,
                deployment,
                &api_key,
                &config.azure_api_version,
            )))
        }
    }
}

/// JSON body both providers return for `response_format=json`.
#[derive(Debug, Deserialize)]
struct TranscriptionBody {
    #[serde(default)]
    text: Option<String>,
}

/// Pull the transcript out of a provider response body. A missing or null
/// `text` field counts as an empty transcript.
pub(crate) fn parse_transcription_body(body: &str) -> Result<String, ProviderError> {
    let parsed: TranscriptionBody = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
    Ok(parsed.text.unwrap_or_default().trim().to_string())
}

/// Turn a non-2xx response into [`ProviderError::Status`].
pub(crate) async fn status_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    ProviderError::Status { status, body }
}
