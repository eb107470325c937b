//! Provider implementations
//!
//! - [`ScriptedModel`] / [`SilentSpeech`]: offline providers for development
//!   and tests
//! - [`OpenAiChatModel`] / [`OpenAiSpeech`]: OpenAI-compatible HTTP APIs,
//!   streamed with `reqwest`

pub mod openai;
pub mod scripted;
pub mod speech;
pub mod stream;

pub use openai::OpenAiChatModel;
pub use scripted::ScriptedModel;
pub use speech::{OpenAiSpeech, SilentSpeech};

use std::sync::Arc;
use std::time::Duration;

use voice_journal_config::{LlmConfig, LlmProviderKind, SpeechConfig, SpeechProviderKind};
use voice_journal_core::{LanguageModel, ProviderError, SpeechSynthesizer};

/// Build the configured language model
pub fn language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>, ProviderError> {
    let model: Arc<dyn LanguageModel> = match config.provider {
        LlmProviderKind::Scripted => Arc::new(ScriptedModel::echo(Duration::from_millis(
            config.scripted_token_delay_ms,
        ))),
        LlmProviderKind::Openai => Arc::new(OpenAiChatModel::new(
            &config.base_url,
            &config.model,
            config.api_key.clone(),
        )?),
    };
    tracing::info!(provider = model.name(), "Language model ready");
    Ok(model)
}

/// Build the configured speech synthesizer
pub fn speech_synthesizer(
    config: &SpeechConfig,
) -> Result<Arc<dyn SpeechSynthesizer>, ProviderError> {
    let speech: Arc<dyn SpeechSynthesizer> = match config.provider {
        SpeechProviderKind::Silent => Arc::new(SilentSpeech::new(config.sample_rate)),
        SpeechProviderKind::Openai => Arc::new(OpenAiSpeech::new(
            &config.base_url,
            &config.model,
            &config.voice,
            &config.response_format,
            config.api_key.clone(),
        )?),
    };
    tracing::info!(provider = speech.name(), "Speech synthesizer ready");
    Ok(speech)
}

pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ProviderError::Connection(e.to_string()))
}

pub(crate) fn request_error(error: reqwest::Error) -> ProviderError {
    if error.is_decode() || error.is_body() {
        ProviderError::Protocol(error.to_string())
    } else {
        ProviderError::Connection(error.to_string())
    }
}

/// Turn a non-success response into a status error
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        message,
    })
}
