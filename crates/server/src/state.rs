//! Application State
//!
//! Shared, read-only state across handlers. Per-connection conversation
//! state lives in the connection handlers, not here.

use std::sync::Arc;
use std::time::Duration;

use voice_journal_config::Settings;
use voice_journal_core::{LanguageModel, SpeechSynthesizer};
use voice_journal_persistence::{InMemoryTurnStore, TurnStore};
use voice_journal_pipeline::{SynthesisConfig, TurnConfig, TurnRunner};

use crate::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub runner: Arc<TurnRunner>,
    pub store: Arc<dyn TurnStore>,
}

impl AppState {
    pub fn new<S: TurnStore + 'static>(
        config: Settings,
        model: Arc<dyn LanguageModel>,
        speech: Arc<dyn SpeechSynthesizer>,
        store: Arc<S>,
    ) -> Self {
        let runner = TurnRunner::new(model, speech, store.clone(), turn_config(&config));
        Self {
            config: Arc::new(config),
            runner: Arc::new(runner),
            store,
        }
    }

    /// Build providers and an in-memory store from settings
    pub fn from_settings(config: Settings) -> Result<Self, ServerError> {
        let model = voice_journal_llm::language_model(&config.llm)?;
        let speech = voice_journal_llm::speech_synthesizer(&config.speech)?;
        Ok(Self::new(config, model, speech, Arc::new(InMemoryTurnStore::new())))
    }
}

pub fn turn_config(settings: &Settings) -> TurnConfig {
    let streaming = &settings.streaming;
    TurnConfig {
        synthesis: SynthesisConfig {
            max_concurrent: streaming.max_concurrent_synthesis,
            sentence_timeout: (streaming.synthesis_timeout_ms > 0)
                .then(|| Duration::from_millis(streaming.synthesis_timeout_ms)),
        },
        turn_timeout: (settings.server.turn_timeout_seconds > 0)
            .then(|| Duration::from_secs(settings.server.turn_timeout_seconds)),
        words_per_minute: settings.persistence.words_per_minute,
        system_prompt: Some(settings.llm.system_prompt.clone()).filter(|p| !p.trim().is_empty()),
    }
}
