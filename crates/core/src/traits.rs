//! Provider and persistence traits
//!
//! The pipeline consumes these; it never implements them.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::conversation::{ChatMessage, Speaker, TurnId};
use crate::error::{PersistenceError, ProviderError};
use crate::events::AudioData;

/// Request handed to a language-model provider
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    /// Opaque, passed through to the provider
    pub personality: Option<String>,
    /// Opaque, passed through to the provider
    pub language: Option<String>,
}

/// Event produced by a streaming model call
///
/// A well-behaved provider yields any number of `Token`s followed by exactly
/// one `Complete` or `Error`, and nothing after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// New token generated
    Token(String),
    /// Generation complete, with the provider's view of the full text
    Complete(String),
    /// Generation failed
    Error(ProviderError),
}

/// Token stream type
pub type GenerationStream = Pin<Box<dyn Stream<Item = GenerationEvent> + Send>>;

/// One audio sub-chunk for one sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub data: AudioData,
    pub content_type: String,
}

impl AudioChunk {
    pub fn new(data: AudioData, content_type: impl Into<String>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
        }
    }
}

/// Audio stream for one sentence; may fail at any point in iteration
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<AudioChunk, ProviderError>> + Send>>;

/// Language-model streaming provider
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start a streaming generation
    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream, ProviderError>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// Speech-synthesis streaming provider
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one sentence; iteration is per sentence, never shared
    async fn synthesize(&self, text: &str) -> Result<AudioStream, ProviderError>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// A turn to persist
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub session_id: String,
    pub speaker: Speaker,
    pub text: String,
    pub start_time_seconds: f64,
    pub duration_seconds: f64,
}

/// Turn-persistence sink
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn record_turn(&self, turn: NewTurn) -> Result<TurnId, PersistenceError>;
}
