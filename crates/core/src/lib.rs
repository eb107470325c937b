//! Core traits and types for the voice journal
//!
//! This crate provides foundational types used across all other crates:
//! - Conversation and session types
//! - Outbound wire events
//! - Error types
//! - Provider and persistence traits

pub mod conversation;
pub mod error;
pub mod events;
pub mod timing;
pub mod traits;

pub use conversation::{ChatMessage, Role, Speaker, StreamSession, TurnId};
pub use error::{Error, PersistenceError, ProviderError, Result};
pub use events::{AudioData, EventKind, OutboundEvent, SentenceJob};
pub use timing::{estimate_duration_seconds, DEFAULT_WORDS_PER_MINUTE};
pub use traits::{
    AudioChunk, AudioStream, GenerationEvent, GenerationRequest, GenerationStream, LanguageModel,
    NewTurn, SpeechSynthesizer, TurnSink,
};
