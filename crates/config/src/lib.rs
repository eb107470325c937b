//! Configuration management for the voice journal
//!
//! Supports loading configuration from:
//! - YAML/TOML files under `config/`
//! - Environment variables (VOICE_JOURNAL__ prefix)

pub mod settings;

pub use settings::{
    load_settings, LlmConfig, LlmProviderKind, ObservabilityConfig, PersistenceConfig,
    RateLimitConfig, ServerConfig, Settings, SpeechConfig, SpeechProviderKind, StreamingConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
