//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Turn streaming configuration
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Language-model provider
    #[serde(default)]
    pub llm: LlmConfig,

    /// Speech-synthesis provider
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Turn persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "port must be non-zero"));
        }

        if self.server.turn_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "server.turn_timeout_seconds",
                "turn timeout must be at least one second",
            ));
        }

        if !(self.persistence.words_per_minute.is_finite() && self.persistence.words_per_minute > 0.0)
        {
            return Err(ConfigError::invalid(
                "persistence.words_per_minute",
                "speaking rate must be positive",
            ));
        }

        if self.llm.provider == LlmProviderKind::Openai && self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("llm.base_url", "required for the openai provider"));
        }

        if self.speech.provider == SpeechProviderKind::Openai
            && self.speech.base_url.trim().is_empty()
        {
            return Err(ConfigError::invalid(
                "speech.base_url",
                "required for the openai provider",
            ));
        }

        if self.llm.api_key.is_none() && self.llm.provider == LlmProviderKind::Openai {
            tracing::warn!("llm.api_key is not set; requests will be sent unauthenticated");
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS allowed origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Upper bound for one whole turn, in seconds
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_seconds: u64,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_turn_timeout() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            turn_timeout_seconds: default_turn_timeout(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Rate limiting configuration for inbound socket messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum messages per second per connection
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: u32,

    /// Burst allowance (multiple of rate limit)
    #[serde(default = "default_burst_multiplier")]
    pub burst_multiplier: f32,
}

fn default_messages_per_second() -> u32 {
    20
}

fn default_burst_multiplier() -> f32 {
    2.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            messages_per_second: default_messages_per_second(),
            burst_multiplier: default_burst_multiplier(),
        }
    }
}

/// Turn streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Concurrent synthesis tasks per turn (0 = unbounded)
    #[serde(default = "default_max_concurrent_synthesis")]
    pub max_concurrent_synthesis: usize,

    /// Upper bound for synthesizing one sentence, in milliseconds
    #[serde(default = "default_synthesis_timeout")]
    pub synthesis_timeout_ms: u64,

    /// SSE keep-alive comment interval
    #[serde(default = "default_keepalive")]
    pub keepalive_seconds: u64,

    /// Client-side duplicate-submission window
    #[serde(default = "default_dedup_window")]
    pub dedup_window_ms: u64,
}

fn default_max_concurrent_synthesis() -> usize {
    4
}
fn default_synthesis_timeout() -> u64 {
    15_000
}
fn default_keepalive() -> u64 {
    15
}
fn default_dedup_window() -> u64 {
    500
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_synthesis: default_max_concurrent_synthesis(),
            synthesis_timeout_ms: default_synthesis_timeout(),
            keepalive_seconds: default_keepalive(),
            dedup_window_ms: default_dedup_window(),
        }
    }
}

/// Language-model provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    /// Canned replies, no network
    Scripted,
    /// OpenAI-compatible `/v1/chat/completions`
    Openai,
}

/// Language-model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: LlmProviderKind,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Should be set via VOICE_JOURNAL__LLM__API_KEY
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Delay between scripted tokens, in milliseconds
    #[serde(default = "default_scripted_delay")]
    pub scripted_token_delay_ms: u64,
}

fn default_llm_provider() -> LlmProviderKind {
    LlmProviderKind::Scripted
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_system_prompt() -> String {
    "You are a warm, attentive journaling companion. Reply in short spoken sentences without markdown.".to_string()
}
fn default_scripted_delay() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_openai_base_url(),
            model: default_llm_model(),
            api_key: None,
            system_prompt: default_system_prompt(),
            scripted_token_delay_ms: default_scripted_delay(),
        }
    }
}

/// Speech provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProviderKind {
    /// PCM silence sized by text length, no network
    Silent,
    /// OpenAI-compatible `/v1/audio/speech`
    Openai,
}

/// Speech-synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_provider")]
    pub provider: SpeechProviderKind,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_speech_model")]
    pub model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    /// Should be set via VOICE_JOURNAL__SPEECH__API_KEY
    #[serde(default)]
    pub api_key: Option<String>,

    /// Requested output format (`mp3`, `wav`, `pcm`, ...)
    #[serde(default = "default_response_format")]
    pub response_format: String,

    /// Sample rate of generated silence
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_speech_provider() -> SpeechProviderKind {
    SpeechProviderKind::Silent
}
fn default_speech_model() -> String {
    "tts-1".to_string()
}
fn default_voice() -> String {
    "alloy".to_string()
}
fn default_response_format() -> String {
    "mp3".to_string()
}
fn default_sample_rate() -> u32 {
    16000
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: default_speech_provider(),
            base_url: default_openai_base_url(),
            model: default_speech_model(),
            voice: default_voice(),
            api_key: None,
            response_format: default_response_format(),
            sample_rate: default_sample_rate(),
        }
    }
}

/// Turn persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Speaking rate used to estimate turn durations
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: f64,
}

fn default_words_per_minute() -> f64 {
    150.0
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            words_per_minute: default_words_per_minute(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Expose Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (VOICE_JOURNAL__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_JOURNAL")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
