//! Conversation types
//!
//! Chat history, speakers and the per-connection stream session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a message in the model prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One prompt message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Who spoke a persisted turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Ai,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Ai => "ai",
        }
    }

    /// Prompt role for this speaker's turns
    pub fn role(&self) -> Role {
        match self {
            Speaker::User => Role::User,
            Speaker::Ai => Role::Assistant,
        }
    }
}

/// Identifier returned by the persistence sink
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub String);

impl TurnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transient state for one live connection.
///
/// Owned by the connection handler; nothing outside the handler observes it.
/// `personality` and `language` are passed to the model provider untouched.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub session_id: String,
    pub history: Vec<ChatMessage>,
    pub personality: Option<String>,
    pub language: Option<String>,
    /// Speaking clock: seconds of conversation recorded so far
    elapsed_seconds: f64,
}

impl StreamSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            history: Vec::new(),
            personality: None,
            language: None,
            elapsed_seconds: 0.0,
        }
    }

    /// Seed history and clock from previously recorded turns
    pub fn with_history(mut self, history: Vec<ChatMessage>, elapsed_seconds: f64) -> Self {
        self.history = history;
        self.elapsed_seconds = elapsed_seconds.max(0.0);
        self
    }

    pub fn with_personality(mut self, personality: Option<String>) -> Self {
        self.personality = personality;
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    /// Start time for the next recorded turn
    pub fn clock(&self) -> f64 {
        self.elapsed_seconds
    }

    /// Advance the speaking clock past a recorded turn
    pub fn advance_clock(&mut self, duration_seconds: f64) {
        if duration_seconds.is_finite() && duration_seconds > 0.0 {
            self.elapsed_seconds += duration_seconds;
        }
    }

    /// Append a completed user/AI exchange to the history
    pub fn push_exchange(&mut self, user_text: impl Into<String>, ai_text: impl Into<String>) {
        self.history.push(ChatMessage::user(user_text));
        self.history.push(ChatMessage::assistant(ai_text));
    }
}
