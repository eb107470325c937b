//! Turn storage

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use voice_journal_core::{
    ChatMessage, NewTurn, PersistenceError, Speaker, StreamSession, TurnId, TurnSink,
};

/// A recorded turn
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTurn {
    pub turn_id: TurnId,
    pub session_id: String,
    pub speaker: Speaker,
    pub text: String,
    pub start_time_seconds: f64,
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
}

/// Prompt history and speaking clock of a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionHistory {
    pub messages: Vec<ChatMessage>,
    pub elapsed_seconds: f64,
}

impl SessionHistory {
    pub fn into_session(
        self,
        session_id: impl Into<String>,
        personality: Option<String>,
        language: Option<String>,
    ) -> StreamSession {
        StreamSession::new(session_id)
            .with_history(self.messages, self.elapsed_seconds)
            .with_personality(personality)
            .with_language(language)
    }
}

/// Turn store with read access
#[async_trait]
pub trait TurnStore: TurnSink {
    async fn list_turns(&self, session_id: &str) -> Result<Vec<StoredTurn>, PersistenceError>;

    async fn history(&self, session_id: &str) -> Result<SessionHistory, PersistenceError> {
        let turns = self.list_turns(session_id).await?;
        let elapsed_seconds = turns
            .iter()
            .map(|t| t.start_time_seconds + t.duration_seconds)
            .fold(0.0, f64::max);
        let messages = turns
            .into_iter()
            .map(|t| ChatMessage::new(t.speaker.role(), t.text))
            .collect();
        Ok(SessionHistory {
            messages,
            elapsed_seconds,
        })
    }
}

/// Process-local store, keyed by session
#[derive(Default)]
pub struct InMemoryTurnStore {
    sessions: RwLock<HashMap<String, Vec<StoredTurn>>>,
}

impl InMemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    fn validate(turn: &NewTurn) -> Result<(), PersistenceError> {
        if turn.session_id.trim().is_empty() {
            return Err(PersistenceError::InvalidTurn("empty session id".into()));
        }
        if !turn.start_time_seconds.is_finite() || turn.start_time_seconds < 0.0 {
            return Err(PersistenceError::InvalidTurn(format!(
                "bad start time {}",
                turn.start_time_seconds
            )));
        }
        if !turn.duration_seconds.is_finite() || turn.duration_seconds < 0.0 {
            return Err(PersistenceError::InvalidTurn(format!(
                "bad duration {}",
                turn.duration_seconds
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TurnSink for InMemoryTurnStore {
    async fn record_turn(&self, turn: NewTurn) -> Result<TurnId, PersistenceError> {
        Self::validate(&turn)?;

        let turn_id = TurnId::generate();
        let stored = StoredTurn {
            turn_id: turn_id.clone(),
            session_id: turn.session_id.clone(),
            speaker: turn.speaker,
            text: turn.text,
            start_time_seconds: turn.start_time_seconds,
            duration_seconds: turn.duration_seconds,
            created_at: Utc::now(),
        };

        tracing::debug!(
            session_id = %turn.session_id,
            turn_id = %turn_id,
            speaker = turn.speaker.as_str(),
            "Turn recorded"
        );

        self.sessions
            .write()
            .entry(turn.session_id)
            .or_default()
            .push(stored);
        Ok(turn_id)
    }
}

#[async_trait]
impl TurnStore for InMemoryTurnStore {
    async fn list_turns(&self, session_id: &str) -> Result<Vec<StoredTurn>, PersistenceError> {
        Ok(self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}
