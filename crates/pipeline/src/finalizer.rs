//! Turn Finalizer
//!
//! Owns the outstanding synthesis tasks of one turn. `done` may only be sent
//! after [`TurnFinalizer::finalize`] has joined every one of them.

use std::time::Instant;

use tokio::task::JoinHandle;

use voice_journal_core::{
    estimate_duration_seconds, NewTurn, OutboundEvent, PersistenceError, Speaker, TurnId,
    TurnSink,
};
use voice_journal_transport::EventSender;

use crate::synthesis::SentenceOutcome;

/// Settled synthesis plus the persisted AI turn
#[derive(Debug, Clone)]
pub struct FinalizedTurn {
    pub ai_turn_id: TurnId,
    pub duration_seconds: f64,
    pub synthesized: usize,
    pub failed: Vec<usize>,
    pub first_audio_at: Option<Instant>,
}

/// Where and when the AI turn is recorded
#[derive(Debug, Clone)]
pub struct TurnRecord<'a> {
    pub session_id: &'a str,
    pub start_time_seconds: f64,
    pub words_per_minute: f64,
}

#[derive(Default)]
pub struct TurnFinalizer {
    tasks: Vec<(usize, JoinHandle<SentenceOutcome>)>,
}

impl TurnFinalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, index: usize, handle: JoinHandle<SentenceOutcome>) {
        self.tasks.push((index, handle));
    }

    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Join all synthesis tasks, then persist the AI turn
    pub async fn finalize(
        self,
        full_text: &str,
        sentence_count: usize,
        transport: &dyn EventSender,
        sink: &dyn TurnSink,
        record: TurnRecord<'_>,
    ) -> Result<FinalizedTurn, PersistenceError> {
        let mut synthesized = 0;
        let mut failed = Vec::new();
        let mut first_audio_at: Option<Instant> = None;

        for (index, handle) in self.tasks {
            match handle.await {
                Ok(outcome) => {
                    if let Some(at) = outcome.first_audio_at {
                        first_audio_at = Some(first_audio_at.map_or(at, |t| t.min(at)));
                    }
                    if outcome.is_success() {
                        synthesized += 1;
                    } else {
                        failed.push(index);
                    }
                }
                Err(e) => {
                    tracing::warn!(sentence_index = index, error = %e, "Synthesis task aborted");
                    transport.send(OutboundEvent::sentence_error(
                        index,
                        format!("synthesis task aborted: {e}"),
                    ));
                    failed.push(index);
                }
            }
        }

        tracing::debug!(
            sentence_count,
            synthesized,
            failed = failed.len(),
            "All synthesis settled"
        );

        let duration_seconds = estimate_duration_seconds(full_text, record.words_per_minute);
        let ai_turn_id = sink
            .record_turn(NewTurn {
                session_id: record.session_id.to_string(),
                speaker: Speaker::Ai,
                text: full_text.to_string(),
                start_time_seconds: record.start_time_seconds,
                duration_seconds,
            })
            .await?;

        Ok(FinalizedTurn {
            ai_turn_id,
            duration_seconds,
            synthesized,
            failed,
            first_audio_at,
        })
    }

    /// Give up on the turn; running tasks keep going on their own
    pub fn detach(self) {
        if !self.tasks.is_empty() {
            tracing::debug!(outstanding = self.tasks.len(), "Detaching synthesis tasks");
        }
    }
}
