//! Turn Runner
//!
//! Orchestrates one conversational turn over one transport:
//!
//! 1. record the user turn and send `started`
//! 2. stream the model, forwarding tokens and fanning out synthesis per sentence
//! 3. join all synthesis, record the AI turn, send `done`
//! 4. close the transport
//!
//! A model failure sends one `error`, closes the transport and records
//! nothing further. Synthesis tasks already running are left to finish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use voice_journal_core::{
    estimate_duration_seconds, ChatMessage, GenerationRequest, LanguageModel, NewTurn,
    OutboundEvent, ProviderError, SentenceJob, Speaker, SpeechSynthesizer, StreamSession,
    TurnId, TurnSink, DEFAULT_WORDS_PER_MINUTE,
};
use voice_journal_transport::EventSender;

use crate::consumer::{ConsumerOutcome, TokenStreamConsumer, TurnHandler};
use crate::finalizer::{TurnFinalizer, TurnRecord};
use crate::synthesis::{SynthesisConfig, SynthesisDispatcher};

/// Turn configuration
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub synthesis: SynthesisConfig,
    /// Upper bound for the whole turn, from request to `done`
    pub turn_timeout: Option<Duration>,
    /// Speaking rate for recorded turn durations
    pub words_per_minute: f64,
    /// Prepended to every prompt
    pub system_prompt: Option<String>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            synthesis: SynthesisConfig::default(),
            turn_timeout: Some(Duration::from_secs(60)),
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            system_prompt: None,
        }
    }
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    ModelFailed,
    PersistenceFailed,
    TimedOut,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Completed => "completed",
            TurnOutcome::ModelFailed => "model_failed",
            TurnOutcome::PersistenceFailed => "persistence_failed",
            TurnOutcome::TimedOut => "timed_out",
        }
    }
}

/// Summary of a finished turn, for logging and metrics
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub user_turn_id: Option<TurnId>,
    pub ai_turn_id: Option<TurnId>,
    pub full_text: String,
    pub total_sentences: usize,
    pub failed_sentences: Vec<usize>,
    pub time_to_first_token: Option<Duration>,
    pub time_to_first_audio: Option<Duration>,
    pub latency: Duration,
    pub error: Option<String>,
}

impl TurnReport {
    fn failed(outcome: TurnOutcome, message: String, started: Instant) -> Self {
        Self {
            outcome,
            user_turn_id: None,
            ai_turn_id: None,
            full_text: String::new(),
            total_sentences: 0,
            failed_sentences: Vec::new(),
            time_to_first_token: None,
            time_to_first_audio: None,
            latency: started.elapsed(),
            error: Some(message),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == TurnOutcome::Completed
    }
}

/// Consumer callbacks for a live turn
struct TurnDriver {
    transport: Arc<dyn EventSender>,
    dispatcher: SynthesisDispatcher,
    finalizer: TurnFinalizer,
    started: Instant,
    first_token: Option<Duration>,
}

impl TurnHandler for TurnDriver {
    fn on_text_token(&mut self, token: &str) {
        let started = self.started;
        self.first_token.get_or_insert_with(|| started.elapsed());
        self.transport.send(OutboundEvent::text(token));
    }

    fn on_sentence_ready(&mut self, job: SentenceJob) {
        tracing::debug!(sentence_index = job.index(), text = job.text(), "Sentence ready");
        let index = job.index();
        let handle = self.dispatcher.dispatch(job);
        self.finalizer.track(index, handle);
    }

    fn on_done(&mut self, full_text: &str, sentence_count: usize) {
        tracing::debug!(
            chars = full_text.len(),
            sentence_count,
            outstanding = self.finalizer.outstanding(),
            "Model stream complete"
        );
    }

    fn on_fatal_error(&mut self, error: &ProviderError) {
        self.transport.send(OutboundEvent::error(error.to_string()));
    }
}

struct DrivenTurn {
    full_text: String,
    total_sentences: usize,
    ai_turn_id: TurnId,
    ai_duration_seconds: f64,
    failed_sentences: Vec<usize>,
    first_token: Option<Duration>,
    first_audio_at: Option<Instant>,
}

struct TurnFailure {
    outcome: TurnOutcome,
    message: String,
    /// Error event already sent to the client
    reported: bool,
}

/// Runs turns against one model, one speech provider and one sink
pub struct TurnRunner {
    model: Arc<dyn LanguageModel>,
    speech: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn TurnSink>,
    config: TurnConfig,
}

impl TurnRunner {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        speech: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn TurnSink>,
        config: TurnConfig,
    ) -> Self {
        Self {
            model,
            speech,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Run one turn to completion and close `transport`.
    ///
    /// `session` history and clock are only updated for a completed turn,
    /// apart from the clock advancing past the recorded user turn.
    pub async fn run(
        &self,
        session: &mut StreamSession,
        user_text: &str,
        transport: Arc<dyn EventSender>,
    ) -> TurnReport {
        let started = Instant::now();
        let user_text = user_text.trim();

        let user_duration = estimate_duration_seconds(user_text, self.config.words_per_minute);
        let user_turn = NewTurn {
            session_id: session.session_id.clone(),
            speaker: Speaker::User,
            text: user_text.to_string(),
            start_time_seconds: session.clock(),
            duration_seconds: user_duration,
        };
        let user_turn_id = match self.sink.record_turn(user_turn).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(session_id = %session.session_id, error = %e, "Failed to record user turn");
                let message = e.to_string();
                transport.send(OutboundEvent::error(message.clone()));
                transport.close();
                return TurnReport::failed(TurnOutcome::PersistenceFailed, message, started);
            }
        };
        session.advance_clock(user_duration);
        transport.send(OutboundEvent::Started {
            user_turn_id: user_turn_id.clone(),
        });

        let request = self.build_request(session, user_text);
        let driven = match self.config.turn_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.drive(session, request, &transport, started))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(TurnFailure {
                        outcome: TurnOutcome::TimedOut,
                        message: format!("turn timed out after {}s", limit.as_secs()),
                        reported: false,
                    }),
                }
            }
            None => self.drive(session, request, &transport, started).await,
        };

        let driven = match driven {
            Ok(driven) => driven,
            Err(failure) => {
                if !failure.reported {
                    transport.send(OutboundEvent::error(failure.message.clone()));
                }
                transport.close();
                tracing::warn!(
                    session_id = %session.session_id,
                    outcome = failure.outcome.as_str(),
                    error = %failure.message,
                    "Turn failed"
                );
                let mut report = TurnReport::failed(failure.outcome, failure.message, started);
                report.user_turn_id = Some(user_turn_id);
                return report;
            }
        };

        let latency = started.elapsed();
        transport.send(OutboundEvent::Done {
            full_text: driven.full_text.clone(),
            total_sentences: driven.total_sentences,
            ai_turn_id: driven.ai_turn_id.clone(),
            latency_ms: latency.as_millis() as u64,
        });
        transport.close();

        session.push_exchange(user_text, driven.full_text.clone());
        session.advance_clock(driven.ai_duration_seconds);

        tracing::info!(
            session_id = %session.session_id,
            sentences = driven.total_sentences,
            failed_sentences = driven.failed_sentences.len(),
            latency_ms = latency.as_millis() as u64,
            "Turn completed"
        );

        TurnReport {
            outcome: TurnOutcome::Completed,
            user_turn_id: Some(user_turn_id),
            ai_turn_id: Some(driven.ai_turn_id),
            full_text: driven.full_text,
            total_sentences: driven.total_sentences,
            failed_sentences: driven.failed_sentences,
            time_to_first_token: driven.first_token,
            time_to_first_audio: driven
                .first_audio_at
                .map(|at| at.saturating_duration_since(started)),
            latency,
            error: None,
        }
    }

    async fn drive(
        &self,
        session: &StreamSession,
        request: GenerationRequest,
        transport: &Arc<dyn EventSender>,
        started: Instant,
    ) -> Result<DrivenTurn, TurnFailure> {
        let mut driver = TurnDriver {
            transport: Arc::clone(transport),
            dispatcher: SynthesisDispatcher::from_config(
                Arc::clone(&self.speech),
                Arc::clone(transport),
                &self.config.synthesis,
            ),
            finalizer: TurnFinalizer::new(),
            started,
            first_token: None,
        };

        let (full_text, sentence_count) = match TokenStreamConsumer::new()
            .run(self.model.as_ref(), request, &mut driver)
            .await
        {
            ConsumerOutcome::Completed {
                full_text,
                sentence_count,
            } => (full_text, sentence_count),
            ConsumerOutcome::Failed(e) => {
                driver.finalizer.detach();
                return Err(TurnFailure {
                    outcome: TurnOutcome::ModelFailed,
                    message: e.to_string(),
                    reported: true,
                });
            }
        };

        let finalized = driver
            .finalizer
            .finalize(
                &full_text,
                sentence_count,
                transport.as_ref(),
                self.sink.as_ref(),
                TurnRecord {
                    session_id: &session.session_id,
                    start_time_seconds: session.clock(),
                    words_per_minute: self.config.words_per_minute,
                },
            )
            .await
            .map_err(|e| TurnFailure {
                outcome: TurnOutcome::PersistenceFailed,
                message: e.to_string(),
                reported: false,
            })?;

        Ok(DrivenTurn {
            full_text,
            total_sentences: sentence_count,
            ai_turn_id: finalized.ai_turn_id,
            ai_duration_seconds: finalized.duration_seconds,
            failed_sentences: finalized.failed,
            first_token: driver.first_token,
            first_audio_at: finalized.first_audio_at,
        })
    }

    fn build_request(&self, session: &StreamSession, user_text: &str) -> GenerationRequest {
        let mut messages = Vec::with_capacity(session.history.len() + 2);
        if let Some(prompt) = self.config.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend(session.history.iter().cloned());
        messages.push(ChatMessage::user(user_text));

        GenerationRequest {
            messages,
            personality: session.personality.clone(),
            language: session.language.clone(),
        }
    }
}
