//! Client Stream Reader
//!
//! State machine per turn request:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Completed | Cancelled | Failed
//! ```
//!
//! Every request gets a new generation. Events are only delivered while
//! their generation is current; `audio` is checked again immediately before
//! it reaches the observer, so nothing from a cancelled turn is played.
//! Delivery and cancellation share one lock: once [`StreamReader::cancel`]
//! returns, no observer call for the old generation is running or pending.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::task::JoinHandle;

use voice_journal_config::Settings;
use voice_journal_core::{AudioData, OutboundEvent, TurnId};

use crate::sse::{SseDecoder, SseMessage};
use crate::{ClientError, TurnTransport};

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Identical requests within this window are dropped while in flight
    pub dedup_window: Duration,
    /// Upper bound for waiting on `done`
    pub done_timeout: Option<Duration>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_millis(500),
            done_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Slack on top of the server's turn timeout, so its `error` arrives first
const DONE_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

impl From<&Settings> for ReaderConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            dedup_window: Duration::from_millis(settings.streaming.dedup_window_ms),
            done_timeout: Some(
                Duration::from_secs(settings.server.turn_timeout_seconds) + DONE_TIMEOUT_GRACE,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl ReaderState {
    pub fn is_active(&self) -> bool {
        matches!(self, ReaderState::Sending | ReaderState::Streaming)
    }
}

/// Audio for one sentence, ready for playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub sentence_index: usize,
    pub data: AudioData,
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoneSummary {
    pub full_text: String,
    pub total_sentences: usize,
    pub ai_turn_id: TurnId,
    pub latency_ms: u64,
}

/// Receives the current turn's events. Called from the reader task.
///
/// Callbacks may call [`StreamReader::cancel`] or
/// [`StreamReader::send_message`] on the same thread.
pub trait StreamObserver: Send + Sync {
    fn on_state(&self, _state: ReaderState) {}

    fn on_started(&self, _user_turn_id: &TurnId) {}

    fn on_text(&self, _token: &str, _accumulated: &str) {}

    fn on_audio(&self, _audio: AudioSegment) {}

    fn on_done(&self, _summary: &DoneSummary) {}

    /// Turn-level when `sentence_index` is `None`
    fn on_error(&self, _message: &str, _sentence_index: Option<usize>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { generation: u64 },
    Deduplicated,
}

struct Shared {
    generation: AtomicU64,
    /// Held across "is this generation current" and the observer call
    delivery: ReentrantMutex<()>,
    state: Mutex<ReaderState>,
    observer: Arc<dyn StreamObserver>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Move to `next` if `generation` is still current
    fn transition(&self, generation: u64, next: ReaderState) -> bool {
        {
            let mut state = self.state.lock();
            if !self.is_current(generation) {
                return false;
            }
            *state = next;
        }
        self.notify_state(next);
        true
    }

    fn notify_state(&self, state: ReaderState) {
        tracing::debug!(?state, "Reader state changed");
        self.observer.on_state(state);
    }
}

struct InFlight {
    session_id: String,
    text: String,
    sent_at: Instant,
    task: JoinHandle<()>,
}

pub struct StreamReader {
    transport: Arc<dyn TurnTransport>,
    config: ReaderConfig,
    shared: Arc<Shared>,
    in_flight: Mutex<Option<InFlight>>,
}

impl StreamReader {
    pub fn new(
        transport: Arc<dyn TurnTransport>,
        observer: Arc<dyn StreamObserver>,
        config: ReaderConfig,
    ) -> Self {
        Self {
            transport,
            config,
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                delivery: ReentrantMutex::new(()),
                state: Mutex::new(ReaderState::Idle),
                observer,
            }),
            in_flight: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ReaderState {
        *self.shared.state.lock()
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Start a turn, superseding any turn in flight.
    ///
    /// Must be called within a Tokio runtime.
    pub fn send_message(&self, session_id: &str, text: &str) -> SendOutcome {
        let _delivery = self.shared.delivery.lock();
        let mut in_flight = self.in_flight.lock();

        if let Some(current) = in_flight.as_ref() {
            if current.session_id == session_id
                && current.text == text
                && current.sent_at.elapsed() < self.config.dedup_window
                && !current.task.is_finished()
            {
                tracing::debug!(session_id, "Dropping duplicate send");
                return SendOutcome::Deduplicated;
            }
        }

        let generation = self.invalidate(&mut in_flight);
        self.shared.transition(generation, ReaderState::Sending);

        let context = TurnContext {
            shared: Arc::clone(&self.shared),
            generation,
        };
        let task = tokio::spawn(read_turn(
            context,
            Arc::clone(&self.transport),
            self.config.done_timeout,
            session_id.to_string(),
            text.to_string(),
        ));

        *in_flight = Some(InFlight {
            session_id: session_id.to_string(),
            text: text.to_string(),
            sent_at: Instant::now(),
            task,
        });

        SendOutcome::Sent { generation }
    }

    /// Abandon the current turn immediately; late audio is discarded.
    pub fn cancel(&self) {
        let _delivery = self.shared.delivery.lock();
        let mut in_flight = self.in_flight.lock();
        self.invalidate(&mut in_flight);
    }

    /// Retire the current generation and return its successor.
    /// Caller holds the delivery lock.
    fn invalidate(&self, in_flight: &mut Option<InFlight>) -> u64 {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(previous) = in_flight.take() {
            previous.task.abort();
        }

        let cancelled = {
            let mut state = self.shared.state.lock();
            if state.is_active() {
                *state = ReaderState::Cancelled;
                true
            } else {
                false
            }
        };
        if cancelled {
            tracing::debug!("Turn cancelled");
            self.shared.notify_state(ReaderState::Cancelled);
        }
        generation
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.get_mut().take() {
            in_flight.task.abort();
        }
    }
}

/// Delivery side of one request's generation
struct TurnContext {
    shared: Arc<Shared>,
    generation: u64,
}

impl TurnContext {
    fn is_current(&self) -> bool {
        self.shared.is_current(self.generation)
    }

    /// Deliver one decoded message; returns `true` once the turn is over
    fn dispatch(&self, message: &SseMessage, accumulated: &mut String) -> bool {
        let event = match OutboundEvent::from_parts(&message.event, &message.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(event = %message.event, error = %e, "Skipping unparseable event");
                return false;
            }
        };

        // Barge-in guard: nothing from a superseded generation reaches the observer.
        let _delivery = self.shared.delivery.lock();
        if !self.is_current() {
            tracing::debug!(event = %message.event, "Discarding event from superseded turn");
            return false;
        }
        let observer = &self.shared.observer;

        match event {
            OutboundEvent::Started { user_turn_id } => observer.on_started(&user_turn_id),
            OutboundEvent::Text { token } => {
                accumulated.push_str(&token);
                observer.on_text(&token, accumulated);
            }
            OutboundEvent::Audio {
                sentence_index,
                audio_bytes_or_url,
                content_type,
                text,
            } => {
                let data = match AudioData::from_wire(&audio_bytes_or_url) {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!(sentence_index, error = %e, "Skipping undecodable audio");
                        return false;
                    }
                };
                observer.on_audio(AudioSegment {
                    sentence_index,
                    data,
                    content_type,
                    text,
                });
            }
            OutboundEvent::Done {
                full_text,
                total_sentences,
                ai_turn_id,
                latency_ms,
            } => {
                let summary = DoneSummary {
                    full_text,
                    total_sentences,
                    ai_turn_id,
                    latency_ms,
                };
                if self.shared.transition(self.generation, ReaderState::Completed) {
                    observer.on_done(&summary);
                }
                return true;
            }
            OutboundEvent::Error {
                message,
                sentence_index: Some(index),
            } => observer.on_error(&message, Some(index)),
            OutboundEvent::Error {
                message,
                sentence_index: None,
            } => {
                self.fail(&message);
                return true;
            }
        }
        false
    }

    fn fail(&self, message: &str) {
        let _delivery = self.shared.delivery.lock();
        if self.shared.transition(self.generation, ReaderState::Failed) {
            self.shared.observer.on_error(message, None);
        }
    }
}

async fn read_turn(
    context: TurnContext,
    transport: Arc<dyn TurnTransport>,
    done_timeout: Option<Duration>,
    session_id: String,
    text: String,
) {
    let reading = async {
        let mut body = transport.open(&session_id, &text).await?;
        context
            .shared
            .transition(context.generation, ReaderState::Streaming);

        let mut decoder = SseDecoder::new();
        let mut accumulated = String::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for message in decoder.push(&chunk) {
                if context.dispatch(&message, &mut accumulated) {
                    return Ok(());
                }
            }
        }
        Err(ClientError::StreamEnded)
    };

    let result = match done_timeout {
        Some(limit) => tokio::time::timeout(limit, reading)
            .await
            .unwrap_or(Err(ClientError::Timeout)),
        None => reading.await,
    };

    if let Err(e) = result {
        tracing::warn!(session_id = %session_id, error = %e, "Turn stream failed");
        context.fail(&e.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        audio: Mutex<Vec<usize>>,
        text: Mutex<String>,
        states: Mutex<Vec<ReaderState>>,
    }

    impl StreamObserver for Recorder {
        fn on_state(&self, state: ReaderState) {
            self.states.lock().push(state);
        }

        fn on_text(&self, _token: &str, accumulated: &str) {
            *self.text.lock() = accumulated.to_string();
        }

        fn on_audio(&self, audio: AudioSegment) {
            self.audio.lock().push(audio.sentence_index);
        }
    }

    fn context(recorder: Arc<Recorder>, generation: u64) -> TurnContext {
        TurnContext {
            shared: Arc::new(Shared {
                generation: AtomicU64::new(generation),
                delivery: ReentrantMutex::new(()),
                state: Mutex::new(ReaderState::Streaming),
                observer: recorder,
            }),
            generation,
        }
    }

    fn audio_message(index: usize) -> SseMessage {
        SseMessage {
            event: "audio".into(),
            data: format!(
                r#"{{"sentenceIndex":{index},"audioBytesOrUrl":"AAAA","contentType":"audio/wav","text":"Hi."}}"#
            ),
        }
    }

    #[test]
    fn test_stale_audio_is_discarded() {
        let recorder = Arc::new(Recorder::default());
        let ctx = context(recorder.clone(), 7);
        let mut text = String::new();

        ctx.dispatch(&audio_message(0), &mut text);
        ctx.shared.generation.fetch_add(1, Ordering::SeqCst);
        ctx.dispatch(&audio_message(1), &mut text);

        assert_eq!(*recorder.audio.lock(), vec![0]);
    }

    #[test]
    fn test_unparseable_payload_is_skipped() {
        let recorder = Arc::new(Recorder::default());
        let ctx = context(recorder.clone(), 1);
        let mut text = String::new();

        let garbage = SseMessage {
            event: "text".into(),
            data: "{not json".into(),
        };
        assert!(!ctx.dispatch(&garbage, &mut text));
        let unknown = SseMessage {
            event: "mystery".into(),
            data: "{}".into(),
        };
        assert!(!ctx.dispatch(&unknown, &mut text));

        let token = SseMessage {
            event: "text".into(),
            data: r#"{"token":"ok"}"#.into(),
        };
        ctx.dispatch(&token, &mut text);
        assert_eq!(*recorder.text.lock(), "ok");
    }

    #[test]
    fn test_sentence_error_is_not_terminal() {
        let recorder = Arc::new(Recorder::default());
        let ctx = context(recorder.clone(), 1);
        let mut text = String::new();

        let sentence_error = SseMessage {
            event: "error".into(),
            data: r#"{"message":"tts down","sentenceIndex":1}"#.into(),
        };
        assert!(!ctx.dispatch(&sentence_error, &mut text));

        let turn_error = SseMessage {
            event: "error".into(),
            data: r#"{"message":"model down"}"#.into(),
        };
        assert!(ctx.dispatch(&turn_error, &mut text));
        assert_eq!(*recorder.states.lock(), vec![ReaderState::Failed]);
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::default();
        settings.streaming.dedup_window_ms = 250;
        settings.server.turn_timeout_seconds = 30;

        let config = ReaderConfig::from(&settings);
        assert_eq!(config.dedup_window, Duration::from_millis(250));
        assert_eq!(config.done_timeout, Some(Duration::from_secs(35)));
    }
}
