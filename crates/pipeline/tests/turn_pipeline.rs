//! End-to-end turn tests: model tokens in, wire events out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;

use voice_journal_core::{
    AudioChunk, AudioData, AudioStream, GenerationEvent, GenerationRequest, GenerationStream,
    LanguageModel, NewTurn, OutboundEvent, PersistenceError, ProviderError, Role, Speaker,
    SpeechSynthesizer, StreamSession, TurnId, TurnSink,
};
use voice_journal_pipeline::{SynthesisConfig, TurnConfig, TurnOutcome, TurnRunner};
use voice_journal_transport::{ChannelSink, EventTransport};

/// Replays fixed events, one per tick, then optionally stalls
struct ReplayModel {
    events: Vec<GenerationEvent>,
    stall_after: bool,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ReplayModel {
    fn new(events: Vec<GenerationEvent>) -> Arc<Self> {
        Arc::new(Self {
            events,
            stall_after: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn tokens(tokens: &[&str]) -> Arc<Self> {
        let mut events: Vec<_> = tokens
            .iter()
            .map(|t| GenerationEvent::Token(t.to_string()))
            .collect();
        events.push(GenerationEvent::Complete(tokens.concat()));
        Self::new(events)
    }
}

#[async_trait]
impl LanguageModel for ReplayModel {
    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream, ProviderError> {
        self.requests.lock().push(request);
        let events = self.events.clone();
        let stall = self.stall_after;
        Ok(Box::pin(async_stream::stream! {
            for event in events {
                tokio::time::sleep(Duration::from_millis(2)).await;
                yield event;
            }
            if stall {
                futures::future::pending::<()>().await;
            }
        }))
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// Two sub-chunks per sentence; delay and failure chosen per sentence text
struct TestSpeech {
    delay_ms: fn(&str) -> u64,
    fails: fn(&str) -> bool,
}

#[async_trait]
impl SpeechSynthesizer for TestSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, ProviderError> {
        tokio::time::sleep(Duration::from_millis((self.delay_ms)(text))).await;
        if (self.fails)(text) {
            return Err(ProviderError::Synthesis(format!("cannot voice {text:?}")));
        }
        let chunks: Vec<Result<AudioChunk, ProviderError>> = (0..2u8)
            .map(|i| {
                Ok(AudioChunk::new(
                    AudioData::Inline(Bytes::from(vec![i; 8])),
                    "audio/mpeg",
                ))
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        "test"
    }
}

fn speech() -> Arc<TestSpeech> {
    Arc::new(TestSpeech {
        delay_ms: |_| 5,
        fails: |_| false,
    })
}

#[derive(Default)]
struct MemorySink {
    turns: Mutex<Vec<NewTurn>>,
    reject_ai: bool,
}

#[async_trait]
impl TurnSink for MemorySink {
    async fn record_turn(&self, turn: NewTurn) -> Result<TurnId, PersistenceError> {
        if self.reject_ai && turn.speaker == Speaker::Ai {
            return Err(PersistenceError::Unavailable("disk full".into()));
        }
        let mut turns = self.turns.lock();
        turns.push(turn);
        Ok(TurnId::new(format!("turn-{}", turns.len())))
    }
}

fn config() -> TurnConfig {
    TurnConfig {
        synthesis: SynthesisConfig {
            max_concurrent: 0,
            sentence_timeout: Some(Duration::from_secs(2)),
        },
        turn_timeout: Some(Duration::from_secs(5)),
        ..TurnConfig::default()
    }
}

async fn collect(mut rx: mpsc::UnboundedReceiver<OutboundEvent>) -> Vec<OutboundEvent> {
    let mut events = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event stream stalled")
    {
        events.push(event);
    }
    events
}

fn audio_indices(events: &[OutboundEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::Audio { sentence_index, .. } => Some(*sentence_index),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_two_sentences_stream_text_audio_and_done() {
    let model = ReplayModel::tokens(&["Hi", " there.", " How", " are", " you", "?"]);
    let sink = Arc::new(MemorySink::default());
    let runner = TurnRunner::new(model, speech(), sink.clone(), config());

    let (channel, rx) = ChannelSink::events();
    let transport = EventTransport::new("s1", channel);
    let mut session = StreamSession::new("s1");

    let report = runner.run(&mut session, "hello", transport).await;
    let events = collect(rx).await;

    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(
        events.first(),
        Some(&OutboundEvent::Started {
            user_turn_id: TurnId::new("turn-1")
        })
    );

    let tokens: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::Text { token } => Some(token.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec!["Hi", " there.", " How", " are", " you", "?"]);

    let mut indices = audio_indices(&events);
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 0, 1, 1]);

    match events.last() {
        Some(OutboundEvent::Done {
            full_text,
            total_sentences,
            ai_turn_id,
            ..
        }) => {
            assert_eq!(full_text, "Hi there. How are you?");
            assert_eq!(*total_sentences, 2);
            assert_eq!(ai_turn_id, &TurnId::new("turn-2"));
        }
        other => panic!("expected done, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_sentence_does_not_block_done() {
    let model = ReplayModel::tokens(&["First one.", " Second fail.", " Third one."]);
    let speech = Arc::new(TestSpeech {
        delay_ms: |_| 5,
        fails: |text| text.contains("fail"),
    });
    let runner = TurnRunner::new(model, speech, Arc::new(MemorySink::default()), config());

    let (channel, rx) = ChannelSink::events();
    let mut session = StreamSession::new("s1");
    let report = runner
        .run(&mut session, "go", EventTransport::new("s1", channel))
        .await;
    let events = collect(rx).await;

    assert!(report.is_completed());
    assert_eq!(report.failed_sentences, vec![1]);

    let mut indices = audio_indices(&events);
    indices.sort_unstable();
    indices.dedup();
    assert_eq!(indices, vec![0, 2]);

    let sentence_errors: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::Error { sentence_index, .. } => Some(*sentence_index),
            _ => None,
        })
        .collect();
    assert_eq!(sentence_errors, vec![Some(1)]);
    assert!(matches!(
        events.last(),
        Some(OutboundEvent::Done { total_sentences: 3, .. })
    ));
}

#[tokio::test]
async fn test_done_waits_for_out_of_order_audio() {
    let model = ReplayModel::tokens(&["Slow first.", " Quick second."]);
    let speech = Arc::new(TestSpeech {
        delay_ms: |text| if text.starts_with("Slow") { 80 } else { 1 },
        fails: |_| false,
    });
    let runner = TurnRunner::new(model, speech, Arc::new(MemorySink::default()), config());

    let (channel, rx) = ChannelSink::events();
    let mut session = StreamSession::new("s1");
    runner
        .run(&mut session, "go", EventTransport::new("s1", channel))
        .await;
    let events = collect(rx).await;

    let indices = audio_indices(&events);
    assert_eq!(indices, vec![1, 1, 0, 0]);

    let done_at = events
        .iter()
        .position(|e| matches!(e, OutboundEvent::Done { .. }))
        .expect("done event");
    assert_eq!(done_at, events.len() - 1);
}

#[tokio::test]
async fn test_model_failure_sends_single_error_and_no_done() {
    let model = ReplayModel::new(vec![
        GenerationEvent::Token("Partial".into()),
        GenerationEvent::Token(" sentence wi".into()),
        GenerationEvent::Error(ProviderError::Connection("reset by peer".into())),
    ]);
    let sink = Arc::new(MemorySink::default());
    let runner = TurnRunner::new(model, speech(), sink.clone(), config());

    let (channel, rx) = ChannelSink::events();
    let mut session = StreamSession::new("s1");
    let report = runner
        .run(&mut session, "go", EventTransport::new("s1", channel))
        .await;
    let events = collect(rx).await;

    assert_eq!(report.outcome, TurnOutcome::ModelFailed);
    assert!(audio_indices(&events).is_empty());
    assert!(!events.iter().any(|e| matches!(e, OutboundEvent::Done { .. })));

    let errors: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, OutboundEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_terminal());

    // Only the user turn was recorded and nothing was added to the history.
    assert_eq!(sink.turns.lock().len(), 1);
    assert!(session.history.is_empty());
}

#[tokio::test]
async fn test_completed_turn_updates_history_and_clock() {
    let model = ReplayModel::tokens(&["Tell me more."]);
    let sink = Arc::new(MemorySink::default());
    let runner = TurnRunner::new(model.clone(), speech(), sink.clone(), config());

    let mut session = StreamSession::new("s1");
    for text in ["I went hiking today", "It rained"] {
        let (channel, rx) = ChannelSink::events();
        runner
            .run(&mut session, text, EventTransport::new("s1", channel))
            .await;
        collect(rx).await;
    }

    assert_eq!(session.history.len(), 4);
    assert_eq!(session.history[0].role, Role::User);
    assert_eq!(session.history[1].content, "Tell me more.");

    let requests = model.requests.lock();
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[2].content, "It rained");

    let turns = sink.turns.lock();
    assert_eq!(turns.len(), 4);
    for pair in turns.windows(2) {
        assert!(pair[1].start_time_seconds > pair[0].start_time_seconds);
    }
    assert!((session.clock() - turns.iter().map(|t| t.duration_seconds).sum::<f64>()).abs() < 1e-9);
}

#[tokio::test]
async fn test_stalled_model_times_out() {
    let model = Arc::new(ReplayModel {
        events: vec![GenerationEvent::Token("Thinking".into())],
        stall_after: true,
        requests: Mutex::new(Vec::new()),
    });
    let runner = TurnRunner::new(
        model,
        speech(),
        Arc::new(MemorySink::default()),
        TurnConfig {
            turn_timeout: Some(Duration::from_millis(100)),
            ..config()
        },
    );

    let (channel, rx) = ChannelSink::events();
    let mut session = StreamSession::new("s1");
    let report = runner
        .run(&mut session, "go", EventTransport::new("s1", channel))
        .await;
    let events = collect(rx).await;

    assert_eq!(report.outcome, TurnOutcome::TimedOut);
    assert!(matches!(
        events.last(),
        Some(OutboundEvent::Error { sentence_index: None, message }) if message.contains("timed out")
    ));
}

#[tokio::test]
async fn test_ai_turn_persistence_failure_is_turn_error() {
    let model = ReplayModel::tokens(&["Noted."]);
    let sink = Arc::new(MemorySink {
        reject_ai: true,
        ..MemorySink::default()
    });
    let runner = TurnRunner::new(model, speech(), sink, config());

    let (channel, rx) = ChannelSink::events();
    let mut session = StreamSession::new("s1");
    let report = runner
        .run(&mut session, "go", EventTransport::new("s1", channel))
        .await;
    let events = collect(rx).await;

    assert_eq!(report.outcome, TurnOutcome::PersistenceFailed);
    assert_eq!(audio_indices(&events), vec![0, 0]);
    assert!(matches!(events.last(), Some(e) if e.is_terminal() && !matches!(e, OutboundEvent::Done { .. })));
    assert!(session.history.is_empty());
}

#[tokio::test]
async fn test_cancelled_turn_scope_silences_late_audio() {
    let model = ReplayModel::tokens(&["One.", " Two."]);
    let speech = Arc::new(TestSpeech {
        delay_ms: |_| 50,
        fails: |_| false,
    });
    let runner = TurnRunner::new(model, speech, Arc::new(MemorySink::default()), config());

    let (channel, mut rx) = ChannelSink::events();
    let connection = EventTransport::new("s1", channel);
    let turn = connection.scope();

    let cancel = {
        let turn = turn.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            voice_journal_transport::EventSender::close(turn.as_ref());
        })
    };

    let mut session = StreamSession::new("s1");
    runner.run(&mut session, "go", turn).await;
    cancel.await.unwrap();

    // The connection stays open; no audio from the cancelled turn got through.
    assert!(!voice_journal_transport::EventSender::is_closed(connection.as_ref()));
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert!(audio_indices(&seen).is_empty());
    assert!(connection.dropped_count() > 0);
}
