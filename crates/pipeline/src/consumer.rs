//! Token Stream Consumer
//!
//! Drives one streaming model call for one turn. Every token is forwarded
//! immediately, accumulated, and run through the segmenter; each completed
//! sentence is handed off with the next sentence index.

use futures::StreamExt;

use voice_journal_core::{
    GenerationEvent, GenerationRequest, GenerationStream, LanguageModel, ProviderError,
    SentenceJob,
};

use crate::segmenter::segment;

/// Callbacks invoked by the consumer, never concurrently with each other
pub trait TurnHandler: Send {
    /// A token arrived; called once per token, in generation order
    fn on_text_token(&mut self, token: &str);

    /// A sentence completed; indices start at 0 and increase by one
    fn on_sentence_ready(&mut self, job: SentenceJob);

    /// The model finished; the trailing fragment has already been flushed
    fn on_done(&mut self, full_text: &str, sentence_count: usize);

    /// The model failed; `on_done` will not follow
    fn on_fatal_error(&mut self, error: &ProviderError);
}

/// Per-turn accumulator
///
/// `full_text` always equals the segmented sentences (with their original
/// separators) followed by `pending_text`.
#[derive(Debug, Default, Clone)]
pub struct AccumulatorState {
    pending_text: String,
    full_text: String,
    sentence_count: usize,
}

impl AccumulatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a token and return the sentences it completed
    pub fn push_token(&mut self, token: &str) -> Vec<SentenceJob> {
        self.full_text.push_str(token);
        self.pending_text.push_str(token);

        let (sentences, remainder) = segment(&self.pending_text);
        self.pending_text = remainder;
        sentences
            .into_iter()
            .map(|text| self.next_job(text))
            .collect()
    }

    /// Emit the trailing fragment as a final sentence, if it has content
    pub fn flush(&mut self) -> Option<SentenceJob> {
        let pending = std::mem::take(&mut self.pending_text);
        let trimmed = pending.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(self.next_job(trimmed.to_string()))
        }
    }

    fn next_job(&mut self, text: String) -> SentenceJob {
        let job = SentenceJob::new(self.sentence_count, text);
        self.sentence_count += 1;
        job
    }

    pub fn pending_text(&self) -> &str {
        &self.pending_text
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn sentence_count(&self) -> usize {
        self.sentence_count
    }
}

/// How a consumed stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerOutcome {
    Completed {
        full_text: String,
        sentence_count: usize,
    },
    Failed(ProviderError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokenStreamConsumer;

impl TokenStreamConsumer {
    pub fn new() -> Self {
        Self
    }

    /// Start the model call and consume it
    pub async fn run<H: TurnHandler>(
        &self,
        model: &dyn LanguageModel,
        request: GenerationRequest,
        handler: &mut H,
    ) -> ConsumerOutcome {
        match model.stream(request).await {
            Ok(stream) => self.consume(stream, handler).await,
            Err(e) => {
                tracing::error!(provider = model.name(), error = %e, "Model stream failed to start");
                handler.on_fatal_error(&e);
                ConsumerOutcome::Failed(e)
            }
        }
    }

    /// Consume an already-open token stream
    ///
    /// Events after the first `Complete` or `Error` are ignored. A stream
    /// that ends without either is treated as truncated.
    pub async fn consume<H: TurnHandler>(
        &self,
        mut stream: GenerationStream,
        handler: &mut H,
    ) -> ConsumerOutcome {
        let mut state = AccumulatorState::new();

        while let Some(event) = stream.next().await {
            match event {
                GenerationEvent::Token(token) => {
                    Self::accept_token(&mut state, &token, handler);
                }
                GenerationEvent::Complete(provider_text) => {
                    if state.full_text().is_empty() && !provider_text.is_empty() {
                        // Non-streaming providers deliver the whole reply at once.
                        Self::accept_token(&mut state, &provider_text, handler);
                    }
                    if let Some(job) = state.flush() {
                        handler.on_sentence_ready(job);
                    }
                    let full_text = state.full_text().to_string();
                    let sentence_count = state.sentence_count();
                    handler.on_done(&full_text, sentence_count);
                    return ConsumerOutcome::Completed {
                        full_text,
                        sentence_count,
                    };
                }
                GenerationEvent::Error(e) => {
                    return Self::fail(e, &state, handler);
                }
            }
        }

        Self::fail(ProviderError::Truncated, &state, handler)
    }

    fn accept_token<H: TurnHandler>(state: &mut AccumulatorState, token: &str, handler: &mut H) {
        if token.is_empty() {
            return;
        }
        handler.on_text_token(token);
        for job in state.push_token(token) {
            handler.on_sentence_ready(job);
        }
    }

    fn fail<H: TurnHandler>(
        error: ProviderError,
        state: &AccumulatorState,
        handler: &mut H,
    ) -> ConsumerOutcome {
        tracing::error!(
            error = %error,
            sentences = state.sentence_count(),
            pending_chars = state.pending_text().len(),
            "Model stream failed"
        );
        handler.on_fatal_error(&error);
        ConsumerOutcome::Failed(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[derive(Default)]
    struct Recorder {
        tokens: Vec<String>,
        sentences: Vec<(String, usize)>,
        done: Vec<(String, usize)>,
        errors: Vec<ProviderError>,
    }

    impl TurnHandler for Recorder {
        fn on_text_token(&mut self, token: &str) {
            self.tokens.push(token.to_string());
        }

        fn on_sentence_ready(&mut self, job: SentenceJob) {
            self.sentences.push((job.text().to_string(), job.index()));
        }

        fn on_done(&mut self, full_text: &str, sentence_count: usize) {
            self.done.push((full_text.to_string(), sentence_count));
        }

        fn on_fatal_error(&mut self, error: &ProviderError) {
            self.errors.push(error.clone());
        }
    }

    fn tokens(items: &[&str]) -> Vec<GenerationEvent> {
        items
            .iter()
            .map(|t| GenerationEvent::Token(t.to_string()))
            .collect()
    }

    #[test]
    fn test_accumulator_invariant() {
        let mut state = AccumulatorState::new();
        let mut emitted = Vec::new();
        for token in ["One", " two.", " Three", "!", " four"] {
            emitted.extend(state.push_token(token));
        }
        assert_eq!(state.full_text(), "One two. Three! four");
        assert_eq!(state.pending_text(), "four");
        assert_eq!(emitted.len(), 2);
        assert_eq!(state.sentence_count(), 2);

        let last = state.flush().unwrap();
        assert_eq!(last.index(), 2);
        assert_eq!(last.text(), "four");
        assert!(state.flush().is_none());
    }

    #[tokio::test]
    async fn test_two_sentence_scenario() {
        let mut events = tokens(&["Hi", " there.", " How", " are", " you", "?"]);
        events.push(GenerationEvent::Complete("Hi there. How are you?".into()));

        let mut recorder = Recorder::default();
        let outcome = TokenStreamConsumer::new()
            .consume(Box::pin(stream::iter(events)), &mut recorder)
            .await;

        assert_eq!(
            recorder.sentences,
            vec![("Hi there.".to_string(), 0), ("How are you?".to_string(), 1)]
        );
        assert_eq!(recorder.tokens, vec!["Hi", " there.", " How", " are", " you", "?"]);
        assert_eq!(recorder.done, vec![("Hi there. How are you?".to_string(), 2)]);
        assert!(matches!(outcome, ConsumerOutcome::Completed { sentence_count: 2, .. }));
    }

    #[tokio::test]
    async fn test_error_mid_sentence() {
        let mut events = tokens(&["Partial", " sentence", " wi"]);
        events.push(GenerationEvent::Error(ProviderError::Generation("boom".into())));
        events.push(GenerationEvent::Token(" ignored.".into()));

        let mut recorder = Recorder::default();
        let outcome = TokenStreamConsumer::new()
            .consume(Box::pin(stream::iter(events)), &mut recorder)
            .await;

        assert!(recorder.sentences.is_empty());
        assert!(recorder.done.is_empty());
        assert_eq!(recorder.errors.len(), 1);
        assert_eq!(recorder.tokens.len(), 3);
        assert!(matches!(outcome, ConsumerOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_trailing_fragment_flushed_before_done() {
        let mut events = tokens(&["Sure.", " Let", " me think"]);
        events.push(GenerationEvent::Complete(String::new()));

        let mut recorder = Recorder::default();
        TokenStreamConsumer::new()
            .consume(Box::pin(stream::iter(events)), &mut recorder)
            .await;

        assert_eq!(
            recorder.sentences,
            vec![("Sure.".to_string(), 0), ("Let me think".to_string(), 1)]
        );
        assert_eq!(recorder.done, vec![("Sure. Let me think".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_complete_without_tokens_uses_provider_text() {
        let events = vec![GenerationEvent::Complete("All at once. Done".into())];

        let mut recorder = Recorder::default();
        TokenStreamConsumer::new()
            .consume(Box::pin(stream::iter(events)), &mut recorder)
            .await;

        assert_eq!(recorder.tokens, vec!["All at once. Done"]);
        assert_eq!(recorder.sentences.len(), 2);
        assert_eq!(recorder.done[0].1, 2);
    }

    #[tokio::test]
    async fn test_stream_ending_without_terminal_is_truncated() {
        let events = tokens(&["Hello."]);

        let mut recorder = Recorder::default();
        let outcome = TokenStreamConsumer::new()
            .consume(Box::pin(stream::iter(events)), &mut recorder)
            .await;

        assert_eq!(outcome, ConsumerOutcome::Failed(ProviderError::Truncated));
        assert_eq!(recorder.sentences.len(), 1);
        assert!(recorder.done.is_empty());
    }

    #[tokio::test]
    async fn test_indices_strictly_increase() {
        let text = "A. B! C? D. E";
        let events: Vec<_> = text
            .chars()
            .map(|c| GenerationEvent::Token(c.to_string()))
            .chain(std::iter::once(GenerationEvent::Complete(String::new())))
            .collect();

        let mut recorder = Recorder::default();
        TokenStreamConsumer::new()
            .consume(Box::pin(stream::iter(events)), &mut recorder)
            .await;

        let indices: Vec<usize> = recorder.sentences.iter().map(|(_, i)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }
}
