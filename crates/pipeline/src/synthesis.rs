//! Speech Synthesis Task
//!
//! One task per sentence. Audio sub-chunks are forwarded as `audio` events
//! the moment the provider yields them, all tagged with the sentence index.
//! Failures stay local: they become an `error` event for that index and
//! never touch sibling tasks or the turn.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use voice_journal_core::{OutboundEvent, ProviderError, SentenceJob, SpeechSynthesizer};
use voice_journal_transport::EventSender;

/// Synthesis configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Concurrent synthesis tasks per turn (0 = unbounded)
    pub max_concurrent: usize,
    /// Upper bound for one sentence, including all of its sub-chunks
    pub sentence_timeout: Option<Duration>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            sentence_timeout: Some(Duration::from_secs(15)),
        }
    }
}

/// Result of one sentence's synthesis
#[derive(Debug, Clone)]
pub struct SentenceOutcome {
    pub index: usize,
    /// Audio events written for this sentence
    pub chunks: usize,
    /// When the first sub-chunk was forwarded
    pub first_audio_at: Option<Instant>,
    pub error: Option<ProviderError>,
}

impl SentenceOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Synthesizes one sentence and forwards its audio
#[derive(Clone)]
pub struct SpeechSynthesisTask {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    transport: Arc<dyn EventSender>,
    timeout: Option<Duration>,
}

impl SpeechSynthesisTask {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transport: Arc<dyn EventSender>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            synthesizer,
            transport,
            timeout,
        }
    }

    /// Run to completion; never returns an error
    pub async fn run(&self, job: SentenceJob) -> SentenceOutcome {
        let mut outcome = SentenceOutcome {
            index: job.index(),
            chunks: 0,
            first_audio_at: None,
            error: None,
        };

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.forward(&job, &mut outcome)).await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(limit.as_millis() as u64)),
            },
            None => self.forward(&job, &mut outcome).await,
        };

        let result = result.and_then(|()| {
            if outcome.chunks == 0 {
                Err(ProviderError::Synthesis("no audio produced".to_string()))
            } else {
                Ok(())
            }
        });

        if let Err(e) = result {
            tracing::warn!(
                provider = self.synthesizer.name(),
                sentence_index = job.index(),
                chunks = outcome.chunks,
                error = %e,
                "Sentence synthesis failed"
            );
            self.transport
                .send(OutboundEvent::sentence_error(job.index(), e.to_string()));
            outcome.error = Some(e);
        } else {
            tracing::debug!(
                sentence_index = job.index(),
                chunks = outcome.chunks,
                "Sentence synthesized"
            );
        }

        outcome
    }

    async fn forward(
        &self,
        job: &SentenceJob,
        outcome: &mut SentenceOutcome,
    ) -> Result<(), ProviderError> {
        let mut audio = self.synthesizer.synthesize(job.text()).await?;

        while let Some(chunk) = audio.next().await {
            let chunk = chunk?;
            self.transport.send(OutboundEvent::Audio {
                sentence_index: job.index(),
                audio_bytes_or_url: chunk.data.to_wire(),
                content_type: chunk.content_type,
                text: job.text().to_string(),
            });
            outcome.chunks += 1;
            outcome.first_audio_at.get_or_insert_with(Instant::now);
        }

        Ok(())
    }
}

/// Starts synthesis tasks for one turn, in sentence order
///
/// With a concurrency cap, each task waits for its predecessor to obtain a
/// permit before asking for its own, so permits are granted in index order.
pub struct SynthesisDispatcher {
    task: SpeechSynthesisTask,
    permits: Option<Arc<Semaphore>>,
    previous: Option<oneshot::Receiver<()>>,
}

impl SynthesisDispatcher {
    pub fn new(task: SpeechSynthesisTask, max_concurrent: usize) -> Self {
        Self {
            task,
            permits: (max_concurrent > 0).then(|| Arc::new(Semaphore::new(max_concurrent))),
            previous: None,
        }
    }

    pub fn from_config(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transport: Arc<dyn EventSender>,
        config: &SynthesisConfig,
    ) -> Self {
        let task = SpeechSynthesisTask::new(synthesizer, transport, config.sentence_timeout);
        Self::new(task, config.max_concurrent)
    }

    /// Spawn the task for `job` without waiting for it
    pub fn dispatch(&mut self, job: SentenceJob) -> JoinHandle<SentenceOutcome> {
        let task = self.task.clone();

        let Some(permits) = self.permits.clone() else {
            return tokio::spawn(async move { task.run(job).await });
        };

        let previous = self.previous.take();
        let (acquired_tx, acquired_rx) = oneshot::channel();
        self.previous = Some(acquired_rx);

        tokio::spawn(async move {
            if let Some(previous) = previous {
                // A dropped sender means the predecessor is gone; carry on.
                let _ = previous.await;
            }
            let permit: Option<OwnedSemaphorePermit> = permits.acquire_owned().await.ok();
            let _ = acquired_tx.send(());
            let outcome = task.run(job).await;
            drop(permit);
            outcome
        })
    }
}
