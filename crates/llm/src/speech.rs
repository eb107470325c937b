//! Speech synthesis providers

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use serde::Serialize;

use voice_journal_core::{
    estimate_duration_seconds, AudioChunk, AudioData, AudioStream, ProviderError,
    SpeechSynthesizer, DEFAULT_WORDS_PER_MINUTE,
};

use crate::{check_status, http_client, request_error};

/// Longest sub-chunk the silent provider emits, in seconds
const SILENT_CHUNK_SECONDS: f64 = 1.0;

/// Offline provider: 16-bit mono silence sized to the sentence's speaking
/// time, one WAV file per second of audio.
pub struct SilentSpeech {
    sample_rate: u32,
}

impl SilentSpeech {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(8000),
        }
    }

    fn chunk_sample_counts(&self, text: &str) -> Vec<usize> {
        let seconds = estimate_duration_seconds(text, DEFAULT_WORDS_PER_MINUTE);
        let mut remaining = (seconds * self.sample_rate as f64).round() as usize;
        let per_chunk = (SILENT_CHUNK_SECONDS * self.sample_rate as f64) as usize;
        let mut counts = Vec::new();
        while remaining > 0 {
            let samples = remaining.min(per_chunk);
            counts.push(samples);
            remaining -= samples;
        }
        counts
    }
}

/// Minimal PCM WAV container around zeroed samples
pub fn silent_wav(sample_rate: u32, samples: usize) -> Bytes {
    let data_len = (samples * 2) as u32;
    let mut buf = BytesMut::with_capacity(44 + data_len as usize);
    buf.put_slice(b"RIFF");
    buf.put_u32_le(36 + data_len);
    buf.put_slice(b"WAVE");
    buf.put_slice(b"fmt ");
    buf.put_u32_le(16);
    buf.put_u16_le(1); // PCM
    buf.put_u16_le(1); // mono
    buf.put_u32_le(sample_rate);
    buf.put_u32_le(sample_rate * 2);
    buf.put_u16_le(2);
    buf.put_u16_le(16);
    buf.put_slice(b"data");
    buf.put_u32_le(data_len);
    buf.put_bytes(0, data_len as usize);
    buf.freeze()
}

#[async_trait]
impl SpeechSynthesizer for SilentSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, ProviderError> {
        let sample_rate = self.sample_rate;
        let chunks: Vec<Result<AudioChunk, ProviderError>> = self
            .chunk_sample_counts(text)
            .into_iter()
            .map(|samples| {
                Ok(AudioChunk::new(
                    AudioData::Inline(silent_wav(sample_rate, samples)),
                    "audio/wav",
                ))
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn name(&self) -> &str {
        "silent"
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// OpenAI-compatible `POST {base_url}/v1/audio/speech`; each body chunk is
/// forwarded as one audio sub-chunk.
pub struct OpenAiSpeech {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    voice: String,
    response_format: String,
    api_key: Option<String>,
}

impl OpenAiSpeech {
    pub fn new(
        base_url: &str,
        model: &str,
        voice: &str,
        response_format: &str,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client()?,
            endpoint: format!("{}/v1/audio/speech", base_url.trim_end_matches('/')),
            model: model.to_string(),
            voice: voice.to_string(),
            response_format: response_format.to_string(),
            api_key,
        })
    }
}

pub fn content_type_for(format: &str) -> &'static str {
    match format {
        "wav" => "audio/wav",
        "opus" => "audio/ogg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "pcm" => "audio/pcm",
        _ => "audio/mpeg",
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, ProviderError> {
        let body = SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
            response_format: &self.response_format,
        };

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = check_status(builder.send().await.map_err(request_error)?).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for(&self.response_format).to_string());

        let audio = response
            .bytes_stream()
            .filter(|chunk| futures::future::ready(!matches!(chunk, Ok(b) if b.is_empty())))
            .map(move |chunk| {
                chunk
                    .map(|bytes| AudioChunk::new(AudioData::Inline(bytes), content_type.clone()))
                    .map_err(request_error)
            });
        Ok(Box::pin(audio))
    }

    fn name(&self) -> &str {
        "openai"
    }
}
