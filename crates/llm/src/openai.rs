//! OpenAI-compatible chat completions, streamed
//!
//! `POST {base_url}/v1/chat/completions` with `stream: true`; the response
//! is an event stream of `data: {chunk}` lines terminated by `data: [DONE]`.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use voice_journal_core::{
    ChatMessage, GenerationEvent, GenerationRequest, GenerationStream, LanguageModel,
    ProviderError,
};

use crate::stream::DataLineDecoder;
use crate::{check_status, http_client, request_error};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// What one `data:` payload means
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChunkPayload {
    Content(String),
    Done,
    Empty,
    Failed(ProviderError),
}

pub(crate) fn parse_payload(payload: &str) -> ChunkPayload {
    if payload == "[DONE]" {
        return ChunkPayload::Done;
    }
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(payload) {
        return ChunkPayload::Failed(ProviderError::Generation(envelope.error.message));
    }
    match serde_json::from_str::<ChatChunk>(payload) {
        Ok(chunk) => {
            let content: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if content.is_empty() {
                ChunkPayload::Empty
            } else {
                ChunkPayload::Content(content)
            }
        }
        Err(e) => ChunkPayload::Failed(ProviderError::Protocol(e.to_string())),
    }
}

pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChatModel {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client()?,
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        })
    }

    fn messages(request: GenerationRequest) -> Vec<ChatMessage> {
        let mut style = Vec::new();
        if let Some(personality) = request.personality.filter(|p| !p.is_empty()) {
            style.push(format!("Personality: {personality}."));
        }
        if let Some(language) = request.language.filter(|l| !l.is_empty()) {
            style.push(format!("Always reply in {language}."));
        }

        let mut messages = request.messages;
        if !style.is_empty() {
            let at = messages
                .iter()
                .take_while(|m| m.role == voice_journal_core::Role::System)
                .count();
            messages.insert(at, ChatMessage::system(style.join(" ")));
        }
        messages
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: Self::messages(request),
            stream: true,
        };

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = check_status(builder.send().await.map_err(request_error)?).await?;
        let mut body = response.bytes_stream();

        tracing::debug!(model = %self.model, "Chat completion stream opened");

        Ok(Box::pin(async_stream::stream! {
            let mut decoder = DataLineDecoder::new();
            let mut full = String::new();

            while let Some(chunk) = body.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield GenerationEvent::Error(request_error(e));
                        return;
                    }
                };
                for payload in decoder.push(&bytes) {
                    match parse_payload(&payload) {
                        ChunkPayload::Content(token) => {
                            full.push_str(&token);
                            yield GenerationEvent::Token(token);
                        }
                        ChunkPayload::Done => {
                            yield GenerationEvent::Complete(full);
                            return;
                        }
                        ChunkPayload::Empty => {}
                        ChunkPayload::Failed(e) => {
                            yield GenerationEvent::Error(e);
                            return;
                        }
                    }
                }
            }
        }))
    }

    fn name(&self) -> &str {
        "openai"
    }
}
