//! Scripted language model
//!
//! Produces a deterministic reply word by word, for running the server
//! without credentials and for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use voice_journal_core::{
    GenerationEvent, GenerationRequest, GenerationStream, LanguageModel, ProviderError, Role,
};

#[derive(Debug, Clone)]
enum Script {
    /// Reflect the latest user message back
    Echo,
    /// Cycle through fixed replies
    Canned(Vec<String>),
}

pub struct ScriptedModel {
    script: Script,
    token_delay: Duration,
    turn: AtomicUsize,
}

impl ScriptedModel {
    pub fn echo(token_delay: Duration) -> Self {
        Self {
            script: Script::Echo,
            token_delay,
            turn: AtomicUsize::new(0),
        }
    }

    pub fn canned(replies: Vec<String>, token_delay: Duration) -> Self {
        Self {
            script: Script::Canned(replies),
            token_delay,
            turn: AtomicUsize::new(0),
        }
    }

    fn reply(&self, request: &GenerationRequest) -> String {
        let turn = self.turn.fetch_add(1, Ordering::Relaxed);
        match &self.script {
            Script::Canned(replies) if !replies.is_empty() => replies[turn % replies.len()].clone(),
            _ => {
                let said = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.trim().trim_end_matches(['.', '!', '?']))
                    .unwrap_or_default();
                if said.is_empty() {
                    "I'm listening. What's on your mind today?".to_string()
                } else {
                    format!("Thanks for sharing that. You said: {said}. How did that make you feel?")
                }
            }
        }
    }
}

/// Split text into word tokens, each after the first carrying its leading space
pub fn word_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            if i == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            }
        })
        .collect()
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream, ProviderError> {
        let reply = self.reply(&request);
        let delay = self.token_delay;

        Ok(Box::pin(async_stream::stream! {
            let mut full = String::new();
            for token in word_tokens(&reply) {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                full.push_str(&token);
                yield GenerationEvent::Token(token);
            }
            yield GenerationEvent::Complete(full);
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
