//! Turn requests over HTTP with an SSE response body

use async_trait::async_trait;
use futures::TryStreamExt;
use serde::Serialize;

use crate::{ByteStream, ClientError, TurnTransport};

#[derive(Serialize)]
struct TurnBody<'a> {
    text: &'a str,
}

/// POSTs to `/api/sessions/{id}/turns` and streams the response
#[derive(Clone)]
pub struct HttpTurnTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTurnTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn turns_url(&self, session_id: &str) -> String {
        format!("{}/api/sessions/{}/turns", self.base_url, session_id)
    }
}

#[async_trait]
impl TurnTransport for HttpTurnTransport {
    async fn open(&self, session_id: &str, text: &str) -> Result<ByteStream, ClientError> {
        let response = self
            .client
            .post(self.turns_url(session_id))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&TurnBody { text })
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(session_id, "Turn stream opened");
        Ok(Box::pin(
            response
                .bytes_stream()
                .map_err(|e| ClientError::Transport(e.to_string())),
        ))
    }
}
