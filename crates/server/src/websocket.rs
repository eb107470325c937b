//! WebSocket Handler
//!
//! One connection carries many turns, one at a time. Client messages:
//!
//! - `{"type":"user_message","text":"..."}` starts a turn
//! - `{"type":"cancel"}` detaches the running turn
//! - `{"type":"ping","timestamp":123}` is answered with `pong`
//!
//! Server frames are the turn events as tagged JSON, plus `pong`.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use voice_journal_core::{OutboundEvent, StreamSession};
use voice_journal_transport::{
    encode_json, ChannelSink, EventSender, EventTransport, ScopedTransport,
};

use crate::http::validate_turn;
use crate::metrics;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;
use crate::ServerError;

/// Inbound client messages
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    UserMessage {
        text: String,
    },
    Cancel,
    Ping {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

/// Frames outside the turn event protocol
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    #[serde(rename_all = "camelCase")]
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
        server_time_ms: i64,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub personality: Option<String>,
    pub language: Option<String>,
}

struct ActiveTurn {
    scope: Arc<ScopedTransport>,
    task: JoinHandle<()>,
}

impl ActiveTurn {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// State owned by one connection
struct Connection {
    state: AppState,
    transport: Arc<EventTransport>,
    control: mpsc::UnboundedSender<Message>,
    session: Arc<Mutex<StreamSession>>,
    limiter: RateLimiter,
    active: Option<ActiveTurn>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<ConnectParams>,
) -> Result<Response, ServerError> {
    if session_id.trim().is_empty() {
        return Err(ServerError::InvalidRequest("session_id is required".into()));
    }
    let session = state.store.history(&session_id).await?.into_session(
        session_id,
        params.personality,
        params.language,
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session)))
}

async fn handle_socket(socket: WebSocket, state: AppState, session: StreamSession) {
    let session_id = session.session_id.clone();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    let sink = ChannelSink::with_sender(out_tx.clone(), |event| {
        encode_json(event).map(|json| Message::Text(json.into()))
    });
    let mut conn = Connection {
        limiter: RateLimiter::new(state.config.server.rate_limit.clone()),
        state,
        transport: EventTransport::new(session_id.clone(), sink),
        control: out_tx,
        session: Arc::new(Mutex::new(session)),
        active: None,
    };

    tracing::info!(session_id = %session_id, "WebSocket connected");

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "WebSocket receive error");
                break;
            }
        };

        match message {
            Message::Text(text) => conn.handle_text(text.as_str()),
            Message::Binary(_) => {
                conn.transport
                    .send(OutboundEvent::error("binary frames are not supported"));
            }
            Message::Ping(payload) => {
                let _ = conn.control.send(Message::Pong(payload));
            }
            Message::Pong(_) => {}
            Message::Close(_) => break,
        }
    }

    conn.cancel_turn("socket closed");
    conn.transport.close();
    metrics::record_events_dropped(conn.transport.dropped_count());
    drop(conn);
    let _ = writer.await;

    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

impl Connection {
    fn handle_text(&mut self, text: &str) {
        if let Err(e) = self.limiter.check_message() {
            tracing::debug!(session_id = %self.transport.label(), "Rate limited");
            self.transport.send(OutboundEvent::error(e.to_string()));
            return;
        }

        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                self.transport
                    .send(OutboundEvent::error(format!("invalid message: {e}")));
                return;
            }
        };

        match message {
            ClientMessage::UserMessage { text } => self.start_turn(text),
            ClientMessage::Cancel => self.cancel_turn("client cancel"),
            ClientMessage::Ping { timestamp } => {
                let pong = ControlMessage::Pong {
                    timestamp,
                    server_time_ms: chrono::Utc::now().timestamp_millis(),
                };
                if let Ok(json) = serde_json::to_string(&pong) {
                    let _ = self.control.send(Message::Text(json.into()));
                }
            }
        }
    }

    fn start_turn(&mut self, text: String) {
        if let Err(e) = validate_turn(self.transport.label(), &text) {
            self.transport.send(OutboundEvent::error(e.to_string()));
            return;
        }
        if self.active.as_ref().is_some_and(ActiveTurn::is_running) {
            self.transport
                .send(OutboundEvent::error("turn already in progress"));
            return;
        }

        let scope = self.transport.scope();
        let runner = self.state.runner.clone();
        let session = self.session.clone();
        let turn_transport = scope.clone();

        metrics::record_turn_started("ws");
        let task = tokio::spawn(async move {
            let mut session = session.lock().await;
            let report = runner.run(&mut session, &text, turn_transport).await;
            metrics::record_turn_finished(&report);
        });

        self.active = Some(ActiveTurn { scope, task });
    }

    /// Silence the running turn and stop driving it. Synthesis tasks it
    /// already spawned finish on their own against the closed scope.
    fn cancel_turn(&mut self, reason: &str) {
        let Some(turn) = self.active.take() else {
            return;
        };
        if !turn.is_running() {
            return;
        }
        turn.scope.close();
        turn.task.abort();
        metrics::record_turn_cancelled();
        tracing::info!(session_id = %self.transport.label(), reason, "Turn cancelled");
    }
}
