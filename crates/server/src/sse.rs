//! Turn streaming over Server-Sent Events
//!
//! One request is one turn: the response body carries that turn's events
//! and ends when the turn closes its transport.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;

use voice_journal_transport::{encode_sse, ChannelSink, EventTransport};

use crate::http::validate_turn;
use crate::metrics;
use crate::state::AppState;
use crate::ServerError;

/// Body of `POST /api/sessions/{session_id}/turns`
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub text: String,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

pub async fn post_turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let Json(request) = body.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
    validate_turn(&session_id, &request.text)?;

    let mut session = state.store.history(&session_id).await?.into_session(
        session_id.clone(),
        request.personality,
        request.language,
    );

    let (sink, rx) = ChannelSink::new(|event| {
        let frame = encode_sse(event)?;
        Ok(Event::default().event(frame.event).data(frame.data))
    });
    let transport = EventTransport::new(session_id.clone(), sink);

    tracing::info!(session_id = %session_id, "Starting SSE turn");
    metrics::record_turn_started("sse");

    let runner = state.runner.clone();
    let text = request.text;
    tokio::spawn(async move {
        let report = runner.run(&mut session, &text, transport.clone()).await;
        metrics::record_turn_finished(&report);
        metrics::record_events_dropped(transport.dropped_count());
    });

    let keepalive = match state.config.streaming.keepalive_seconds {
        0 => KeepAlive::default(),
        secs => KeepAlive::new().interval(Duration::from_secs(secs)),
    };
    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(keepalive))
}
