//! Router-level tests: requests in, SSE bodies out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::time::timeout;
use tower::ServiceExt;

use voice_journal_config::Settings;
use voice_journal_core::{
    GenerationEvent, GenerationRequest, GenerationStream, LanguageModel, OutboundEvent,
    ProviderError,
};
use voice_journal_llm::{ScriptedModel, SilentSpeech};
use voice_journal_persistence::InMemoryTurnStore;
use voice_journal_server::{create_router, AppState};

struct BrokenModel;

#[async_trait]
impl LanguageModel for BrokenModel {
    async fn stream(&self, _request: GenerationRequest) -> Result<GenerationStream, ProviderError> {
        Ok(Box::pin(futures::stream::iter(vec![
            GenerationEvent::Token("Partial sentence wi".into()),
            GenerationEvent::Error(ProviderError::Connection("upstream reset".into())),
        ])))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

fn app_with(model: Arc<dyn LanguageModel>) -> Router {
    let state = AppState::new(
        Settings::default(),
        model,
        Arc::new(SilentSpeech::new(8000)),
        Arc::new(InMemoryTurnStore::new()),
    );
    create_router(state)
}

fn app() -> Router {
    app_with(Arc::new(ScriptedModel::canned(
        vec!["That sounds like a full day. What stood out most?".into()],
        Duration::ZERO,
    )))
}

fn post_turn(session: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/sessions/{session}/turns"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = timeout(Duration::from_secs(5), to_bytes(response.into_body(), usize::MAX))
        .await
        .expect("body did not finish")
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// (event name, payload) pairs from an SSE body
fn parse_sse(body: &str) -> Vec<OutboundEvent> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut name = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data = Some(v.trim().to_string());
                }
            }
            OutboundEvent::from_parts(&name?, &data?).ok()
        })
        .collect()
}

#[tokio::test]
async fn test_sse_turn_streams_full_protocol() {
    let response = app()
        .oneshot(post_turn("journal-1", r#"{"text":"I worked late and then cooked"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let events = parse_sse(&body_text(response).await);

    assert!(matches!(events.first(), Some(OutboundEvent::Started { .. })));
    assert!(events.iter().any(|e| matches!(e, OutboundEvent::Text { .. })));

    let mut indices: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::Audio { sentence_index, .. } => Some(*sentence_index),
            _ => None,
        })
        .collect();
    indices.sort_unstable();
    indices.dedup();
    assert_eq!(indices, vec![0, 1]);

    match events.last() {
        Some(OutboundEvent::Done {
            full_text,
            total_sentences,
            ..
        }) => {
            assert_eq!(full_text, "That sounds like a full day. What stood out most?");
            assert_eq!(*total_sentences, 2);
        }
        other => panic!("expected done, got {other:?}"),
    }
}

#[tokio::test]
async fn test_turns_are_listed_after_streaming() {
    let app = app();
    let response = app
        .clone()
        .oneshot(post_turn("journal-2", r#"{"text":"Hello"}"#))
        .await
        .unwrap();
    body_text(response).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sessions/journal-2/turns")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let turns: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    let turns = turns.as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["speaker"], "user");
    assert_eq!(turns[1]["speaker"], "ai");
    assert!(turns[1]["startTimeSeconds"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_empty_text_rejected_before_streaming() {
    let response = app()
        .oneshot(post_turn("journal-3", r#"{"text":"   "}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("text"));
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let response = app()
        .oneshot(post_turn("journal-4", r#"{"message":"wrong field"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_model_failure_ends_with_error_event() {
    let response = app_with(Arc::new(BrokenModel))
        .oneshot(post_turn("journal-5", r#"{"text":"Hi"}"#))
        .await
        .unwrap();
    let events = parse_sse(&body_text(response).await);

    assert!(matches!(events.first(), Some(OutboundEvent::Started { .. })));
    assert!(!events.iter().any(|e| matches!(e, OutboundEvent::Done { .. })));
    assert!(!events.iter().any(|e| matches!(e, OutboundEvent::Audio { .. })));
    assert!(matches!(
        events.last(),
        Some(OutboundEvent::Error { sentence_index: None, message }) if message.contains("upstream reset")
    ));
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = app();
    for uri in ["/health", "/ready"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
}
