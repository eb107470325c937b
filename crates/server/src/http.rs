//! HTTP Endpoints

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use voice_journal_persistence::StoredTurn;

use crate::metrics::metrics_handler;
use crate::sse::post_turn;
use crate::state::AppState;
use crate::websocket::ws_handler;
use crate::ServerError;

const MAX_SESSION_ID_LEN: usize = 128;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route(
            "/api/sessions/{session_id}/turns",
            post(post_turn).get(list_turns),
        )
        .route("/ws/{session_id}", get(ws_handler))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}

/// Reject a turn before any stream is opened
pub(crate) fn validate_turn(session_id: &str, text: &str) -> Result<(), ServerError> {
    if session_id.trim().is_empty() {
        return Err(ServerError::InvalidRequest("session_id is required".into()));
    }
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(ServerError::InvalidRequest("session_id is too long".into()));
    }
    if text.trim().is_empty() {
        return Err(ServerError::InvalidRequest("text is required".into()));
    }
    Ok(())
}

async fn list_turns(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<StoredTurn>>, ServerError> {
    Ok(Json(state.store.list_turns(&session_id).await?))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn readiness_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ready": true,
        "llm": format!("{:?}", state.config.llm.provider).to_lowercase(),
        "speech": format!("{:?}", state.config.speech.provider).to_lowercase(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_turn() {
        assert!(validate_turn("s1", "hello").is_ok());
        assert!(validate_turn(" ", "hello").is_err());
        assert!(validate_turn("s1", "   ").is_err());
        assert!(validate_turn(&"x".repeat(200), "hello").is_err());
    }
}
