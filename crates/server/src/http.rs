//! HTTP endpoints
//!
//! Health checks and session inspection beside the WebSocket route.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::websocket::WebSocketHandler;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let ws_path = state.config.server.ws_path.clone();

    Router::new()
        // Session inspection
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id", delete(delete_session))
        // Health checks
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // WebSocket
        .route(&ws_path, get(ws_handler))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Get session info
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let session = state.sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "state": session.state().as_str(),
        "turns_completed": session.ledger().turns_completed(),
        "pending_turns": session.ledger().pending_count(),
        "idle_ms": session.idle_for().as_millis() as u64,
    })))
}

/// Delete session
async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.sessions.remove(&id);
    StatusCode::NO_CONTENT
}

/// List sessions
async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "sessions": state.sessions.count(),
    }))
}

/// WebSocket handler wrapper
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    WebSocketHandler::handle(ws, State(state)).await
}
