//! Voicebridge server
//!
//! One WebSocket connection per session: inbound PCM is fed through the
//! pipeline, outbound PCM and JSON control events come back on the same
//! socket. HTTP endpoints expose health and session inspection.

pub mod http;
pub mod session;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use session::{Session, SessionManager, SessionState};
pub use state::{AppState, ServiceSet};
pub use websocket::WebSocketHandler;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::WebSocket(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
