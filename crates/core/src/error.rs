//! Service boundary errors

use thiserror::Error;

/// Errors crossing an external-service boundary.
///
/// These are always treated as recoverable by the owning stage: retried with
/// bounded backoff and surfaced as degraded output, never as a session crash.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Stream closed by service")]
    StreamClosed,

    #[error("Invocation failed: {0}")]
    Invocation(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}
