//! Core types for the voicebridge pipeline
//!
//! This crate provides the foundational types used across all other crates:
//! - The Event model flowing through the pipeline
//! - External service boundary traits (STT, agent, TTS)
//! - Service-level errors and retry policy

pub mod error;
pub mod event;
pub mod retry;
pub mod service;

pub use error::ServiceError;
pub use event::{AudioFrame, AudioOrigin, Event};
pub use retry::{with_retry, RetryPolicy};
pub use service::{
    AgentNotice, AgentService, SttService, SttStream, TranscriptResult, TtsInput, TtsService,
    TtsStream,
};
