//! Streaming pipeline orchestration
//!
//! This crate provides the core of voicebridge:
//! - Stream Merger fusing pass-through and derived event streams
//! - STT, Agent, and TTS stages as ordered stream transforms
//! - Strict series composition of stages into one pipeline
//! - Scripted stub services for tests and loopback operation

pub mod agent;
pub mod merger;
pub mod pipeline;
pub mod stage;
pub mod stt;
pub mod stubs;
pub mod tts;

pub use agent::{AgentStage, TurnLedger, FALLBACK_REPLY};
pub use merger::{MergerSource, StreamMerger};
pub use pipeline::{Pipeline, PipelineConfig};
pub use stage::{EventReceiver, EventSender, Stage, StageItem};
pub use stt::{SttStage, UNAVAILABLE_TRANSCRIPT};
pub use tts::TtsStage;

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("STT error: {0}")]
    Stt(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Cancelled")]
    Cancelled,

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
