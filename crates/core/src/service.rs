//! External service boundaries
//!
//! The STT, agent, and TTS collaborators are opaque: the pipeline only knows
//! these traits. Streaming services hand back a producer/consumer channel
//! pair so the push side and the pull side can run concurrently.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::ServiceError;

/// One STT hypothesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptResult {
    pub text: String,
    /// Final transcripts terminate an utterance; partials are superseded.
    pub is_final: bool,
}

impl TranscriptResult {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Handle pair for one STT connection.
///
/// Audio is pushed as it arrives; transcripts are pulled independently of the
/// push rate. Dropping `audio_tx` signals end of audio to the service; the
/// service closes `results_rx` once the remaining transcripts have drained.
pub struct SttStream {
    pub audio_tx: mpsc::Sender<Vec<u8>>,
    pub results_rx: mpsc::Receiver<TranscriptResult>,
}

/// Speech-to-text service: a push stream of PCM bytes in, an asynchronous
/// stream of transcript results out.
#[async_trait]
pub trait SttService: Send + Sync {
    async fn open_stream(&self) -> Result<SttStream, ServiceError>;
}

/// Item on an agent invocation's reply stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentNotice {
    /// Ordered fragment of the reply text.
    Chunk(String),
    /// The agent invoked a tool.
    ToolCall { name: String, arguments: Value },
    /// A tool returned a result to the agent.
    ToolResult { name: String, result: Value },
}

/// Conversational agent service.
///
/// `submit` starts one turn against the given conversation thread. The
/// returned channel carries the reply stream and closes when the turn ends;
/// the service has no explicit end-of-turn signal beyond that close.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn submit(
        &self,
        text: &str,
        thread_id: &str,
    ) -> Result<mpsc::Receiver<AgentNotice>, ServiceError>;
}

/// Input to a TTS stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtsInput {
    /// Text fragment to synthesize.
    Text(String),
    /// Synthesize anything still buffered rather than holding it.
    Flush,
}

/// Handle pair for one TTS connection, structurally the inverse of
/// [`SttStream`]: text in, PCM byte chunks out.
pub struct TtsStream {
    pub input_tx: mpsc::Sender<TtsInput>,
    pub audio_rx: mpsc::Receiver<Vec<u8>>,
}

/// Text-to-speech service: a push stream of text fragments plus an explicit
/// flush signal in, a stream of PCM byte chunks out.
#[async_trait]
pub trait TtsService: Send + Sync {
    async fn open_stream(&self) -> Result<TtsStream, ServiceError>;
}
