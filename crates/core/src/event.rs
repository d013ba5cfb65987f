//! Event model
//!
//! The unit of information flowing through the pipeline: either a chunk of
//! raw audio or a tagged structured message.

use serde_json::Value;

/// Which end of the pipeline produced an audio frame.
///
/// Captured frames enter through the transport adapter and exist to feed the
/// STT stage; synthesized frames are produced by the TTS stage and are the
/// only audio sent back out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOrigin {
    /// Inbound user speech from the transport adapter.
    Capture,
    /// Outbound speech synthesized by the TTS stage.
    Synthesis,
}

/// Raw PCM audio, little-endian signed 16-bit, immutable once created.
///
/// Produced only by the transport adapter (inbound) or the TTS stage
/// (outbound). Sample rate and channel count are fixed for the lifetime of a
/// session once negotiated at connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Interleaved LE i16 samples.
    pub data: Vec<u8>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels (1 = mono).
    pub channels: u8,
    /// Producer of this frame.
    pub origin: AudioOrigin,
}

impl AudioFrame {
    /// Frame captured from the client connection.
    pub fn captured(data: Vec<u8>, sample_rate: u32, channels: u8) -> Self {
        Self {
            data,
            sample_rate,
            channels,
            origin: AudioOrigin::Capture,
        }
    }

    /// Frame synthesized by the TTS stage.
    pub fn synthesized(data: Vec<u8>, sample_rate: u32, channels: u8) -> Self {
        Self {
            data,
            sample_rate,
            channels,
            origin: AudioOrigin::Synthesis,
        }
    }

    /// Number of samples per channel.
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2 / self.channels.max(1) as usize
    }

    /// Frame duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.sample_count() as u64 * 1000) / self.sample_rate as u64
    }
}

/// One event on the pipeline stream.
///
/// A closed sum type: every stage matches on the variant to decide between
/// forwarding the event unchanged and deriving new events from it.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Audio chunk (inbound user speech or outbound synthesized speech).
    Audio(AudioFrame),
    /// Non-final STT hypothesis; superseded by later transcripts.
    PartialTranscript { text: String },
    /// Terminates one user utterance; triggers the agent stage.
    FinalTranscript { text: String },
    /// Ordered fragment of the agent's reply for the current turn.
    AgentChunk { text: String },
    /// Tool invocation notice, informational for the client.
    ToolCall { name: String, arguments: Value },
    /// Tool result notice, informational for the client.
    ToolResult { name: String, result: Value },
    /// End of one agent reply; exactly one per turn, after the last chunk.
    TurnEnd,
}

impl Event {
    /// Short variant name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Audio(_) => "audio",
            Event::PartialTranscript { .. } => "partial_transcript",
            Event::FinalTranscript { .. } => "final_transcript",
            Event::AgentChunk { .. } => "agent_chunk",
            Event::ToolCall { .. } => "tool_call",
            Event::ToolResult { .. } => "tool_result",
            Event::TurnEnd => "turn_end",
        }
    }

    /// Is this an audio chunk?
    pub fn is_audio(&self) -> bool {
        matches!(self, Event::Audio(_))
    }
}
