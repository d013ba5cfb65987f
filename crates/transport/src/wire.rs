//! Wire framing
//!
//! Binary frames carry raw PCM with no header; text frames carry UTF-8 JSON
//! objects with a `type` discriminator matching the pipeline event variants.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use voicebridge_core::{AudioFrame, AudioOrigin, Event};

use crate::{AudioFormat, TransportError};

/// Largest accepted inbound binary frame. Oversized frames are protocol
/// faults, not audio.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// JSON text frame, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// Non-final STT hypothesis.
    SttPartial { transcript: String },
    /// Final transcript for one utterance.
    SttOutput { transcript: String },
    /// Fragment of the agent's reply.
    AgentChunk { text: String },
    /// Tool invocation notice.
    ToolCall { tool: String, args: Value },
    /// Tool result notice.
    ToolResult { tool: String, result: Value },
    /// End of one agent reply.
    AgentEnd,
    /// Protocol fault or degraded-session notice.
    Error { message: String },
}

/// One outbound frame: binary PCM or a JSON text payload.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Audio(Vec<u8>),
    Text(String),
}

/// Encode one pipeline event for the wire.
///
/// Synthesized audio becomes a binary frame; captured audio has already
/// served its purpose upstream and is not echoed back, so it encodes to
/// `None`. Every other event becomes a tagged JSON text frame.
pub fn encode_event(event: &Event) -> Result<Option<OutboundFrame>, TransportError> {
    let wire = match event {
        Event::Audio(frame) => {
            return match frame.origin {
                AudioOrigin::Synthesis => Ok(Some(OutboundFrame::Audio(frame.data.clone()))),
                AudioOrigin::Capture => Ok(None),
            };
        }
        Event::PartialTranscript { text } => WireEvent::SttPartial {
            transcript: text.clone(),
        },
        Event::FinalTranscript { text } => WireEvent::SttOutput {
            transcript: text.clone(),
        },
        Event::AgentChunk { text } => WireEvent::AgentChunk { text: text.clone() },
        Event::ToolCall { name, arguments } => WireEvent::ToolCall {
            tool: name.clone(),
            args: arguments.clone(),
        },
        Event::ToolResult { name, result } => WireEvent::ToolResult {
            tool: name.clone(),
            result: result.clone(),
        },
        Event::TurnEnd => WireEvent::AgentEnd,
    };
    let json =
        serde_json::to_string(&wire).map_err(|e| TransportError::Serialization(e.to_string()))?;
    Ok(Some(OutboundFrame::Text(json)))
}

/// Decode one inbound binary frame into a captured audio frame.
///
/// The wire format is headerless LE i16 PCM, so validation is structural:
/// the frame must be non-empty, hold whole samples for the negotiated
/// channel count, and stay under the frame size cap.
pub fn decode_audio_frame(data: Vec<u8>, format: &AudioFormat) -> Result<AudioFrame, TransportError> {
    if data.is_empty() {
        return Err(TransportError::MalformedFrame("empty audio frame".to_string()));
    }
    if data.len() > MAX_FRAME_BYTES {
        return Err(TransportError::MalformedFrame(format!(
            "audio frame of {} bytes exceeds the {} byte limit",
            data.len(),
            MAX_FRAME_BYTES
        )));
    }
    let sample_bytes = 2 * format.channels.max(1) as usize;
    if data.len() % sample_bytes != 0 {
        return Err(TransportError::MalformedFrame(format!(
            "{} bytes is not a whole number of {}-byte samples",
            data.len(),
            sample_bytes
        )));
    }
    Ok(AudioFrame::captured(
        data,
        format.sample_rate,
        format.channels,
    ))
}

/// Decode one inbound text frame.
pub fn decode_text_frame(text: &str) -> Result<WireEvent, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::MalformedFrame(e.to_string()))
}

/// Serialized error frame for protocol faults; the connection stays open.
pub fn error_frame(message: &str) -> String {
    serde_json::to_string(&WireEvent::Error {
        message: message.to_string(),
    })
    .unwrap_or_else(|_| r#"{"type":"error","message":"internal error"}"#.to_string())
}
