//! Voicebridge transport layer
//!
//! The transport boundary multiplexes binary audio and JSON-encoded control
//! events over one bidirectional channel. This crate owns the framing; the
//! server crate owns the socket.

pub mod wire;

pub use wire::{decode_audio_frame, decode_text_frame, encode_event, error_frame, OutboundFrame, WireEvent};

use thiserror::Error;

/// Transport errors.
///
/// Protocol faults (malformed frames, unsupported formats) are rejected at
/// the transport boundary with an error frame; the connection stays open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

/// Negotiated session audio format: raw little-endian 16-bit signed PCM.
///
/// Fixed at connection start and invariant for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels (1 = mono).
    pub channels: u8,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_format_default() {
        let format = AudioFormat::default();
        assert_eq!(format.sample_rate, 16000);
        assert_eq!(format.channels, 1);
    }
}
