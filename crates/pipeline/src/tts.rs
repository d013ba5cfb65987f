//! TTS stage
//!
//! Forwards every event unchanged and interleaves synthesized speech derived
//! from the agent's reply text.

use std::sync::Arc;

use tokio::sync::mpsc;

use voicebridge_core::{with_retry, AudioFrame, Event, RetryPolicy, TtsInput, TtsService, TtsStream};

use crate::merger::StreamMerger;
use crate::stage::{EventReceiver, Stage};

/// Text-to-speech stage.
///
/// Reply text is pushed to the external TTS stream as it arrives, batched at
/// clause boundaries to keep time-to-first-audio low without synthesizing
/// word fragments. The turn boundary sends an explicit flush so buffered
/// text is synthesized rather than held. Synthesis failure degrades the turn
/// to text-only instead of failing the session.
pub struct TtsStage {
    service: Arc<dyn TtsService>,
    retry: RetryPolicy,
    sample_rate: u32,
    channels: u8,
    buffer: usize,
}

impl TtsStage {
    pub fn new(
        service: Arc<dyn TtsService>,
        retry: RetryPolicy,
        sample_rate: u32,
        channels: u8,
        buffer: usize,
    ) -> Self {
        Self {
            service,
            retry,
            sample_rate,
            channels,
            buffer,
        }
    }
}

impl Stage for TtsStage {
    fn name(&self) -> &'static str {
        "tts"
    }

    fn run(self: Box<Self>, mut input: EventReceiver) -> EventReceiver {
        let (merger, output) = StreamMerger::new(self.buffer);
        let mut pass = merger.source();
        let audio_source = merger.source();
        drop(merger);

        let service = self.service;
        let retry = self.retry;
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        tokio::spawn(async move {
            let stream = with_retry(&retry, "tts", || service.open_stream()).await;
            let (mut input_tx, audio_rx) = match stream {
                Ok(TtsStream { input_tx, audio_rx }) => (Some(input_tx), Some(audio_rx)),
                Err(error) => {
                    // Degraded: the user sees text but hears silence.
                    tracing::warn!(%error, "tts service unavailable after retries, turns will be silent");
                    (None, None)
                }
            };

            // Consumer side: synthesized PCM becomes outbound audio frames.
            let consumer = audio_rx.map(|mut audio_rx| {
                let mut source = audio_source;
                tokio::spawn(async move {
                    loop {
                        let chunk = tokio::select! {
                            chunk = audio_rx.recv() => chunk,
                            _ = source.closed() => break,
                        };
                        let Some(data) = chunk else { break };
                        let frame = AudioFrame::synthesized(data, sample_rate, channels);
                        if source.send(Event::Audio(frame)).await.is_err() {
                            break;
                        }
                    }
                })
            });

            // Driver: forward every event; owned text is pushed to the
            // service only after it has been forwarded.
            let mut clauses = ClauseBuffer::new();
            'driver: while let Some(item) = input.recv().await {
                match item {
                    Ok(Event::AgentChunk { text }) => {
                        if pass
                            .send(Event::AgentChunk { text: text.clone() })
                            .await
                            .is_err()
                        {
                            break;
                        }
                        for clause in clauses.push(&text) {
                            if !send_input(&mut input_tx, &pass, TtsInput::Text(clause)).await {
                                break 'driver;
                            }
                        }
                    }
                    Ok(Event::TurnEnd) => {
                        if pass.send(Event::TurnEnd).await.is_err() {
                            break;
                        }
                        if let Some(rest) = clauses.take_rest() {
                            if !send_input(&mut input_tx, &pass, TtsInput::Text(rest)).await {
                                break;
                            }
                        }
                        if !send_input(&mut input_tx, &pass, TtsInput::Flush).await {
                            break;
                        }
                    }
                    Ok(event) => {
                        if pass.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        pass.fail(error).await;
                        break;
                    }
                }
            }

            // Input exhausted: close the push side and let the consumer
            // drain whatever audio the service still has in flight.
            drop(input_tx);
            drop(pass);
            if let Some(handle) = consumer {
                let _ = handle.await;
            }
        });

        output
    }
}

/// Push one input to the service. A closed service stream degrades the turn
/// to text-only instead of failing the session; a closed merged stream stops
/// the driver (returns false).
async fn send_input(
    input_tx: &mut Option<mpsc::Sender<TtsInput>>,
    pass: &crate::merger::MergerSource,
    input: TtsInput,
) -> bool {
    let Some(tx) = input_tx else { return true };
    let pushed = tokio::select! {
        sent = tx.send(input) => sent.is_ok(),
        _ = pass.closed() => return false,
    };
    if !pushed {
        tracing::warn!("tts service closed its input stream, degrading turn to text only");
        *input_tx = None;
    }
    true
}

/// Accumulates reply text and releases it at clause boundaries, so the
/// service synthesizes prosodically complete fragments without waiting for
/// the turn to finish.
struct ClauseBuffer {
    pending: String,
}

impl ClauseBuffer {
    fn new() -> Self {
        Self {
            pending: String::new(),
        }
    }

    /// Add text; returns any complete clauses ready for synthesis.
    fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);
        let mut clauses = Vec::new();
        while let Some(idx) = self.pending.find(&['.', '!', '?', ';', '\n'][..]) {
            let end = idx + 1;
            let clause: String = self.pending.drain(..end).collect();
            if !clause.trim().is_empty() {
                clauses.push(clause);
            }
        }
        clauses
    }

    /// Take whatever is left at the turn boundary.
    fn take_rest(&mut self) -> Option<String> {
        if self.pending.trim().is_empty() {
            self.pending.clear();
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }
}
