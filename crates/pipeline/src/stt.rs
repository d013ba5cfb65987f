//! STT stage
//!
//! Forwards every audio frame unchanged and interleaves the transcripts the
//! external STT service derives from them.

use std::sync::Arc;

use voicebridge_core::{with_retry, Event, RetryPolicy, SttService, SttStream};

use crate::merger::StreamMerger;
use crate::stage::{EventReceiver, Stage};

/// Degraded transcript emitted when the STT service cannot be reached.
pub const UNAVAILABLE_TRANSCRIPT: &str = "[transcription unavailable]";

/// Speech-to-text stage.
///
/// The service connection is a producer/consumer pair run concurrently:
/// audio is pushed as it arrives, transcripts are pulled independently of
/// the push rate. A connection that cannot be established within the retry
/// policy degrades the stage instead of failing the session.
pub struct SttStage {
    service: Arc<dyn SttService>,
    retry: RetryPolicy,
    buffer: usize,
}

impl SttStage {
    pub fn new(service: Arc<dyn SttService>, retry: RetryPolicy, buffer: usize) -> Self {
        Self {
            service,
            retry,
            buffer,
        }
    }
}

impl Stage for SttStage {
    fn name(&self) -> &'static str {
        "stt"
    }

    fn run(self: Box<Self>, mut input: EventReceiver) -> EventReceiver {
        let (merger, output) = StreamMerger::new(self.buffer);
        let mut pass = merger.source();
        let mut transcripts = merger.source();
        drop(merger);

        let service = self.service;
        let retry = self.retry;

        tokio::spawn(async move {
            let stream = with_retry(&retry, "stt", || service.open_stream()).await;
            let (mut audio_tx, results_rx) = match stream {
                Ok(SttStream {
                    audio_tx,
                    results_rx,
                }) => (Some(audio_tx), Some(results_rx)),
                Err(error) => {
                    // Recoverable external-dependency fault: the session
                    // continues, the user gets a degraded transcript.
                    tracing::warn!(%error, "stt service unavailable after retries, degrading");
                    if transcripts
                        .send(Event::FinalTranscript {
                            text: UNAVAILABLE_TRANSCRIPT.to_string(),
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    (None, None)
                }
            };

            // Consumer side: transcripts arrive asynchronously relative to
            // the audio push rate and keep draining after the input ends.
            let consumer = results_rx.map(|mut results_rx| {
                tokio::spawn(async move {
                    loop {
                        let result = tokio::select! {
                            result = results_rx.recv() => result,
                            _ = transcripts.closed() => break,
                        };
                        let Some(result) = result else { break };
                        let event = if result.is_final {
                            Event::FinalTranscript { text: result.text }
                        } else {
                            Event::PartialTranscript { text: result.text }
                        };
                        if transcripts.send(event).await.is_err() {
                            break;
                        }
                    }
                })
            });

            // Producer side: forward every event; owned audio is pushed to
            // the service only after it has been forwarded.
            while let Some(item) = input.recv().await {
                match item {
                    Ok(Event::Audio(frame)) => {
                        let data = frame.data.clone();
                        if pass.send(Event::Audio(frame)).await.is_err() {
                            break;
                        }
                        if let Some(tx) = &audio_tx {
                            // Interruptible push: cancellation must not sit
                            // behind a stalled service write.
                            let pushed = tokio::select! {
                                sent = tx.send(data) => sent.is_ok(),
                                _ = pass.closed() => break,
                            };
                            if !pushed {
                                tracing::warn!("stt service closed its audio stream mid-session");
                                audio_tx = None;
                            }
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

            // Input exhausted: closing the push side signals completion to
            // the service; the consumer drains the remaining transcripts
            // before the stage completes.
            drop(audio_tx);
            drop(pass);
            if let Some(handle) = consumer {
                let _ = handle.await;
            }
        });

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::{ScriptedStt, UnreachableStt};
    use tokio::sync::mpsc;
    use voicebridge_core::{AudioFrame, TranscriptResult};

    fn frame(seq: u8) -> Event {
        Event::Audio(AudioFrame::captured(vec![seq, 0], 16000, 1))
    }

    async fn collect(mut rx: EventReceiver) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(item) = rx.recv().await {
            events.push(item.expect("stage error"));
        }
        events
    }

    #[tokio::test]
    async fn test_audio_passes_through_in_order() {
        let stage = SttStage::new(
            Arc::new(ScriptedStt::silent()),
            RetryPolicy::default(),
            16,
        );
        let (tx, rx) = mpsc::channel(16);
        let out = Box::new(stage).run(rx);

        for seq in 0..10u8 {
            tx.send(Ok(frame(seq))).await.unwrap();
        }
        drop(tx);

        let events = collect(out).await;
        let frames: Vec<u8> = events
            .iter()
            .filter_map(|event| match event {
                Event::Audio(frame) => Some(frame.data[0]),
                _ => None,
            })
            .collect();
        assert_eq!(frames, (0..10).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn test_transcripts_interleave_and_drain() {
        let stage = SttStage::new(
            Arc::new(ScriptedStt::new(vec![
                TranscriptResult::partial("order a"),
                TranscriptResult::final_("order a sandwich"),
            ])),
            RetryPolicy::default(),
            16,
        );
        let (tx, rx) = mpsc::channel(16);
        let out = Box::new(stage).run(rx);

        tx.send(Ok(frame(1))).await.unwrap();
        drop(tx);

        let events = collect(out).await;
        let transcripts: Vec<&Event> = events
            .iter()
            .filter(|event| !event.is_audio())
            .collect();
        assert_eq!(
            transcripts,
            vec![
                &Event::PartialTranscript {
                    text: "order a".to_string()
                },
                &Event::FinalTranscript {
                    text: "order a sandwich".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_degrades_not_fails() {
        let retry = RetryPolicy {
            max_attempts: 2,
            initial_backoff: std::time::Duration::from_millis(1),
            max_backoff: std::time::Duration::from_millis(1),
        };
        let stage = SttStage::new(Arc::new(UnreachableStt), retry, 16);
        let (tx, rx) = mpsc::channel(16);
        let out = Box::new(stage).run(rx);

        tx.send(Ok(frame(1))).await.unwrap();
        drop(tx);

        let events = collect(out).await;
        assert!(events.contains(&Event::FinalTranscript {
            text: UNAVAILABLE_TRANSCRIPT.to_string()
        }));
        // Audio still passes through in degraded mode.
        assert!(events.iter().any(Event::is_audio));
    }
}
