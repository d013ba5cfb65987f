//! Stream merger
//!
//! Fuses independently produced ordered event streams into one ordered
//! stream. Every stage uses a merger to combine its pass-through stream with
//! the events it derives from the input.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use voicebridge_core::Event;

use crate::stage::{EventReceiver, EventSender};
use crate::PipelineError;

/// Fan-in point for concurrently produced event streams.
///
/// All sources share one bounded channel: each source's sends stay in order,
/// interleaving across sources follows arrival at the channel, and a slow
/// source never blocks a ready one. The merged stream ends once every source
/// has been dropped. A source that fails propagates its error downstream and
/// flips a shared cancel signal so sibling sources stop promptly instead of
/// feeding a dead stream.
pub struct StreamMerger {
    tx: EventSender,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl StreamMerger {
    /// Create a merger and its merged output stream.
    pub fn new(buffer: usize) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::channel(buffer);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self {
                tx,
                cancel_tx: Arc::new(cancel_tx),
                cancel_rx,
            },
            rx,
        )
    }

    /// Hand out a source for a task that produces events in place.
    pub fn source(&self) -> MergerSource {
        MergerSource {
            tx: self.tx.clone(),
            cancel_tx: self.cancel_tx.clone(),
            cancel_rx: self.cancel_rx.clone(),
        }
    }

    /// Attach an already-produced stream as a source.
    ///
    /// Spawns a forwarder that relays the stream into the merged output,
    /// propagating a failure the same way an in-place source does.
    pub fn add_stream(&self, mut rx: EventReceiver) {
        let mut source = self.source();
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    item = rx.recv() => item,
                    _ = source.closed() => break,
                };
                match item {
                    Some(Ok(event)) => {
                        if source.send(event).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        source.fail(error).await;
                        break;
                    }
                    None => break,
                }
            }
        });
    }
}

/// One source feeding a [`StreamMerger`].
pub struct MergerSource {
    tx: EventSender,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl MergerSource {
    /// Send one event into the merged stream.
    ///
    /// Fails if the merged stream is gone or a sibling source has failed.
    pub async fn send(&mut self, event: Event) -> Result<(), PipelineError> {
        if *self.cancel_rx.borrow() {
            return Err(PipelineError::Cancelled);
        }
        tokio::select! {
            sent = self.tx.send(Ok(event)) => sent.map_err(|_| PipelineError::ChannelClosed),
            _ = self.cancel_rx.wait_for(|cancelled| *cancelled) => Err(PipelineError::Cancelled),
        }
    }

    /// Propagate a fatal error downstream and cancel sibling sources.
    pub async fn fail(&mut self, error: PipelineError) {
        let _ = self.tx.send(Err(error)).await;
        let _ = self.cancel_tx.send(true);
    }

    /// Resolves when the merged stream can no longer accept events, either
    /// because the consumer dropped it or a sibling source failed. Used to
    /// interrupt blocked external-service reads promptly on cancellation.
    pub async fn closed(&self) {
        let mut cancel_rx = self.cancel_rx.clone();
        tokio::select! {
            _ = self.tx.closed() => {}
            _ = cancel_rx.wait_for(|cancelled| *cancelled) => {}
        }
    }

    /// Has a sibling source failed?
    pub fn cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}
