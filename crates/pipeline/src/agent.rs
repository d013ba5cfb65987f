//! Agent stage
//!
//! Triggers one agent invocation per final transcript, strictly serialized
//! per conversation thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use voicebridge_core::{AgentNotice, AgentService, Event};

use crate::merger::{MergerSource, StreamMerger};
use crate::stage::{EventReceiver, Stage};
use crate::PipelineError;

/// Fallback reply for a turn whose invocation failed.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I ran into a problem answering that. Could you say it again?";

/// Conversational state for one session's agent thread.
///
/// Owned by the session, not the pipeline: queued turns survive a pipeline
/// restart as long as the session persists. Mutated only under the agent
/// stage's single-in-flight discipline.
pub struct TurnLedger {
    thread_id: String,
    pending: Mutex<VecDeque<String>>,
    pending_notify: Notify,
    in_flight: AtomicBool,
    turns_started: AtomicU64,
    turns_completed: AtomicU64,
}

impl TurnLedger {
    pub fn new() -> Self {
        Self {
            thread_id: Uuid::new_v4().to_string(),
            pending: Mutex::new(VecDeque::new()),
            pending_notify: Notify::new(),
            in_flight: AtomicBool::new(false),
            turns_started: AtomicU64::new(0),
            turns_completed: AtomicU64::new(0),
        }
    }

    /// Conversation thread identifier passed to the agent service.
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Queue one user turn for dispatch.
    pub fn enqueue(&self, text: String) {
        self.pending.lock().push_back(text);
        self.pending_notify.notify_one();
    }

    fn take_next(&self) -> Option<String> {
        self.pending.lock().pop_front()
    }

    async fn wait_pending(&self) {
        self.pending_notify.notified().await;
    }

    /// Number of queued-but-undispatched turns.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop all queued-but-undispatched turns; returns how many were dropped.
    /// Called by the session when it begins draining.
    pub fn drain_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    fn begin_turn(&self) -> Result<u64, PipelineError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::InvariantViolation(
                "concurrent agent invocation on one conversation thread".to_string(),
            ));
        }
        Ok(self.turns_started.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn end_turn(&self) {
        self.turns_completed.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
    }

    pub fn turns_started(&self) -> u64 {
        self.turns_started.load(Ordering::SeqCst)
    }

    pub fn turns_completed(&self) -> u64 {
        self.turns_completed.load(Ordering::SeqCst)
    }
}

impl Default for TurnLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Conversational agent stage.
///
/// All input is forwarded; a final transcript is handed to the invocation
/// worker, which forwards it and then streams the derived reply events.
/// A second transcript arriving mid-invocation waits in the ledger queue,
/// so invocations never interleave on one thread.
pub struct AgentStage {
    service: Arc<dyn AgentService>,
    ledger: Arc<TurnLedger>,
    buffer: usize,
}

impl AgentStage {
    pub fn new(service: Arc<dyn AgentService>, ledger: Arc<TurnLedger>, buffer: usize) -> Self {
        Self {
            service,
            ledger,
            buffer,
        }
    }
}

impl Stage for AgentStage {
    fn name(&self) -> &'static str {
        "agent"
    }

    fn run(self: Box<Self>, mut input: EventReceiver) -> EventReceiver {
        let (merger, output) = StreamMerger::new(self.buffer);
        let mut pass = merger.source();
        let turn_source = merger.source();
        drop(merger);

        let service = self.service;
        let ledger = self.ledger;
        let (done_tx, done_rx) = watch::channel(false);

        // Invocation worker: one turn at a time; queued turns dispatch in
        // order once the in-flight invocation completes. After the input
        // ends it finishes whatever is still queued, then exits.
        let worker_ledger = ledger.clone();
        tokio::spawn(async move {
            let mut source = turn_source;
            let mut done_rx = done_rx;
            loop {
                match worker_ledger.take_next() {
                    Some(text) => {
                        if run_turn(service.as_ref(), &worker_ledger, &mut source, text)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    None => {
                        if *done_rx.borrow() {
                            break;
                        }
                        tokio::select! {
                            _ = worker_ledger.wait_pending() => {}
                            changed = done_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                            _ = source.closed() => break,
                        }
                    }
                }
            }
        });

        // Driver: forward everything except the trigger, which goes through
        // the worker so it is observed before the events derived from it.
        tokio::spawn(async move {
            while let Some(item) = input.recv().await {
                match item {
                    Ok(Event::FinalTranscript { text }) => ledger.enqueue(text),
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
            let _ = done_tx.send(true);
        });

        output
    }
}

/// Run one turn: forward the triggering transcript, stream the reply, and
/// close with an explicit turn boundary.
async fn run_turn(
    service: &dyn AgentService,
    ledger: &TurnLedger,
    source: &mut MergerSource,
    text: String,
) -> Result<(), PipelineError> {
    let turn = match ledger.begin_turn() {
        Ok(turn) => turn,
        Err(error) => {
            source.fail(error.clone()).await;
            return Err(error);
        }
    };

    source
        .send(Event::FinalTranscript { text: text.clone() })
        .await?;

    match service.submit(&text, ledger.thread_id()).await {
        Ok(mut notices) => loop {
            let notice = tokio::select! {
                notice = notices.recv() => notice,
                _ = source.closed() => return Err(PipelineError::ChannelClosed),
            };
            let Some(notice) = notice else { break };
            let event = match notice {
                AgentNotice::Chunk(text) => Event::AgentChunk { text },
                AgentNotice::ToolCall { name, arguments } => Event::ToolCall { name, arguments },
                AgentNotice::ToolResult { name, result } => Event::ToolResult { name, result },
            };
            source.send(event).await?;
        },
        Err(error) => {
            // The pipeline must not stall waiting for a turn that will
            // never arrive: degrade to a fallback reply plus turn boundary.
            tracing::warn!(turn, %error, "agent invocation failed, sending fallback reply");
            source
                .send(Event::AgentChunk {
                    text: FALLBACK_REPLY.to_string(),
                })
                .await?;
        }
    }

    // The service ends a turn implicitly by closing its stream; downstream
    // stages get an explicit boundary.
    source.send(Event::TurnEnd).await?;
    ledger.end_turn();
    Ok(())
}
