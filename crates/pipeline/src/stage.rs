//! Stage abstraction
//!
//! A stage is a transform from one ordered event stream to another.

use tokio::sync::mpsc;

use voicebridge_core::Event;

use crate::PipelineError;

/// Item flowing between stages: an event, or a stage-fatal error.
pub type StageItem = Result<Event, PipelineError>;

/// Receiving end of a stage's ordered output stream.
pub type EventReceiver = mpsc::Receiver<StageItem>;

/// Sending end of an ordered event stream.
pub type EventSender = mpsc::Sender<StageItem>;

/// One pipeline stage.
///
/// Implementations forward every event they do not own unchanged and
/// interleave events derived from the ones they do own, fused through a
/// [`crate::StreamMerger`]. `run` spawns the stage's tasks and returns the
/// output stream immediately; the stage completes when its input ends and
/// its derived streams have drained.
pub trait Stage: Send + 'static {
    /// Stage name, for logs.
    fn name(&self) -> &'static str;

    /// Consume the input stream and produce the stage's output stream.
    fn run(self: Box<Self>, input: EventReceiver) -> EventReceiver;
}
