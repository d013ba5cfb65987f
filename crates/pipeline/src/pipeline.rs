//! Pipeline composition
//!
//! Strict left-to-right series composition: the output of one stage is the
//! input of the next.

use std::sync::Arc;

use tokio::sync::mpsc;

use voicebridge_core::{AgentService, RetryPolicy, SttService, TtsService};

use crate::agent::{AgentStage, TurnLedger};
use crate::stage::{EventReceiver, EventSender, Stage};
use crate::stt::SttStage;
use crate::tts::TtsStage;

/// Buffer sizes for the channels between stages.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Capacity of the pipeline input channel.
    pub input_buffer: usize,
    /// Capacity of each stage's merged output channel.
    pub stage_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_buffer: 64,
            stage_buffer: 64,
        }
    }
}

/// A series of stages composed into one stream transform.
pub struct Pipeline {
    config: PipelineConfig,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            stages: Vec::new(),
        }
    }

    /// Append a stage to the series.
    pub fn with_stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// The standard voice wiring: `TTS(Agent(STT(input)))`.
    #[allow(clippy::too_many_arguments)]
    pub fn voice(
        stt: Arc<dyn SttService>,
        agent: Arc<dyn AgentService>,
        tts: Arc<dyn TtsService>,
        ledger: Arc<TurnLedger>,
        retry: RetryPolicy,
        sample_rate: u32,
        channels: u8,
        config: PipelineConfig,
    ) -> Self {
        let buffer = config.stage_buffer;
        Pipeline::new(config)
            .with_stage(SttStage::new(stt, retry.clone(), buffer))
            .with_stage(AgentStage::new(agent, ledger, buffer))
            .with_stage(TtsStage::new(tts, retry, sample_rate, channels, buffer))
    }

    /// Spawn every stage and return the pipeline's endpoints.
    ///
    /// Dropping the sender drains the pipeline stage by stage; dropping the
    /// receiver cancels it and releases the stages' service connections.
    pub fn run(self) -> (EventSender, EventReceiver) {
        let (tx, mut rx) = mpsc::channel(self.config.input_buffer);
        for stage in self.stages {
            tracing::debug!(stage = stage.name(), "starting pipeline stage");
            rx = stage.run(rx);
        }
        (tx, rx)
    }
}
