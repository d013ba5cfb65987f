//! Scripted service implementations
//!
//! Used by the test suites and by the server binary when no vendor services
//! are configured. Each stub counts the connections it opens and closes so
//! tests can assert that cancellation releases them exactly once.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use voicebridge_core::{
    AgentNotice, AgentService, ServiceError, SttService, SttStream, TranscriptResult, TtsInput,
    TtsService, TtsStream,
};

const STREAM_BUFFER: usize = 32;

/// Open/closed connection counters shared by the stub services.
#[derive(Debug, Default)]
pub struct StubStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl StubStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// STT stub replaying a scripted transcript sequence once audio arrives.
pub struct ScriptedStt {
    script: Vec<TranscriptResult>,
    stats: Arc<StubStats>,
}

impl ScriptedStt {
    pub fn new(script: Vec<TranscriptResult>) -> Self {
        Self {
            script,
            stats: Arc::new(StubStats::default()),
        }
    }

    /// Consumes audio and emits nothing.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub fn stats(&self) -> Arc<StubStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl SttService for ScriptedStt {
    async fn open_stream(&self) -> Result<SttStream, ServiceError> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(STREAM_BUFFER);
        let (results_tx, results_rx) = mpsc::channel(STREAM_BUFFER);
        let script = self.script.clone();
        let stats = self.stats.clone();
        stats.opened.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            // Replay the script after the first audio chunk, then drain the
            // push side until the caller closes it.
            if audio_rx.recv().await.is_some() {
                for result in script {
                    if results_tx.send(result).await.is_err() {
                        break;
                    }
                }
            }
            while audio_rx.recv().await.is_some() {}
            stats.closed.fetch_add(1, Ordering::SeqCst);
        });

        Ok(SttStream {
            audio_tx,
            results_rx,
        })
    }
}

/// STT stub whose connection always fails.
pub struct UnreachableStt;

#[async_trait]
impl SttService for UnreachableStt {
    async fn open_stream(&self) -> Result<SttStream, ServiceError> {
        Err(ServiceError::Connection(
            "stt endpoint unreachable".to_string(),
        ))
    }
}

/// Agent stub replaying one scripted notice sequence per submission.
pub struct ScriptedAgent {
    scripts: Mutex<VecDeque<Vec<AgentNotice>>>,
    submissions: Mutex<Vec<String>>,
    delay: Option<Duration>,
    stats: Arc<StubStats>,
}

impl ScriptedAgent {
    pub fn new(scripts: Vec<Vec<AgentNotice>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            submissions: Mutex::new(Vec::new()),
            delay: None,
            stats: Arc::new(StubStats::default()),
        }
    }

    /// Pause before each notice, to widen interleaving windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Texts submitted so far, in order.
    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().clone()
    }

    pub fn stats(&self) -> Arc<StubStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl AgentService for ScriptedAgent {
    async fn submit(
        &self,
        text: &str,
        _thread_id: &str,
    ) -> Result<mpsc::Receiver<AgentNotice>, ServiceError> {
        self.submissions.lock().push(text.to_string());
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let delay = self.delay;
        let stats = self.stats.clone();
        stats.opened.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            for notice in script {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(notice).await.is_err() {
                    break;
                }
            }
            stats.closed.fetch_add(1, Ordering::SeqCst);
        });

        Ok(rx)
    }
}

/// Agent stub that always fails to invoke.
pub struct UnreachableAgent;

#[async_trait]
impl AgentService for UnreachableAgent {
    async fn submit(
        &self,
        _text: &str,
        _thread_id: &str,
    ) -> Result<mpsc::Receiver<AgentNotice>, ServiceError> {
        Err(ServiceError::Invocation(
            "agent backend unreachable".to_string(),
        ))
    }
}

/// Agent stub echoing the user's text back, for loopback operation.
pub struct EchoAgent;

#[async_trait]
impl AgentService for EchoAgent {
    async fn submit(
        &self,
        text: &str,
        _thread_id: &str,
    ) -> Result<mpsc::Receiver<AgentNotice>, ServiceError> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let text = text.to_string();
        tokio::spawn(async move {
            let _ = tx.send(AgentNotice::Chunk("You said: ".to_string())).await;
            let _ = tx.send(AgentNotice::Chunk(text)).await;
        });
        Ok(rx)
    }
}

/// TTS stub synthesizing silence proportional to the flushed text length:
/// two PCM bytes (one LE i16 sample) per character.
pub struct EchoTts {
    stats: Arc<StubStats>,
}

impl EchoTts {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(StubStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<StubStats> {
        self.stats.clone()
    }
}

impl Default for EchoTts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtsService for EchoTts {
    async fn open_stream(&self) -> Result<TtsStream, ServiceError> {
        let (input_tx, mut input_rx) = mpsc::channel(STREAM_BUFFER);
        let (audio_tx, audio_rx) = mpsc::channel(STREAM_BUFFER);
        let stats = self.stats.clone();
        stats.opened.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let mut buffered = 0usize;
            while let Some(input) = input_rx.recv().await {
                match input {
                    TtsInput::Text(text) => buffered += text.chars().count(),
                    TtsInput::Flush => {
                        if buffered > 0 {
                            let chunk = vec![0u8; buffered * 2];
                            buffered = 0;
                            if audio_tx.send(chunk).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            stats.closed.fetch_add(1, Ordering::SeqCst);
        });

        Ok(TtsStream { input_tx, audio_rx })
    }
}

/// TTS stub whose connection always fails.
pub struct UnreachableTts;

#[async_trait]
impl TtsService for UnreachableTts {
    async fn open_stream(&self) -> Result<TtsStream, ServiceError> {
        Err(ServiceError::Connection(
            "tts endpoint unreachable".to_string(),
        ))
    }
}
