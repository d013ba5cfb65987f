//! WebSocket handler
//!
//! The transport adapter boundary: one bidirectional connection per session,
//! multiplexing binary PCM and JSON control events.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use voicebridge_core::{Event, RetryPolicy};
use voicebridge_pipeline::{Pipeline, PipelineConfig};
use voicebridge_transport::{
    decode_audio_frame, decode_text_frame, encode_event, error_frame, AudioFormat, OutboundFrame,
};

use crate::session::{Session, SessionState};
use crate::state::AppState;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// WebSocket handler
pub struct WebSocketHandler;

impl WebSocketHandler {
    /// Handle WebSocket upgrade. The session is created on connect and
    /// destroyed on disconnect; reconnecting is the client's problem.
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
    ) -> Result<Response, axum::http::StatusCode> {
        let session = match state.sessions.create() {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!(%error, "refusing connection");
                return Err(axum::http::StatusCode::SERVICE_UNAVAILABLE);
            }
        };

        Ok(ws.on_upgrade(move |socket| Self::handle_socket(socket, session, state)))
    }

    /// Drive one connection from Connecting to Closed.
    async fn handle_socket(socket: WebSocket, session: Arc<Session>, state: AppState) {
        let config = state.config.clone();
        let format = AudioFormat {
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels,
        };
        let retry = RetryPolicy {
            max_attempts: config.services.max_attempts,
            initial_backoff: Duration::from_millis(config.services.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.services.max_backoff_ms),
        };
        let pipeline_config = PipelineConfig {
            input_buffer: config.pipeline.input_buffer,
            stage_buffer: config.pipeline.stage_buffer,
        };

        let pipeline = Pipeline::voice(
            state.services.stt.clone(),
            state.services.agent.clone(),
            state.services.tts.clone(),
            session.ledger(),
            retry,
            format.sample_rate,
            format.channels,
            pipeline_config,
        );
        let (input_tx, mut output_rx) = pipeline.run();

        session.activate();
        tracing::info!(session_id = %session.id, sample_rate = format.sample_rate, "session active");

        let (sender, mut receiver) = socket.split();
        let sender: WsSender = Arc::new(Mutex::new(sender));

        // Outbound: pipeline events become wire frames. Runs until the
        // pipeline output ends (drain complete) or the session fails.
        let outbound_session = session.clone();
        let outbound_sender = sender.clone();
        let mut outbound = tokio::spawn(async move {
            while let Some(item) = output_rx.recv().await {
                match item {
                    Ok(event) => {
                        if outbound_session.state() == SessionState::Closed {
                            break;
                        }
                        match encode_event(&event) {
                            Ok(Some(OutboundFrame::Audio(data))) => {
                                let mut s = outbound_sender.lock().await;
                                if s.send(Message::Binary(data)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Some(OutboundFrame::Text(json))) => {
                                let mut s = outbound_sender.lock().await;
                                if s.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(error) => {
                                tracing::error!(%error, "failed to encode outbound event");
                            }
                        }
                    }
                    Err(error) => {
                        // Invariant violations are fatal: tear the session
                        // down rather than continue with corrupted state.
                        tracing::error!(
                            session_id = %outbound_session.id,
                            %error,
                            "pipeline failure, closing session"
                        );
                        let mut s = outbound_sender.lock().await;
                        let _ = s.send(Message::Text(error_frame(&error.to_string()))).await;
                        break;
                    }
                }
            }
        });

        // Inbound: wire frames feed the pipeline until disconnect intent or
        // idle timeout begins the drain.
        let idle_timeout = Duration::from_secs(config.session.idle_timeout_secs);
        loop {
            let deadline = tokio::time::Instant::from_std(session.last_audio() + idle_timeout);
            let message = tokio::select! {
                message = receiver.next() => message,
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!(session_id = %session.id, "idle timeout, draining session");
                    break;
                }
            };

            match message {
                Some(Ok(Message::Binary(data))) => {
                    if session.state() != SessionState::Active {
                        continue;
                    }
                    match decode_audio_frame(data, &format) {
                        Ok(frame) => {
                            session.touch();
                            if input_tx.send(Ok(Event::Audio(frame))).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            // Protocol fault: reject the frame, keep the
                            // connection open.
                            tracing::warn!(session_id = %session.id, %error, "rejected inbound frame");
                            let mut s = sender.lock().await;
                            let _ = s
                                .send(Message::Text(error_frame(&error.to_string())))
                                .await;
                        }
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    // No inbound control events are defined; well-formed
                    // frames are ignored, malformed ones are protocol faults.
                    if let Err(error) = decode_text_frame(&text) {
                        tracing::warn!(session_id = %session.id, %error, "rejected inbound frame");
                        let mut s = sender.lock().await;
                        let _ = s
                            .send(Message::Text(error_frame(&error.to_string())))
                            .await;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let mut s = sender.lock().await;
                    let _ = s.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(error)) => {
                    tracing::warn!(session_id = %session.id, %error, "websocket error");
                    break;
                }
            }
        }

        // Draining: no new inbound audio; closing the pipeline input lets
        // the in-flight turn complete and flush stage by stage.
        session.begin_drain();
        drop(input_tx);

        let drain_timeout = Duration::from_secs(config.session.drain_timeout_secs);
        if tokio::time::timeout(drain_timeout, &mut outbound)
            .await
            .is_err()
        {
            tracing::warn!(session_id = %session.id, "drain timeout exceeded, aborting outbound");
            outbound.abort();
        }

        // Closed: dropping the pipeline endpoints released every stage's
        // service connection; the registry entry goes with them.
        session.close();
        state.sessions.remove(&session.id);
    }
}
