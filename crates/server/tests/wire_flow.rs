//! Wire-level flow tests: pipeline output encoded exactly as the client
//! would see it on the socket.

use std::sync::Arc;

use voicebridge_core::{AgentNotice, AudioFrame, Event, RetryPolicy, TranscriptResult};
use voicebridge_pipeline::stubs::{EchoTts, ScriptedAgent, ScriptedStt};
use voicebridge_pipeline::{Pipeline, PipelineConfig, TurnLedger};
use voicebridge_transport::{decode_text_frame, encode_event, OutboundFrame, WireEvent};

fn inbound_audio(data: Vec<u8>) -> Event {
    Event::Audio(AudioFrame::captured(data, 16000, 1))
}

/// Simplified view of one outbound frame for sequence assertions.
#[derive(Debug, PartialEq)]
enum Frame {
    Text(&'static str),
    Audio(usize),
}

async fn run_to_wire(
    stt: Arc<ScriptedStt>,
    agent: Arc<ScriptedAgent>,
    frames: Vec<Event>,
) -> Vec<Frame> {
    let pipeline = Pipeline::voice(
        stt,
        agent,
        Arc::new(EchoTts::new()),
        Arc::new(TurnLedger::new()),
        RetryPolicy::default(),
        16000,
        1,
        PipelineConfig::default(),
    );
    let (tx, mut rx) = pipeline.run();

    for frame in frames {
        tx.send(Ok(frame)).await.unwrap();
    }
    drop(tx);

    let mut wire = Vec::new();
    while let Some(item) = rx.recv().await {
        let event = item.expect("pipeline error");
        match encode_event(&event).expect("encode error") {
            Some(OutboundFrame::Audio(data)) => wire.push(Frame::Audio(data.len())),
            Some(OutboundFrame::Text(json)) => {
                let kind = match decode_text_frame(&json).expect("self-decode") {
                    WireEvent::SttPartial { .. } => "stt_partial",
                    WireEvent::SttOutput { .. } => "stt_output",
                    WireEvent::AgentChunk { .. } => "agent_chunk",
                    WireEvent::ToolCall { .. } => "tool_call",
                    WireEvent::ToolResult { .. } => "tool_result",
                    WireEvent::AgentEnd => "agent_end",
                    WireEvent::Error { .. } => "error",
                };
                wire.push(Frame::Text(kind));
            }
            // Captured audio is never echoed back to the client.
            None => {}
        }
    }
    wire
}

#[tokio::test]
async fn test_sandwich_order_wire_sequence() {
    let stt = Arc::new(ScriptedStt::new(vec![TranscriptResult::final_(
        "order a sandwich",
    )]));
    let agent = Arc::new(ScriptedAgent::new(vec![vec![
        AgentNotice::Chunk("Sure, ".to_string()),
        AgentNotice::Chunk("one sandwich coming up.".to_string()),
        AgentNotice::ToolCall {
            name: "add_to_order".to_string(),
            arguments: serde_json::json!({"item": "sandwich", "qty": 1}),
        },
        AgentNotice::ToolResult {
            name: "add_to_order".to_string(),
            result: serde_json::json!({"ok": true}),
        },
    ]]));

    let frames = (0..4).map(|_| inbound_audio(vec![0u8; 320])).collect();
    let wire = run_to_wire(stt, agent, frames).await;

    let reply_bytes = "Sure, one sandwich coming up.".chars().count() * 2;
    assert_eq!(
        wire,
        vec![
            Frame::Text("stt_output"),
            Frame::Text("agent_chunk"),
            Frame::Text("agent_chunk"),
            Frame::Text("tool_call"),
            Frame::Text("tool_result"),
            Frame::Text("agent_end"),
            Frame::Audio(reply_bytes),
        ]
    );
}

#[tokio::test]
async fn test_partials_precede_final_on_wire() {
    let stt = Arc::new(ScriptedStt::new(vec![
        TranscriptResult::partial("order"),
        TranscriptResult::partial("order a sand"),
        TranscriptResult::final_("order a sandwich"),
    ]));
    let agent = Arc::new(ScriptedAgent::new(vec![vec![AgentNotice::Chunk(
        "Done.".to_string(),
    )]]));

    let wire = run_to_wire(stt, agent, vec![inbound_audio(vec![0u8; 320])]).await;

    let texts: Vec<&Frame> = wire
        .iter()
        .filter(|frame| matches!(frame, Frame::Text(_)))
        .collect();
    assert_eq!(
        texts,
        vec![
            &Frame::Text("stt_partial"),
            &Frame::Text("stt_partial"),
            &Frame::Text("stt_output"),
            &Frame::Text("agent_chunk"),
            &Frame::Text("agent_end"),
        ]
    );
}

#[tokio::test]
async fn test_two_turns_each_get_a_boundary_on_wire() {
    let stt = Arc::new(ScriptedStt::new(vec![
        TranscriptResult::final_("first"),
        TranscriptResult::final_("second"),
    ]));
    let agent = Arc::new(ScriptedAgent::new(vec![
        vec![AgentNotice::Chunk("one.".to_string())],
        vec![AgentNotice::Chunk("two.".to_string())],
    ]));

    let wire = run_to_wire(stt, agent, vec![inbound_audio(vec![0u8; 320])]).await;

    let boundaries = wire
        .iter()
        .filter(|frame| **frame == Frame::Text("agent_end"))
        .count();
    assert_eq!(boundaries, 2);
}
