//! End-to-end pipeline tests with scripted services.

use std::sync::Arc;
use std::time::Duration;

use voicebridge_core::{
    AgentNotice, AudioFrame, AudioOrigin, Event, RetryPolicy, TranscriptResult,
};
use voicebridge_pipeline::stubs::{EchoTts, ScriptedAgent, ScriptedStt, UnreachableTts};
use voicebridge_pipeline::{EventReceiver, Pipeline, PipelineConfig, TurnLedger};

fn audio(seq: u8) -> Event {
    Event::Audio(AudioFrame::captured(vec![seq, 0, seq, 0], 16000, 1))
}

async fn collect(mut rx: EventReceiver) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(item) = rx.recv().await {
        events.push(item.expect("pipeline error"));
    }
    events
}

fn voice_pipeline(
    stt: Arc<ScriptedStt>,
    agent: Arc<ScriptedAgent>,
    tts: Arc<EchoTts>,
    ledger: Arc<TurnLedger>,
) -> Pipeline {
    Pipeline::voice(
        stt,
        agent,
        tts,
        ledger,
        RetryPolicy::default(),
        16000,
        1,
        PipelineConfig::default(),
    )
}

#[tokio::test]
async fn test_sandwich_order_scenario() {
    let stt = Arc::new(ScriptedStt::new(vec![TranscriptResult::final_(
        "order a sandwich",
    )]));
    let agent = Arc::new(ScriptedAgent::new(vec![vec![
        AgentNotice::Chunk("Sure, ".to_string()),
        AgentNotice::Chunk("one sandwich coming up.".to_string()),
        AgentNotice::ToolCall {
            name: "add_to_order".to_string(),
            arguments: serde_json::json!({"item": "sandwich"}),
        },
        AgentNotice::ToolResult {
            name: "add_to_order".to_string(),
            result: serde_json::json!({"ok": true}),
        },
    ]]));
    let tts = Arc::new(EchoTts::new());

    let pipeline = voice_pipeline(stt, agent, tts, Arc::new(TurnLedger::new()));
    let (tx, rx) = pipeline.run();

    for seq in 0..4u8 {
        tx.send(Ok(audio(seq))).await.unwrap();
    }
    drop(tx);

    let events = collect(rx).await;

    // Control events in strict order.
    let control: Vec<&'static str> = events
        .iter()
        .filter(|event| !event.is_audio())
        .map(Event::kind)
        .collect();
    assert_eq!(
        control,
        vec![
            "final_transcript",
            "agent_chunk",
            "agent_chunk",
            "tool_call",
            "tool_result",
            "turn_end"
        ]
    );

    // Captured audio passes through unchanged and in order.
    let captured: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            Event::Audio(frame) if frame.origin == AudioOrigin::Capture => Some(frame.data[0]),
            _ => None,
        })
        .collect();
    assert_eq!(captured, vec![0, 1, 2, 3]);

    // Synthesized audio follows the turn boundary and echoes the reply
    // length (two bytes per character in the stub).
    let turn_end_at = events
        .iter()
        .position(|event| matches!(event, Event::TurnEnd))
        .unwrap();
    let synthesized: Vec<(usize, usize)> = events
        .iter()
        .enumerate()
        .filter_map(|(at, event)| match event {
            Event::Audio(frame) if frame.origin == AudioOrigin::Synthesis => {
                Some((at, frame.data.len()))
            }
            _ => None,
        })
        .collect();
    let reply_chars = "Sure, one sandwich coming up.".chars().count();
    assert_eq!(
        synthesized.iter().map(|(_, len)| len).sum::<usize>(),
        reply_chars * 2
    );
    assert!(synthesized.iter().all(|(at, _)| *at > turn_end_at));
}

#[tokio::test]
async fn test_turn_end_count_matches_final_transcripts() {
    let stt = Arc::new(ScriptedStt::new(vec![
        TranscriptResult::partial("first"),
        TranscriptResult::final_("first utterance"),
        TranscriptResult::final_("second utterance"),
        TranscriptResult::final_("third utterance"),
    ]));
    let agent = Arc::new(ScriptedAgent::new(vec![
        vec![AgentNotice::Chunk("one".to_string())],
        vec![AgentNotice::Chunk("two".to_string())],
        vec![AgentNotice::Chunk("three".to_string())],
    ]));
    let tts = Arc::new(EchoTts::new());
    let ledger = Arc::new(TurnLedger::new());

    let pipeline = voice_pipeline(stt, agent, tts, ledger.clone());
    let (tx, rx) = pipeline.run();
    tx.send(Ok(audio(0))).await.unwrap();
    drop(tx);

    let events = collect(rx).await;
    let transcripts = events
        .iter()
        .filter(|event| matches!(event, Event::FinalTranscript { .. }))
        .count();
    let turn_ends = events
        .iter()
        .filter(|event| matches!(event, Event::TurnEnd))
        .count();
    assert_eq!(transcripts, 3);
    assert_eq!(turn_ends, 3);
    assert_eq!(ledger.turns_completed(), 3);
}

#[tokio::test]
async fn test_no_turn_dropped_under_synthesis_failure() {
    // The TTS connection never comes up: every turn degrades to text-only,
    // but no turn loses its boundary.
    let stt = Arc::new(ScriptedStt::new(vec![
        TranscriptResult::final_("first"),
        TranscriptResult::final_("second"),
    ]));
    let agent = Arc::new(ScriptedAgent::new(vec![
        vec![AgentNotice::Chunk("reply one.".to_string())],
        vec![AgentNotice::Chunk("reply two.".to_string())],
    ]));
    let retry = RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
    };
    let pipeline = Pipeline::voice(
        stt,
        agent,
        Arc::new(UnreachableTts),
        Arc::new(TurnLedger::new()),
        retry,
        16000,
        1,
        PipelineConfig::default(),
    );
    let (tx, rx) = pipeline.run();
    tx.send(Ok(audio(0))).await.unwrap();
    drop(tx);

    let events = collect(rx).await;
    let turn_ends = events
        .iter()
        .filter(|event| matches!(event, Event::TurnEnd))
        .count();
    assert_eq!(turn_ends, 2);
    assert!(events.contains(&Event::AgentChunk {
        text: "reply one.".to_string()
    }));
    assert!(events.contains(&Event::AgentChunk {
        text: "reply two.".to_string()
    }));
    assert!(!events
        .iter()
        .any(|event| matches!(event, Event::Audio(frame) if frame.origin == AudioOrigin::Synthesis)));
}

#[tokio::test]
async fn test_cancellation_releases_service_connections_once() {
    let stt = Arc::new(ScriptedStt::silent());
    let tts = Arc::new(EchoTts::new());
    let stt_stats = stt.stats();
    let tts_stats = tts.stats();

    let pipeline = voice_pipeline(
        stt,
        Arc::new(ScriptedAgent::new(Vec::new())),
        tts,
        Arc::new(TurnLedger::new()),
    );
    let (tx, rx) = pipeline.run();
    tx.send(Ok(audio(0))).await.unwrap();

    // Give the stages time to open their service connections.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(stt_stats.opened(), 1);
    assert_eq!(tts_stats.opened(), 1);

    // Cancel the whole pipeline: drop both endpoints.
    drop(tx);
    drop(rx);

    for _ in 0..50 {
        if stt_stats.closed() == 1 && tts_stats.closed() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stt_stats.closed(), 1);
    assert_eq!(tts_stats.closed(), 1);
}

#[tokio::test]
async fn test_partial_transcripts_stay_chronological() {
    let stt = Arc::new(ScriptedStt::new(vec![
        TranscriptResult::partial("or"),
        TranscriptResult::partial("order a"),
        TranscriptResult::partial("order a sand"),
        TranscriptResult::final_("order a sandwich"),
    ]));
    let agent = Arc::new(ScriptedAgent::new(vec![vec![AgentNotice::Chunk(
        "ok.".to_string(),
    )]]));
    let tts = Arc::new(EchoTts::new());

    let pipeline = voice_pipeline(stt, agent, tts, Arc::new(TurnLedger::new()));
    let (tx, rx) = pipeline.run();
    for seq in 0..8u8 {
        tx.send(Ok(audio(seq))).await.unwrap();
    }
    drop(tx);

    let events = collect(rx).await;
    let transcripts: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            Event::PartialTranscript { text } => Some(text.clone()),
            Event::FinalTranscript { text } => Some(format!("final:{text}")),
            _ => None,
        })
        .collect();
    assert_eq!(
        transcripts,
        vec!["or", "order a", "order a sand", "final:order a sandwich"]
    );
}
