use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use voice_dialog::bridge::{ControlEvent, DigitOptions, DigitResult, OriginateRequest};
use voice_dialog::nats::messages::{
    AudioFrameMessage, ControlCommand, ControlReplyMessage, ReplicaReplyMessage,
    SynthesizeReplyMessage, TranscriptMessage,
};

#[test]
fn test_audio_frame_serialization() {
    let msg = AudioFrameMessage {
        session_id: "call-1".to_string(),
        sequence: 0,
        pcm: base64::engine::general_purpose::STANDARD.encode([0u8; 320]),
        sample_rate: 8000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        final_frame: false,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("call-1"));
    assert!(json.contains("8000"));
    assert!(json.contains("\"final\":false"));
    assert!(json.contains("\"sequence\":0"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized.session_id, "call-1");
    assert_eq!(deserialized.sample_rate, 8000);
    assert_eq!(deserialized.channels, 1);
    assert!(!deserialized.final_frame);
}

#[test]
fn test_audio_frame_final_marker() {
    let msg = AudioFrameMessage {
        session_id: "call-1".to_string(),
        sequence: 10,
        pcm: String::new(), // Empty for final marker
        sample_rate: 8000,
        channels: 1,
        timestamp: "2025-10-27T14:30:00Z".to_string(),
        final_frame: true,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"final\":true"));

    let deserialized: AudioFrameMessage = serde_json::from_str(&json).unwrap();
    assert!(deserialized.final_frame);
    assert!(deserialized.pcm.is_empty());
    assert_eq!(deserialized.sequence, 10);
}

#[test]
fn test_final_transcript_becomes_response() {
    let json = r#"{
        "session_id": "call-1",
        "text": "scale to three",
        "partial": false,
        "timestamp": "2025-10-27T14:30:05Z",
        "confidence": 0.95
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert!(msg.error.is_none());
    assert!(!msg.done);

    let response = msg.into_response().unwrap();
    assert_eq!(response.first_transcript(), Some("scale to three"));
    assert!(response.results[0].is_final);
    assert_eq!(response.results[0].alternatives[0].confidence, Some(0.95));
}

#[test]
fn test_partial_and_empty_transcripts_are_dropped() {
    let partial = r#"{
        "session_id": "call-1",
        "text": "scale to",
        "partial": true,
        "timestamp": "2025-10-27T14:30:05Z",
        "confidence": 0.87
    }"#;
    let msg: TranscriptMessage = serde_json::from_str(partial).unwrap();
    assert!(msg.into_response().is_none());

    let empty = r#"{
        "session_id": "call-1",
        "text": "  ",
        "partial": false,
        "timestamp": "2025-10-27T14:30:05Z",
        "done": true
    }"#;
    let msg: TranscriptMessage = serde_json::from_str(empty).unwrap();
    assert!(msg.done);
    assert_eq!(msg.confidence, None);
    assert!(msg.into_response().is_none());
}

#[test]
fn test_transcript_error() {
    let json = r#"{
        "session_id": "call-1",
        "text": "",
        "partial": false,
        "timestamp": "2025-10-27T14:30:05Z",
        "error": "model unavailable"
    }"#;

    let msg: TranscriptMessage = serde_json::from_str(json).unwrap();
    assert_eq!(msg.error.as_deref(), Some("model unavailable"));
}

#[test]
fn test_pcm_encoding_roundtrip() {
    let original_samples: Vec<i16> = vec![100, -200, 300, -400];

    let pcm_bytes: Vec<u8> = original_samples
        .iter()
        .flat_map(|&s| s.to_le_bytes())
        .collect();
    let encoded = base64::engine::general_purpose::STANDARD.encode(&pcm_bytes);

    let decoded_bytes = base64::engine::general_purpose::STANDARD
        .decode(&encoded)
        .unwrap();
    let decoded_samples: Vec<i16> = decoded_bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    assert_eq!(decoded_samples, original_samples);
}

#[test]
fn test_synthesize_reply_defaults() {
    let reply: SynthesizeReplyMessage = serde_json::from_str(r#"{"error": "no voice"}"#).unwrap();
    assert!(reply.audio.is_empty());
    assert_eq!(reply.error.as_deref(), Some("no voice"));
}

#[test]
fn test_replica_reply() {
    let reply: ReplicaReplyMessage = serde_json::from_str(r#"{"replicas": 3}"#).unwrap();
    assert_eq!(reply.replicas, Some(3));
    assert!(reply.error.is_none());
}

#[test]
fn test_control_command_shape() {
    let command = ControlCommand::AddChannel {
        bridge_id: "bridge-1".to_string(),
        channel_id: "caller-1".to_string(),
    };
    assert_eq!(command.op(), "add_channel");

    let json = serde_json::to_value(&command).unwrap();
    assert_eq!(json["op"], "add_channel");
    assert_eq!(json["bridge_id"], "bridge-1");
    assert_eq!(json["channel_id"], "caller-1");
}

#[test]
fn test_originate_command_flattens_request() {
    let command = ControlCommand::Originate(OriginateRequest {
        endpoint: "AudioSocket/localhost:8080/leg-1".to_string(),
        channel_id: "leg-1".to_string(),
        app: "audiosocket".to_string(),
        app_args: "noop".to_string(),
        originator: "caller-1".to_string(),
        variables: HashMap::from([("AUDIOSOCKET_ID".to_string(), "leg-1".to_string())]),
    });
    assert_eq!(command.op(), "originate");

    let json = serde_json::to_value(&command).unwrap();
    assert_eq!(json["op"], "originate");
    assert_eq!(json["app_args"], "noop");
    assert_eq!(json["variables"]["AUDIOSOCKET_ID"], "leg-1");
}

#[test]
fn test_gather_digits_round_trip() {
    let command = ControlCommand::GatherDigits {
        channel_id: "caller-1".to_string(),
        options: DigitOptions {
            max_digits: 2,
            terminator: '#',
            timeout: Duration::from_secs(5),
        },
    };
    let json = serde_json::to_string(&command).unwrap();
    let back: ControlCommand = serde_json::from_str(&json).unwrap();
    assert_eq!(back.op(), "gather_digits");

    let reply: ControlReplyMessage = serde_json::from_str(
        r#"{"ok": true, "digits": {"result": "complete", "digits": "42"}}"#,
    )
    .unwrap();
    assert!(reply.ok);
    assert_eq!(reply.digits, Some(DigitResult::Complete("42".to_string())));
}

#[test]
fn test_control_event_parsing() {
    let event: ControlEvent =
        serde_json::from_str(r#"{"type": "stasis_start", "channel_id": "caller-1"}"#).unwrap();
    assert_eq!(
        event,
        ControlEvent::StasisStart {
            channel_id: "caller-1".to_string(),
            args: vec![],
        }
    );

    let event: ControlEvent = serde_json::from_str(
        r#"{"type": "bridge_membership", "bridge_id": "b", "channel_ids": ["x", "y"]}"#,
    )
    .unwrap();
    assert!(matches!(event, ControlEvent::BridgeMembership { channel_ids, .. } if channel_ids.len() == 2));
}
