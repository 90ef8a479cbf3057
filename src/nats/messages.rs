use serde::{Deserialize, Serialize};

use crate::bridge::{DigitOptions, DigitResult, OriginateRequest};
use crate::speech::{Alternative, RecognitionResponse, RecognitionResult};

/// Opens a recognition session on the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct RecognitionStartMessage {
    pub session_id: String,
    pub language: String,
    pub sample_rate: u32,
    #[serde(default)]
    pub phrase_hints: Vec<String>,
}

/// Audio frame message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u32,
    pub pcm: String, // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    pub confidence: Option<f32>,
    /// Terminal recognition failure
    #[serde(default)]
    pub error: Option<String>,
    /// No more results for this session
    #[serde(default)]
    pub done: bool,
}

impl TranscriptMessage {
    /// Final, non-empty transcripts become recognition results; partials
    /// and empty texts are dropped.
    pub fn into_response(self) -> Option<RecognitionResponse> {
        if self.partial || self.text.trim().is_empty() {
            return None;
        }
        Some(RecognitionResponse {
            results: vec![RecognitionResult {
                alternatives: vec![Alternative {
                    transcript: self.text,
                    confidence: self.confidence,
                }],
                is_final: true,
            }],
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SynthesizeRequestMessage {
    pub text: String,
    pub language: String,
    pub sample_rate: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SynthesizeReplyMessage {
    /// Base64-encoded LINEAR16 audio, possibly WAV framed
    #[serde(default)]
    pub audio: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicaQueryMessage {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicaUpdateMessage {
    pub namespace: String,
    pub name: String,
    pub replicas: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplicaReplyMessage {
    #[serde(default)]
    pub replicas: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Request sent to the telephony control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlCommand {
    Answer { channel_id: String },
    Hangup { channel_id: String },
    CreateBridge { bridge_id: String },
    AddChannel { bridge_id: String, channel_id: String },
    RemoveChannel { bridge_id: String, channel_id: String },
    Originate(OriginateRequest),
    Play { channel_id: String, prompt: String },
    GatherDigits { channel_id: String, options: DigitOptions },
}

impl ControlCommand {
    /// Subject suffix the command is sent on
    pub fn op(&self) -> &'static str {
        match self {
            ControlCommand::Answer { .. } => "answer",
            ControlCommand::Hangup { .. } => "hangup",
            ControlCommand::CreateBridge { .. } => "create_bridge",
            ControlCommand::AddChannel { .. } => "add_channel",
            ControlCommand::RemoveChannel { .. } => "remove_channel",
            ControlCommand::Originate(_) => "originate",
            ControlCommand::Play { .. } => "play",
            ControlCommand::GatherDigits { .. } => "gather_digits",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlReplyMessage {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub digits: Option<DigitResult>,
}
