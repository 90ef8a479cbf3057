use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BoxError;

/// Initial configuration message of a streaming recognition session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Sample rate of the forwarded PCM (8kHz for AudioSocket)
    pub sample_rate: u32,

    /// BCP-47 language code, e.g. "en-US"
    pub language: String,

    /// Expected key phrases; boosts accuracy, does not restrict results
    pub phrase_hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub alternatives: Vec<Alternative>,
    pub is_final: bool,
}

/// One message from the recognizer's result stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResponse {
    pub results: Vec<RecognitionResult>,
}

impl RecognitionResponse {
    pub fn transcript(text: &str) -> Self {
        Self {
            results: vec![RecognitionResult {
                alternatives: vec![Alternative {
                    transcript: text.to_string(),
                    confidence: None,
                }],
                is_final: true,
            }],
        }
    }

    /// First non-empty transcript across all results and alternatives.
    pub fn first_transcript(&self) -> Option<&str> {
        self.results
            .iter()
            .flat_map(|result| result.alternatives.iter())
            .map(|alt| alt.transcript.as_str())
            .find(|text| !text.is_empty())
    }
}

/// An open recognition session.
///
/// Dropping `audio` closes the send side; the backend then finishes and
/// closes `responses`.
pub struct RecognitionStream {
    pub audio: mpsc::Sender<Vec<u8>>,
    pub responses: mpsc::Receiver<Result<RecognitionResponse, BoxError>>,
}

/// Streaming speech-to-text backend.
///
/// Opened once per utterance; implementations must tolerate the audio
/// sender being dropped at any point.
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn open(&self, config: RecognitionConfig) -> Result<RecognitionStream>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_transcript_skips_empty() {
        let response = RecognitionResponse {
            results: vec![
                RecognitionResult {
                    alternatives: vec![Alternative {
                        transcript: String::new(),
                        confidence: Some(0.1),
                    }],
                    is_final: false,
                },
                RecognitionResult {
                    alternatives: vec![Alternative {
                        transcript: "what time is it".to_string(),
                        confidence: Some(0.9),
                    }],
                    is_final: true,
                },
            ],
        };

        assert_eq!(response.first_transcript(), Some("what time is it"));
        assert_eq!(RecognitionResponse::default().first_transcript(), None);
    }
}
