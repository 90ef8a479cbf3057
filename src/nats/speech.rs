//! Speech backends reached over NATS
//!
//! Recognition: a start message on `speech.recognize.start`, audio frames on
//! `speech.audio.<session>` ending with a `final` marker, transcripts back
//! on `speech.text.<session>`. Synthesis is a request on `speech.synthesize`.

use anyhow::{Context, Result};
use base64::Engine;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::NatsClient;
use super::messages::{
    AudioFrameMessage, RecognitionStartMessage, SynthesizeReplyMessage, SynthesizeRequestMessage,
    TranscriptMessage,
};
use crate::error::BoxError;
use crate::speech::{
    RecognitionConfig, RecognitionResponse, RecognitionStream, SpeechRecognizer,
    SpeechSynthesizer, SynthesisRequest,
};

pub struct NatsRecognizer {
    nats: NatsClient,
}

impl NatsRecognizer {
    pub fn new(nats: NatsClient) -> Self {
        Self { nats }
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for NatsRecognizer {
    async fn open(&self, config: RecognitionConfig) -> Result<RecognitionStream> {
        let session_id = Uuid::new_v4().to_string();

        // Subscribe before starting so no transcript is missed.
        let transcripts = self
            .nats
            .subscribe(format!("speech.text.{}", session_id))
            .await?;

        self.nats
            .publish_json(
                "speech.recognize.start".to_string(),
                &RecognitionStartMessage {
                    session_id: session_id.clone(),
                    language: config.language.clone(),
                    sample_rate: config.sample_rate,
                    phrase_hints: config.phrase_hints.clone(),
                },
            )
            .await
            .context("Failed to start streaming recognition")?;
        info!("Started recognition session {}", session_id);

        let (audio_tx, audio_rx) = mpsc::channel(64);
        let (response_tx, response_rx) = mpsc::channel(8);

        tokio::spawn(forward_audio(
            self.nats.clone(),
            session_id,
            config.sample_rate,
            audio_rx,
        ));
        tokio::spawn(forward_transcripts(transcripts, response_tx));

        Ok(RecognitionStream {
            audio: audio_tx,
            responses: response_rx,
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}

async fn forward_audio(
    nats: NatsClient,
    session_id: String,
    sample_rate: u32,
    mut audio: mpsc::Receiver<Vec<u8>>,
) {
    let subject = format!("speech.audio.{}", session_id);
    let mut sequence = 0u32;

    let frame = |sequence: u32, pcm: &[u8], final_frame: bool| AudioFrameMessage {
        session_id: session_id.clone(),
        sequence,
        pcm: base64::engine::general_purpose::STANDARD.encode(pcm),
        sample_rate,
        channels: 1,
        timestamp: chrono::Utc::now().to_rfc3339(),
        final_frame,
    };

    while let Some(pcm) = audio.recv().await {
        if let Err(e) = nats
            .publish_json(subject.clone(), &frame(sequence, &pcm, false))
            .await
        {
            warn!("Failed to send audio data for recognition: {:#}", e);
            break;
        }
        sequence += 1;
    }

    // Send side closed: tell the recognizer no more audio is coming.
    if let Err(e) = nats.publish_json(subject, &frame(sequence, &[], true)).await {
        warn!("Failed to send final audio marker: {:#}", e);
    }
    debug!("Forwarded {} audio frames for {}", sequence, session_id);
}

async fn forward_transcripts(
    mut transcripts: async_nats::Subscriber,
    responses: mpsc::Sender<Result<RecognitionResponse, BoxError>>,
) {
    loop {
        let message = tokio::select! {
            _ = responses.closed() => break,
            message = transcripts.next() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let transcript: TranscriptMessage = match serde_json::from_slice(&message.payload) {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!("Failed to parse transcript: {}", e);
                continue;
            }
        };

        if let Some(error) = transcript.error.clone() {
            let _ = responses.send(Err(error.into())).await;
            break;
        }

        let done = transcript.done;
        if let Some(response) = transcript.into_response() {
            if responses.send(Ok(response)).await.is_err() {
                break;
            }
        }
        if done {
            break;
        }
    }
    // Dropping the subscriber unsubscribes.
}

pub struct NatsSynthesizer {
    nats: NatsClient,
}

impl NatsSynthesizer {
    pub fn new(nats: NatsClient) -> Self {
        Self { nats }
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for NatsSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<u8>> {
        let reply: SynthesizeReplyMessage = self
            .nats
            .request_json(
                "speech.synthesize".to_string(),
                &SynthesizeRequestMessage {
                    text: request.text,
                    language: request.language,
                    sample_rate: request.sample_rate,
                },
            )
            .await?;

        if let Some(error) = reply.error {
            anyhow::bail!("synthesis failed: {}", error);
        }

        base64::engine::general_purpose::STANDARD
            .decode(reply.audio)
            .context("Synthesized audio is not valid base64")
    }
}
