use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

use crate::audiosocket::{FrameWriter, SLIN_CHUNK_SIZE};
use crate::error::SpeakError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: String,
    /// Desired output rate of the LINEAR16 audio
    pub sample_rate: u32,
}

/// Text-to-speech backend
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `request` into 16-bit linear PCM (optionally WAV framed).
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<u8>>;
}

/// Strip a RIFF/WAV container from synthesized audio, leaving raw
/// little-endian PCM. Anything that is not a readable WAV passes through.
pub fn pcm_payload(audio: Vec<u8>) -> Vec<u8> {
    if !audio.starts_with(b"RIFF") {
        return audio;
    }

    let reader = match hound::WavReader::new(Cursor::new(&audio)) {
        Ok(reader) => reader,
        Err(e) => {
            warn!("Synthesized audio looked like WAV but failed to parse: {}", e);
            return audio;
        }
    };

    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        warn!(
            "Unexpected synthesized format: {} bits {:?}",
            spec.bits_per_sample, spec.sample_format
        );
    }

    let samples: std::result::Result<Vec<i16>, _> = reader.into_samples::<i16>().collect();
    match samples {
        Ok(samples) => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        Err(e) => {
            warn!("Failed to decode WAV samples: {}", e);
            audio
        }
    }
}

/// The speak primitive: synthesize a prompt and write it as Slin frames
pub struct Speaker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    language: String,
    sample_rate: u32,
    chunk_size: usize,
}

impl Speaker {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, language: impl Into<String>) -> Self {
        Self {
            synthesizer,
            language: language.into(),
            sample_rate: 8000,
            chunk_size: SLIN_CHUNK_SIZE,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Synthesize `text` and write it out. Dropping the future part way
    /// leaves `writer` on a frame boundary for the next write.
    pub async fn speak<W>(&self, writer: &mut FrameWriter<W>, text: &str) -> Result<(), SpeakError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let request = SynthesisRequest {
            text: text.to_string(),
            language: self.language.clone(),
            sample_rate: self.sample_rate,
        };

        let audio = self
            .synthesizer
            .synthesize(request)
            .await
            .map_err(|e| SpeakError::Synthesis(e.into()))?;
        let pcm = pcm_payload(audio);

        let frames = writer.write_audio(&pcm, self.chunk_size).await?;
        debug!("Spoke {:?} ({} bytes, {} frames)", text, pcm.len(), frames);
        Ok(())
    }
}
