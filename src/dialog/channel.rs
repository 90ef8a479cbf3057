use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::audiosocket::{FrameWriter, SharedReader};
use crate::bridge::{ControlPlane, DigitOptions, DigitResult};
use crate::error::{RecognitionError, SpeakError};
use crate::speech::{RecognitionPipeline, Speaker};

/// One caller input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Recognized speech
    Utterance(String),
    /// A completed DTMF entry
    Digits(String),
    /// Nothing usable arrived in time
    Incomplete,
}

/// How the dialog talks to and hears from the caller
#[async_trait::async_trait]
pub trait DialogChannel: Send {
    async fn say(&mut self, text: &str) -> Result<(), SpeakError>;
    async fn listen(&mut self) -> Result<Input, RecognitionError>;
}

/// Speech over an AudioSocket connection
pub struct AudioSocketChannel<R, W> {
    reader: SharedReader<R>,
    writer: FrameWriter<W>,
    pipeline: Arc<RecognitionPipeline>,
    speaker: Arc<Speaker>,
    hints: Vec<String>,
    max_recognition: Duration,
}

impl<R, W> AudioSocketChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        reader: SharedReader<R>,
        writer: FrameWriter<W>,
        pipeline: Arc<RecognitionPipeline>,
        speaker: Arc<Speaker>,
    ) -> Self {
        Self {
            reader,
            writer,
            pipeline,
            speaker,
            hints: Vec::new(),
            max_recognition: crate::speech::pipeline::MAX_RECOGNITION_DURATION,
        }
    }

    pub fn with_hints(mut self, hints: Vec<String>) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_max_recognition(mut self, max_recognition: Duration) -> Self {
        self.max_recognition = max_recognition;
        self
    }

    /// Give the write half back, e.g. to send the final hangup frame.
    pub fn into_writer(self) -> FrameWriter<W> {
        self.writer
    }
}

#[async_trait::async_trait]
impl<R, W> DialogChannel for AudioSocketChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send,
{
    async fn say(&mut self, text: &str) -> Result<(), SpeakError> {
        self.speaker.speak(&mut self.writer, text).await
    }

    async fn listen(&mut self) -> Result<Input, RecognitionError> {
        match self
            .pipeline
            .recognize(&self.reader, &self.hints, self.max_recognition)
            .await
        {
            Ok(text) if text.trim().is_empty() => {
                debug!("Empty transcript");
                Ok(Input::Incomplete)
            }
            Ok(text) => Ok(Input::Utterance(text)),
            Err(RecognitionError::Timeout(after)) => {
                info!("No utterance within {:?}", after);
                Ok(Input::Incomplete)
            }
            Err(e) => Err(e),
        }
    }
}

/// Prompt playback and DTMF collection through the control plane
pub struct ControlPlaneChannel {
    control: Arc<dyn ControlPlane>,
    channel_id: String,
    options: DigitOptions,
}

impl ControlPlaneChannel {
    pub fn new(control: Arc<dyn ControlPlane>, channel_id: impl Into<String>) -> Self {
        Self {
            control,
            channel_id: channel_id.into(),
            options: DigitOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DigitOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait::async_trait]
impl DialogChannel for ControlPlaneChannel {
    async fn say(&mut self, text: &str) -> Result<(), SpeakError> {
        self.control
            .play(&self.channel_id, text)
            .await
            .map_err(|e| SpeakError::Playback(e.into()))
    }

    async fn listen(&mut self) -> Result<Input, RecognitionError> {
        let result = self
            .control
            .gather_digits(&self.channel_id, self.options.clone())
            .await
            .map_err(|e| RecognitionError::Backend(e.into()))?;

        Ok(match result {
            DigitResult::Complete(digits) => Input::Digits(digits),
            DigitResult::Incomplete => Input::Incomplete,
        })
    }
}
