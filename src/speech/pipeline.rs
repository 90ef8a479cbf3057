use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::recognizer::{RecognitionConfig, RecognitionResponse, SpeechRecognizer};
use crate::audiosocket::{Message, SharedReader};
use crate::error::{BoxError, RecognitionError, TransportError};

/// Maximum time allowed for a single recognition exchange
pub const MAX_RECOGNITION_DURATION: Duration = Duration::from_secs(60);

/// How long to wait for the pump once results have ended
const PUMP_EXIT_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct RecognitionSettings {
    /// Sample rate of the inbound Slin audio
    pub sample_rate: u32,

    /// Recognition language, e.g. "en-US"
    pub language: String,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            language: "en-US".to_string(),
        }
    }
}

/// Why the audio pump stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpExit {
    /// Asked to stop by the waiting side
    Stopped,
    /// The recognizer dropped its audio receiver
    SinkClosed,
    /// The caller hung up
    Hangup,
    /// The transport closed
    Closed,
    /// Unrecoverable transport failure
    Failed,
    /// The pump task panicked
    Panicked,
}

/// Per-call streaming recognition.
///
/// Each call to [`recognize`](Self::recognize) opens one recognition
/// session, pumps audio into it from the shared transport reader and tears
/// it down again before returning, so exchanges never overlap.
pub struct RecognitionPipeline {
    recognizer: Arc<dyn SpeechRecognizer>,
    settings: RecognitionSettings,
}

impl RecognitionPipeline {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, settings: RecognitionSettings) -> Self {
        Self {
            recognizer,
            settings,
        }
    }

    /// Wait for one utterance.
    ///
    /// Returns the first non-empty transcript, or an empty string when the
    /// recognizer ends its results without one.
    pub async fn recognize<R>(
        &self,
        reader: &SharedReader<R>,
        phrase_hints: &[String],
        max_duration: Duration,
    ) -> Result<String, RecognitionError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let config = RecognitionConfig {
            sample_rate: self.settings.sample_rate,
            language: self.settings.language.clone(),
            phrase_hints: phrase_hints.to_vec(),
        };

        let stream = self
            .recognizer
            .open(config)
            .await
            .map_err(|e| RecognitionError::Backend(e.into()))?;
        debug!("Opened recognition session on {}", self.recognizer.name());

        let mut responses = stream.responses;
        let mut pump = Pump::spawn(Arc::clone(reader), stream.audio);

        let outcome = match tokio::time::timeout(
            max_duration,
            wait_for_transcript(&mut responses, &mut pump),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                info!("Recognition exceeded {:?}", max_duration);
                Err(RecognitionError::Timeout(max_duration))
            }
        };

        // Close the send side and release the reader before the next
        // exchange can start.
        pump.shutdown().await;
        drop(responses);

        outcome
    }
}

async fn wait_for_transcript(
    responses: &mut mpsc::Receiver<Result<RecognitionResponse, BoxError>>,
    pump: &mut Pump,
) -> Result<String, RecognitionError> {
    loop {
        let event = tokio::select! {
            biased;
            response = responses.recv() => Event::Response(response),
            exit = pump.wait() => Event::PumpExit(exit),
        };

        match event {
            Event::Response(Some(Ok(response))) => {
                if let Some(text) = response.first_transcript() {
                    info!("Recognized: {}", text);
                    return Ok(text.to_string());
                }
                debug!("Recognition response without transcript");
            }
            Event::Response(Some(Err(e))) => return Err(RecognitionError::Backend(e)),
            Event::Response(None) => {
                // Results also end when the transport goes away under the
                // pump, possibly before its task is seen to finish.
                if let Ok(exit) = tokio::time::timeout(PUMP_EXIT_GRACE, pump.wait()).await {
                    if let Some(err) = disconnect(exit) {
                        return Err(err);
                    }
                }
                debug!("Recognition results ended without a transcript");
                return Ok(String::new());
            }
            Event::PumpExit(exit) => {
                if let Some(err) = disconnect(exit) {
                    return Err(err);
                }
                // The recognizer stopped taking audio; its results may still arrive.
            }
        }
    }
}

fn disconnect(exit: PumpExit) -> Option<RecognitionError> {
    match exit {
        PumpExit::Hangup => Some(RecognitionError::Hangup),
        PumpExit::Closed | PumpExit::Failed | PumpExit::Panicked => {
            Some(RecognitionError::TransportClosed)
        }
        PumpExit::SinkClosed | PumpExit::Stopped => None,
    }
}

enum Event {
    Response(Option<Result<RecognitionResponse, BoxError>>),
    PumpExit(PumpExit),
}

/// The running audio pump of one recognition exchange
struct Pump {
    handle: Option<JoinHandle<PumpExit>>,
    stop: Option<oneshot::Sender<()>>,
}

impl Pump {
    fn spawn<R>(reader: SharedReader<R>, audio: mpsc::Sender<Vec<u8>>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(pump_audio(reader, audio, stop_rx));
        Self {
            handle: Some(handle),
            stop: Some(stop_tx),
        }
    }

    /// Resolves when the pump exits; pending forever once it has been reaped.
    async fn wait(&mut self) -> PumpExit {
        let Some(handle) = self.handle.as_mut() else {
            return std::future::pending().await;
        };
        let exit = handle.await.unwrap_or(PumpExit::Panicked);
        self.handle = None;
        exit
    }

    async fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(exit) => debug!("Audio pump exited: {:?}", exit),
                Err(e) => warn!("Audio pump panicked: {}", e),
            }
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        // Cancelled mid-exchange: the reader is cancel safe and the audio
        // sender is dropped with the task.
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn pump_audio<R>(
    reader: SharedReader<R>,
    audio: mpsc::Sender<Vec<u8>>,
    mut stop: oneshot::Receiver<()>,
) -> PumpExit
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = reader.lock_owned().await;
    let mut forwarded = 0usize;

    let exit = loop {
        let message = tokio::select! {
            _ = &mut stop => break PumpExit::Stopped,
            message = reader.next_message() => message,
        };

        match message {
            Ok(Message::Audio(payload)) => {
                if payload.is_empty() {
                    debug!("No content");
                    continue;
                }
                tokio::select! {
                    _ = &mut stop => break PumpExit::Stopped,
                    sent = audio.send(payload) => {
                        if sent.is_err() {
                            debug!("Recognition client closed");
                            break PumpExit::SinkClosed;
                        }
                        forwarded += 1;
                    }
                }
            }
            Ok(Message::Hangup) => {
                info!("Audiosocket received hangup command");
                break PumpExit::Hangup;
            }
            Ok(Message::Error(code)) => {
                warn!("Error from audiosocket (code={:?})", code);
            }
            Ok(other) => {
                debug!("Ignoring non-slin message {:?}", other.kind());
            }
            Err(TransportError::EndOfStream) => {
                info!("Audiosocket closed");
                break PumpExit::Closed;
            }
            Err(e) if e.is_recoverable() => {
                warn!("Skipping malformed audiosocket message: {}", e);
            }
            Err(e) => {
                warn!("Audiosocket read failed: {}", e);
                break PumpExit::Failed;
            }
        }
    };

    debug!("Audio pump forwarded {} frames", forwarded);
    exit
}
