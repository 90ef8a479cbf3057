//! In-process speech backends for tests and offline runs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::mpsc;

use super::recognizer::{RecognitionConfig, RecognitionResponse, RecognitionStream, SpeechRecognizer};
use super::synthesizer::{SpeechSynthesizer, SynthesisRequest};

/// What the mock recognizer does with one session
#[derive(Debug, Clone)]
pub enum RecognizerScript {
    /// Answer with `text` once `after_frames` audio frames have arrived
    Transcript { after_frames: usize, text: String },
    /// Never answer; results end when the audio side closes
    Silence,
    /// End the results immediately without a transcript
    EndOfResults,
    /// Fail the session with a backend error
    Fail(String),
}

#[derive(Debug, Default)]
struct RecognizerStats {
    opened: AtomicUsize,
    max_active: AtomicUsize,
    frames: AtomicUsize,
}

/// Scripted recognizer.
///
/// A session counts as active from `open` until every clone of its audio
/// sender has been dropped, which makes overlapping exchanges observable.
#[derive(Clone, Default)]
pub struct MockRecognizer {
    scripts: Arc<Mutex<VecDeque<RecognizerScript>>>,
    configs: Arc<Mutex<Vec<RecognitionConfig>>>,
    sessions: Arc<Mutex<Vec<mpsc::WeakSender<Vec<u8>>>>>,
    stats: Arc<RecognizerStats>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, script: RecognizerScript) -> Self {
        self.push(script);
        self
    }

    pub fn push(&self, script: RecognizerScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|audio| audio.upgrade().is_some());
        sessions.len()
    }

    pub fn max_active(&self) -> usize {
        self.stats.max_active.load(Ordering::SeqCst)
    }

    pub fn frames_received(&self) -> usize {
        self.stats.frames.load(Ordering::SeqCst)
    }

    pub fn configs(&self) -> Vec<RecognitionConfig> {
        self.configs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn open(&self, config: RecognitionConfig) -> Result<RecognitionStream> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RecognizerScript::Silence);
        self.configs.lock().unwrap().push(config);

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        self.sessions.lock().unwrap().push(audio_tx.downgrade());
        let active = self.active();
        self.stats.max_active.fetch_max(active, Ordering::SeqCst);

        let (response_tx, response_rx) = mpsc::channel(8);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            let mut response_tx = Some(response_tx);
            let mut frames = 0usize;

            match &script {
                RecognizerScript::EndOfResults => {
                    response_tx = None;
                }
                RecognizerScript::Fail(message) => {
                    if let Some(tx) = response_tx.take() {
                        let _ = tx.send(Err(message.clone().into())).await;
                    }
                }
                _ => {}
            }

            while let Some(_frame) = audio_rx.recv().await {
                frames += 1;
                stats.frames.fetch_add(1, Ordering::SeqCst);

                if let RecognizerScript::Transcript { after_frames, text } = &script {
                    if frames >= *after_frames {
                        if let Some(tx) = response_tx.take() {
                            let _ = tx.send(Ok(RecognitionResponse::transcript(text))).await;
                        }
                    }
                }
            }

            // Send side closed.
            drop(response_tx);
        });

        Ok(RecognitionStream {
            audio: audio_tx,
            responses: response_rx,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Synthesizer that "speaks" the UTF-8 bytes of the prompt.
///
/// Decoding the Slin frames written to a transport gives back the text, so
/// tests can assert on what the caller heard.
#[derive(Clone, Default)]
pub struct MockSynthesizer {
    spoken: Arc<Mutex<Vec<String>>>,
    fail_on: Arc<Mutex<Vec<String>>>,
    repeat: usize,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any request whose text contains `needle`.
    pub fn fail_on(self, needle: &str) -> Self {
        self.fail_on.lock().unwrap().push(needle.to_string());
        self
    }

    /// Repeat each prompt `times` over, for long audio.
    pub fn stretched(mut self, times: usize) -> Self {
        self.repeat = times;
        self
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<u8>> {
        let fails = self
            .fail_on
            .lock()
            .unwrap()
            .iter()
            .any(|needle| request.text.contains(needle.as_str()));
        if fails {
            anyhow::bail!("synthesis unavailable for {:?}", request.text);
        }

        self.spoken.lock().unwrap().push(request.text.clone());
        Ok(request.text.repeat(self.repeat.max(1)).into_bytes())
    }
}
