//! Speech collaborators and the per-call recognition pipeline
//!
//! - `SpeechRecognizer`: bidirectional streaming recognition backend
//! - `SpeechSynthesizer`: request/response text-to-speech backend
//! - `RecognitionPipeline`: pumps AudioSocket audio into one recognition
//!   session and waits for a single utterance
//! - `Speaker`: synthesizes a prompt and writes it as Slin frames

pub mod mock;
pub mod pipeline;
pub mod recognizer;
pub mod synthesizer;

pub use mock::{MockRecognizer, MockSynthesizer, RecognizerScript};
pub use pipeline::{RecognitionPipeline, RecognitionSettings};
pub use recognizer::{
    Alternative, RecognitionConfig, RecognitionResponse, RecognitionResult, RecognitionStream,
    SpeechRecognizer,
};
pub use synthesizer::{pcm_payload, Speaker, SpeechSynthesizer, SynthesisRequest};
