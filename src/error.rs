//! Error types for voice-dialog.
//!
//! Each layer surfaces its own failures: the transport codec, the
//! recognition pipeline, the speak primitive and the dialog engine.
//! Collaborator failures (speech backends, scaler, control plane) are opaque
//! and carried as boxed sources.

use std::time::Duration;

use thiserror::Error;

use crate::audiosocket::Kind;

/// Opaque collaborator failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unknown message kind {0:#04x}")]
    UnknownKind(u8),

    #[error("malformed {kind:?} message: {reason}")]
    Malformed { kind: Kind, reason: String },

    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("audiosocket closed")]
    EndOfStream,

    #[error("audiosocket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Malformed frames whose bytes were fully consumed; the stream is
    /// still aligned on a frame boundary.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnknownKind(_) | Self::Malformed { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::UnknownKind(_) | Self::Malformed { .. } | Self::Truncated { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("no transcript within {0:?}")]
    Timeout(Duration),

    #[error("caller hung up")]
    Hangup,

    #[error("audio transport closed")]
    TransportClosed,

    #[error("recognition failed: {0}")]
    Backend(#[source] BoxError),
}

impl RecognitionError {
    /// The call is gone; there is nobody left to talk to.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Hangup | Self::TransportClosed)
    }
}

#[derive(Error, Debug)]
pub enum SpeakError {
    #[error("failed to synthesize speech: {0}")]
    Synthesis(#[source] BoxError),

    #[error("failed to play prompt: {0}")]
    Playback(#[source] BoxError),

    #[error("failed to send speech to the caller: {0}")]
    Transport(#[from] std::io::Error),
}

/// Who asked for the call to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HangupOrigin {
    /// The caller said goodbye.
    Dialog,
    /// The transport reported a hangup or closed.
    Caller,
}

#[derive(Error, Debug)]
pub enum DialogError {
    #[error("hangup ({0:?})")]
    Hangup(HangupOrigin),

    #[error("exceeded {0} retries")]
    ExceededRetries(u32),

    #[error("failed to parse a number from {input:?}")]
    InvalidNumber { input: String },

    #[error("action failed: {0}")]
    Action(#[source] BoxError),

    #[error("failed to listen: {0}")]
    Recognition(#[from] RecognitionError),

    #[error(transparent)]
    Speak(#[from] SpeakError),
}

impl DialogError {
    /// Prompt played to the caller before teardown, if any.
    pub fn apology(&self) -> Option<&'static str> {
        match self {
            Self::Hangup(_) => None,
            Self::ExceededRetries(_) => Some("An error has occurred."),
            Self::InvalidNumber { .. } => {
                Some("Sorry, I could not understand how many instances to scale to.")
            }
            Self::Action(_) => Some("Sorry, I failed to scale the deployment."),
            Self::Recognition(e) if e.is_disconnect() => None,
            Self::Recognition(_) => Some("Sorry, I failed to listen to you."),
            Self::Speak(SpeakError::Transport(_)) => None,
            Self::Speak(_) => Some("An error has occurred."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_display() {
        let error = TransportError::UnknownKind(0x42);
        assert_eq!(error.to_string(), "unknown message kind 0x42");
        assert!(error.is_recoverable());
        assert!(error.is_protocol());
    }

    #[test]
    fn test_truncated_is_not_recoverable() {
        let error = TransportError::Truncated {
            expected: 19,
            actual: 5,
        };
        assert!(!error.is_recoverable());
        assert!(error.is_protocol());
        assert!(!TransportError::EndOfStream.is_protocol());
    }

    #[test]
    fn test_disconnects_have_no_apology() {
        assert!(DialogError::Recognition(RecognitionError::Hangup)
            .apology()
            .is_none());
        assert!(DialogError::Hangup(HangupOrigin::Dialog).apology().is_none());
        assert_eq!(
            DialogError::ExceededRetries(3).apology(),
            Some("An error has occurred.")
        );
    }
}
