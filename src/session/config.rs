use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audiosocket::SLIN_CHUNK_SIZE;
use crate::dialog::content::DEFAULT_HINTS;
use crate::speech::pipeline::MAX_RECOGNITION_DURATION;

/// Per-call limits and audio settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Hard limit on the whole call
    /// Default: 120 seconds
    pub max_call: Duration,

    /// Limit on a single recognition exchange
    /// Default: 60 seconds
    pub recognition_timeout: Duration,

    /// Recognition and synthesis language
    pub language: String,

    /// Sample rate of the Slin audio (AudioSocket is 8kHz)
    pub sample_rate: u32,

    /// Bytes per outbound Slin frame (320 = 20ms at 8kHz)
    pub chunk_size: usize,

    /// Phrases that boost recognition of the menu vocabulary
    pub phrase_hints: Vec<String>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            max_call: Duration::from_secs(120),
            recognition_timeout: MAX_RECOGNITION_DURATION,
            language: "en-US".to_string(),
            sample_rate: 8000,
            chunk_size: SLIN_CHUNK_SIZE,
            phrase_hints: DEFAULT_HINTS.iter().map(|h| h.to_string()).collect(),
        }
    }
}
