//! Per-call dialog state machine
//!
//! - `state`: dialog states and the keyword vocabulary
//! - `channel`: the say/listen seam (AudioSocket speech or control-plane DTMF)
//! - `engine`: the loop driving one call through its states
//! - `content`: prompts, jokes and spoken formats

pub mod channel;
pub mod content;
pub mod engine;
pub mod state;

pub use channel::{AudioSocketChannel, ControlPlaneChannel, DialogChannel, Input};
pub use engine::{DialogEngine, DialogMode, DialogOutcome, DialogSettings};
pub use state::{contains_any, parse_count, route_command, Command, DialogState};
