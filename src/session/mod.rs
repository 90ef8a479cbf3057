//! Call session management
//!
//! This module provides:
//! - `CallSession`: per-call state owned by the dialog engine
//! - `CallRegistry`: summaries of active and finished calls
//! - `handle_connection`: one AudioSocket connection from call id to hangup
//! - `run_digit_call`: the DTMF dialog on a control-plane channel

mod call;
mod config;
mod handler;
mod stats;

pub use call::CallSession;
pub use config::CallConfig;
pub use handler::{handle_connection, run_digit_call, CallServices};
pub use stats::{CallRegistry, CallSummary, DEFAULT_CALL_HISTORY};
