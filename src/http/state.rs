use crate::session::CallRegistry;
use chrono::{DateTime, Utc};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active and finished calls (call_id → summary)
    pub calls: CallRegistry,

    /// When the service started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(calls: CallRegistry) -> Self {
        Self {
            calls,
            started_at: Utc::now(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(CallRegistry::new())
    }
}
