use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::stats::CallSummary;
use crate::dialog::DialogState;

/// One call being processed by the dialog engine.
///
/// Owned by the task driving the call; nothing else mutates it.
#[derive(Debug, Clone)]
pub struct CallSession {
    /// Call id from the first transport frame (or the control-plane channel)
    pub id: Uuid,

    pub created_at: DateTime<Utc>,

    /// When the call is cut off regardless of dialog state
    pub deadline: DateTime<Utc>,

    state: Option<DialogState>,

    /// Consecutive unmatched inputs
    retries: u32,

    /// Scratch values remembered across states
    memory: HashMap<String, String>,

    outcome: Option<String>,
    ended_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub fn new(id: Uuid, max_call: Duration) -> Self {
        let created_at = Utc::now();
        let max_call = chrono::Duration::from_std(max_call).unwrap_or_else(|_| chrono::Duration::days(1));

        Self {
            id,
            created_at,
            deadline: created_at + max_call,
            state: None,
            retries: 0,
            memory: HashMap::new(),
            outcome: None,
            ended_at: None,
        }
    }

    pub fn state(&self) -> Option<DialogState> {
        self.state
    }

    pub fn set_state(&mut self, state: Option<DialogState>) {
        self.state = state;
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Count one more retry and return the new total.
    pub fn bump_retries(&mut self) -> u32 {
        self.retries += 1;
        self.retries
    }

    pub fn reset_retries(&mut self) {
        self.retries = 0;
    }

    pub fn remember(&mut self, key: &str, value: &str) {
        self.memory.insert(key.to_string(), value.to_string());
    }

    pub fn recall(&self, key: &str) -> Option<&str> {
        self.memory.get(key).map(String::as_str)
    }

    /// Mark the call finished with a short outcome label.
    pub fn set_outcome(&mut self, outcome: impl Into<String>) {
        self.outcome = Some(outcome.into());
        self.ended_at = Some(Utc::now());
    }

    pub fn outcome(&self) -> Option<&str> {
        self.outcome.as_deref()
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        (self.deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn summary(&self) -> CallSummary {
        CallSummary {
            call_id: self.id.to_string(),
            created_at: self.created_at,
            deadline: self.deadline,
            state: self.state.map(|s| s.to_string()),
            retries: self.retries,
            active: self.ended_at.is_none(),
            ended_at: self.ended_at,
            outcome: self.outcome.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_count_and_reset() {
        let mut session = CallSession::new(Uuid::new_v4(), Duration::from_secs(120));
        assert_eq!(session.bump_retries(), 1);
        assert_eq!(session.bump_retries(), 2);
        session.reset_retries();
        assert_eq!(session.retries(), 0);
    }

    #[test]
    fn test_deadline_and_summary() {
        let id = Uuid::new_v4();
        let mut session = CallSession::new(id, Duration::from_secs(120));
        assert_eq!((session.deadline - session.created_at).num_seconds(), 120);
        assert!(session.remaining() > Duration::from_secs(100));

        session.set_state(Some(DialogState::Scaling { target: 3 }));
        session.remember("scaled_to", "3");
        let summary = session.summary();
        assert_eq!(summary.call_id, id.to_string());
        assert_eq!(summary.state.as_deref(), Some("scaling(3)"));
        assert!(summary.active);
        assert_eq!(session.recall("scaled_to"), Some("3"));

        session.set_outcome("completed");
        let summary = session.summary();
        assert!(!summary.active);
        assert_eq!(summary.outcome.as_deref(), Some("completed"));
    }
}
