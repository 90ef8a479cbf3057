use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Point-in-time view of a call, as served by the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSummary {
    pub call_id: String,

    /// When the call started
    pub created_at: DateTime<Utc>,

    pub deadline: DateTime<Utc>,

    /// Current dialog state, if the dialog is still running
    pub state: Option<String>,

    /// Consecutive unmatched inputs so far
    pub retries: u32,

    pub active: bool,

    pub ended_at: Option<DateTime<Utc>>,

    /// How the call ended, e.g. "hangup" or "failed: exceeded 3 retries"
    pub outcome: Option<String>,
}

/// Finished calls kept for the status API by default
pub const DEFAULT_CALL_HISTORY: usize = 100;

/// Active calls plus the most recently finished ones, keyed by call id
#[derive(Clone)]
pub struct CallRegistry {
    inner: Arc<RwLock<Calls>>,
    history: usize,
}

#[derive(Default)]
struct Calls {
    by_id: HashMap<String, CallSummary>,
    /// Ids of finished calls, oldest first
    finished: VecDeque<String>,
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::with_history(DEFAULT_CALL_HISTORY)
    }
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `history` finished calls; active calls are never evicted.
    pub fn with_history(history: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Calls::default())),
            history,
        }
    }

    pub async fn upsert(&self, summary: CallSummary) {
        let mut calls = self.inner.write().await;
        let call_id = summary.call_id.clone();
        let ended = !summary.active;

        let was_active = calls
            .by_id
            .insert(call_id.clone(), summary)
            .map_or(true, |previous| previous.active);
        if ended && was_active {
            calls.finished.push_back(call_id);
        }

        while calls.finished.len() > self.history {
            if let Some(oldest) = calls.finished.pop_front() {
                calls.by_id.remove(&oldest);
            }
        }
    }

    pub async fn get(&self, call_id: &str) -> Option<CallSummary> {
        self.inner.read().await.by_id.get(call_id).cloned()
    }

    /// Active and retained calls, oldest first
    pub async fn list(&self) -> Vec<CallSummary> {
        let mut calls: Vec<CallSummary> =
            self.inner.read().await.by_id.values().cloned().collect();
        calls.sort_by_key(|c| c.created_at);
        calls
    }

    pub async fn active_count(&self) -> usize {
        self.inner
            .read()
            .await
            .by_id
            .values()
            .filter(|c| c.active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(call_id: &str, active: bool) -> CallSummary {
        let now = Utc::now();
        CallSummary {
            call_id: call_id.to_string(),
            created_at: now,
            deadline: now,
            state: None,
            retries: 0,
            active,
            ended_at: (!active).then_some(now),
            outcome: None,
        }
    }

    #[tokio::test]
    async fn test_history_drops_oldest_finished_calls() {
        let registry = CallRegistry::with_history(2);
        registry.upsert(summary("live", true)).await;
        for id in ["a", "b", "c"] {
            registry.upsert(summary(id, true)).await;
            registry.upsert(summary(id, false)).await;
        }

        assert!(registry.get("a").await.is_none());
        assert!(registry.get("b").await.is_some());
        assert!(registry.get("c").await.is_some());
        assert!(registry.get("live").await.is_some());
        assert_eq!(registry.list().await.len(), 3);
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_repeated_final_update_counts_once() {
        let registry = CallRegistry::with_history(2);
        registry.upsert(summary("a", false)).await;
        registry.upsert(summary("a", false)).await;
        registry.upsert(summary("b", false)).await;

        assert!(registry.get("a").await.is_some());
        assert!(registry.get("b").await.is_some());
    }

    #[tokio::test]
    async fn test_zero_history_keeps_only_active_calls() {
        let registry = CallRegistry::with_history(0);
        registry.upsert(summary("a", true)).await;
        assert!(registry.get("a").await.is_some());

        registry.upsert(summary("a", false)).await;
        assert!(registry.get("a").await.is_none());
        assert!(registry.list().await.is_empty());
    }
}
