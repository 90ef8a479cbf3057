use std::collections::BTreeSet;

use serde::Serialize;

/// Members needed for caller and processing leg to both be present
pub const QUORUM: usize = 2;

/// Membership of a bridge after one change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeSnapshot {
    pub bridge_id: String,
    pub members: BTreeSet<String>,
}

impl BridgeSnapshot {
    pub fn new(bridge_id: impl Into<String>, members: impl IntoIterator<Item = String>) -> Self {
        Self {
            bridge_id: bridge_id.into(),
            members: members.into_iter().collect(),
        }
    }

    pub fn has_quorum(&self) -> bool {
        self.members.len() >= QUORUM
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumChange {
    Achieved,
    Lost,
    Unchanged,
}

/// Watches snapshots for the achieved-then-lost transition.
///
/// A bridge that never reached quorum never reports it lost, so an initial
/// single-member state is not mistaken for the end of the call.
#[derive(Debug, Default)]
pub struct QuorumTracker {
    ever_achieved: bool,
    current: bool,
}

impl QuorumTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, snapshot: &BridgeSnapshot) -> QuorumChange {
        let quorum = snapshot.has_quorum();
        let change = match (self.current, quorum) {
            (false, true) => {
                self.ever_achieved = true;
                QuorumChange::Achieved
            }
            (true, false) => QuorumChange::Lost,
            _ => QuorumChange::Unchanged,
        };
        self.current = quorum;
        change
    }

    pub fn ever_achieved(&self) -> bool {
        self.ever_achieved
    }

    pub fn has_quorum(&self) -> bool {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(members: &[&str]) -> BridgeSnapshot {
        BridgeSnapshot::new("bridge-1", members.iter().map(|m| m.to_string()))
    }

    #[test]
    fn test_single_member_start_is_not_lost() {
        let mut tracker = QuorumTracker::new();

        assert_eq!(tracker.observe(&snapshot(&[])), QuorumChange::Unchanged);
        assert_eq!(tracker.observe(&snapshot(&["caller"])), QuorumChange::Unchanged);
        assert_eq!(tracker.observe(&snapshot(&[])), QuorumChange::Unchanged);
        assert!(!tracker.ever_achieved());
    }

    #[test]
    fn test_achieved_then_lost() {
        let mut tracker = QuorumTracker::new();

        tracker.observe(&snapshot(&["caller"]));
        assert_eq!(
            tracker.observe(&snapshot(&["caller", "leg"])),
            QuorumChange::Achieved
        );
        assert_eq!(
            tracker.observe(&snapshot(&["caller", "leg"])),
            QuorumChange::Unchanged
        );
        assert_eq!(tracker.observe(&snapshot(&["caller"])), QuorumChange::Lost);
        assert!(tracker.ever_achieved());
        assert!(!tracker.has_quorum());
    }
}
