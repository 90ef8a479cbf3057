use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Request to originate a new channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginateRequest {
    /// Dial string, e.g. "AudioSocket/host:8080/<uuid>"
    pub endpoint: String,
    /// Caller-supplied id of the new channel
    pub channel_id: String,
    /// Application the channel enters once answered
    pub app: String,
    pub app_args: String,
    /// Channel the new one is originated on behalf of
    pub originator: String,
    pub variables: HashMap<String, String>,
}

/// Event from the telephony control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    /// A channel entered the application (new call or answered leg)
    StasisStart {
        channel_id: String,
        #[serde(default)]
        args: Vec<String>,
    },
    ChannelDestroyed { channel_id: String },
    /// Full member list of a bridge after a change
    BridgeMembership {
        bridge_id: String,
        channel_ids: Vec<String>,
    },
}

/// What an event subscription listens for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    ChannelDestroyed(String),
    StasisStart(String),
    BridgeMembership(String),
    /// Every stasis start, i.e. every channel entering the application
    NewCalls,
}

impl Subscription {
    pub fn matches(&self, event: &ControlEvent) -> bool {
        match (self, event) {
            (Subscription::ChannelDestroyed(id), ControlEvent::ChannelDestroyed { channel_id }) => {
                id == channel_id
            }
            (Subscription::StasisStart(id), ControlEvent::StasisStart { channel_id, .. }) => {
                id == channel_id
            }
            (Subscription::NewCalls, ControlEvent::StasisStart { .. }) => true,
            (
                Subscription::BridgeMembership(id),
                ControlEvent::BridgeMembership { bridge_id, .. },
            ) => id == bridge_id,
            _ => false,
        }
    }
}

/// Options for collecting a DTMF entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitOptions {
    /// Stop after this many digits
    pub max_digits: usize,
    /// Digit that completes the entry early
    pub terminator: char,
    /// Overall time allowed for the entry
    pub timeout: Duration,
}

impl Default for DigitOptions {
    fn default() -> Self {
        Self {
            max_digits: 4,
            terminator: '#',
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "digits", rename_all = "snake_case")]
pub enum DigitResult {
    Complete(String),
    Incomplete,
}

/// Telephony control plane (answer, bridge, originate, events)
///
/// Failures are opaque; callers add context.
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    /// Application name originated channels should enter
    fn application(&self) -> &str;

    async fn answer(&self, channel_id: &str) -> Result<()>;
    async fn hangup(&self, channel_id: &str) -> Result<()>;

    /// Subscribe before triggering the action whose event you wait for.
    /// Dropping the receiver cancels the subscription.
    async fn subscribe(&self, subscription: Subscription)
        -> Result<mpsc::UnboundedReceiver<ControlEvent>>;

    async fn create_bridge(&self, bridge_id: &str) -> Result<()>;
    async fn add_channel(&self, bridge_id: &str, channel_id: &str) -> Result<()>;
    async fn remove_channel(&self, bridge_id: &str, channel_id: &str) -> Result<()>;

    async fn originate(&self, request: OriginateRequest) -> Result<()>;

    /// Play a prompt to a channel and wait for it to finish.
    async fn play(&self, channel_id: &str, prompt: &str) -> Result<()>;

    /// Collect a DTMF entry from a channel.
    async fn gather_digits(&self, channel_id: &str, options: DigitOptions) -> Result<DigitResult>;
}

/// Fans control-plane events out to matching subscriptions, in order.
#[derive(Default)]
pub struct EventRouter {
    subscribers: Mutex<Vec<(Subscription, mpsc::UnboundedSender<ControlEvent>)>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscription: Subscription) -> mpsc::UnboundedReceiver<ControlEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push((subscription, tx));
        }
        rx
    }

    pub fn dispatch(&self, event: &ControlEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|(subscription, tx)| {
            if tx.is_closed() {
                return false;
            }
            if subscription.matches(event) {
                return tx.send(event.clone()).is_ok();
            }
            true
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_matching() {
        let destroyed = ControlEvent::ChannelDestroyed {
            channel_id: "caller".to_string(),
        };
        assert!(Subscription::ChannelDestroyed("caller".to_string()).matches(&destroyed));
        assert!(!Subscription::ChannelDestroyed("other".to_string()).matches(&destroyed));
        assert!(!Subscription::NewCalls.matches(&destroyed));

        let start = ControlEvent::StasisStart {
            channel_id: "leg".to_string(),
            args: vec!["noop".to_string()],
        };
        assert!(Subscription::NewCalls.matches(&start));
        assert!(Subscription::StasisStart("leg".to_string()).matches(&start));
    }

    #[test]
    fn test_router_prunes_dropped_subscribers() {
        let router = EventRouter::new();
        let rx = router.subscribe(Subscription::NewCalls);
        let mut kept = router.subscribe(Subscription::NewCalls);
        drop(rx);

        router.dispatch(&ControlEvent::StasisStart {
            channel_id: "a".to_string(),
            args: vec![],
        });

        assert_eq!(router.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn test_event_json_shape() {
        let event = ControlEvent::BridgeMembership {
            bridge_id: "bridge-1".to_string(),
            channel_ids: vec!["a".to_string(), "b".to_string()],
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"bridge_membership\""));

        let back: ControlEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
