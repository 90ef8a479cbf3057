//! In-process control plane for tests and local runs

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::mpsc;

use super::control::{
    ControlEvent, ControlPlane, DigitOptions, DigitResult, EventRouter, OriginateRequest,
    Subscription,
};

#[derive(Default)]
struct State {
    bridges: HashMap<String, BTreeSet<String>>,
    answered: Vec<String>,
    hung_up: Vec<String>,
    originated: Vec<OriginateRequest>,
    played: Vec<(String, String)>,
    digits: VecDeque<DigitResult>,
}

/// Control plane simulated in memory.
///
/// Originated legs "answer" immediately (a stasis start with their app
/// args) unless answering is disabled. Hanging up a channel removes it
/// from every bridge before reporting it destroyed.
#[derive(Clone)]
pub struct InMemoryControlPlane {
    application: String,
    answer_legs: bool,
    state: Arc<Mutex<State>>,
    events: Arc<EventRouter>,
}

impl InMemoryControlPlane {
    pub fn new(application: &str) -> Self {
        Self {
            application: application.to_string(),
            answer_legs: true,
            state: Arc::new(Mutex::new(State::default())),
            events: Arc::new(EventRouter::new()),
        }
    }

    /// Originated legs never signal they are ready.
    pub fn without_leg_answer(mut self) -> Self {
        self.answer_legs = false;
        self
    }

    /// Queue the result of the next digit collection.
    pub fn push_digits(&self, result: DigitResult) {
        self.state.lock().unwrap().digits.push_back(result);
    }

    /// Simulate a new call entering the application.
    pub fn start_call(&self, channel_id: &str) {
        self.events.dispatch(&ControlEvent::StasisStart {
            channel_id: channel_id.to_string(),
            args: vec![],
        });
    }

    pub fn members(&self, bridge_id: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .unwrap()
            .bridges
            .get(bridge_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn bridges(&self) -> Vec<String> {
        self.state.lock().unwrap().bridges.keys().cloned().collect()
    }

    pub fn answered(&self) -> Vec<String> {
        self.state.lock().unwrap().answered.clone()
    }

    pub fn hung_up(&self) -> Vec<String> {
        self.state.lock().unwrap().hung_up.clone()
    }

    pub fn originated(&self) -> Vec<OriginateRequest> {
        self.state.lock().unwrap().originated.clone()
    }

    pub fn played(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().played.clone()
    }

    fn membership_event(bridge_id: &str, members: &BTreeSet<String>) -> ControlEvent {
        ControlEvent::BridgeMembership {
            bridge_id: bridge_id.to_string(),
            channel_ids: members.iter().cloned().collect(),
        }
    }
}

#[async_trait::async_trait]
impl ControlPlane for InMemoryControlPlane {
    fn application(&self) -> &str {
        &self.application
    }

    async fn answer(&self, channel_id: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .answered
            .push(channel_id.to_string());
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> Result<()> {
        let events = {
            let mut state = self.state.lock().unwrap();
            if state.hung_up.iter().any(|id| id == channel_id) {
                return Ok(());
            }
            state.hung_up.push(channel_id.to_string());

            let mut events = Vec::new();
            for (bridge_id, members) in state.bridges.iter_mut() {
                if members.remove(channel_id) {
                    events.push(Self::membership_event(bridge_id, members));
                }
            }
            events.push(ControlEvent::ChannelDestroyed {
                channel_id: channel_id.to_string(),
            });
            events
        };

        for event in &events {
            self.events.dispatch(event);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        subscription: Subscription,
    ) -> Result<mpsc::UnboundedReceiver<ControlEvent>> {
        Ok(self.events.subscribe(subscription))
    }

    async fn create_bridge(&self, bridge_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.bridges.contains_key(bridge_id) {
            anyhow::bail!("bridge {} already exists", bridge_id);
        }
        state.bridges.insert(bridge_id.to_string(), BTreeSet::new());
        Ok(())
    }

    async fn add_channel(&self, bridge_id: &str, channel_id: &str) -> Result<()> {
        let event = {
            let mut state = self.state.lock().unwrap();
            let Some(members) = state.bridges.get_mut(bridge_id) else {
                anyhow::bail!("bridge {} not found", bridge_id);
            };
            if !members.insert(channel_id.to_string()) {
                return Ok(());
            }
            Self::membership_event(bridge_id, members)
        };
        self.events.dispatch(&event);
        Ok(())
    }

    async fn remove_channel(&self, bridge_id: &str, channel_id: &str) -> Result<()> {
        let event = {
            let mut state = self.state.lock().unwrap();
            let Some(members) = state.bridges.get_mut(bridge_id) else {
                anyhow::bail!("bridge {} not found", bridge_id);
            };
            if !members.remove(channel_id) {
                anyhow::bail!("channel {} not in bridge {}", channel_id, bridge_id);
            }
            Self::membership_event(bridge_id, members)
        };
        self.events.dispatch(&event);
        Ok(())
    }

    async fn originate(&self, request: OriginateRequest) -> Result<()> {
        let start = ControlEvent::StasisStart {
            channel_id: request.channel_id.clone(),
            args: vec![request.app_args.clone()],
        };
        self.state.lock().unwrap().originated.push(request);

        if self.answer_legs {
            self.events.dispatch(&start);
        }
        Ok(())
    }

    async fn play(&self, channel_id: &str, prompt: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .played
            .push((channel_id.to_string(), prompt.to_string()));
        Ok(())
    }

    async fn gather_digits(&self, _channel_id: &str, _options: DigitOptions) -> Result<DigitResult> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .digits
            .pop_front()
            .unwrap_or(DigitResult::Incomplete))
    }
}
