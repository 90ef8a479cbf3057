use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::control::{ControlEvent, ControlPlane, OriginateRequest, Subscription};
use super::quorum::{BridgeSnapshot, QuorumChange, QuorumTracker};
use crate::cancel::{CallToken, CancelReason};

/// Default wait for an originated leg to enter the application
pub const LOCAL_CHANNEL_ANSWER_TIMEOUT: Duration = Duration::from_secs(1);

/// App argument marking originated legs, so the new-call listener skips them
pub const LEG_APP_ARGS: &str = "noop";

/// Where the audio-processing leg dials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub host: String,
    pub port: u16,
}

impl EndpointDescriptor {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn dial_string(&self, id: &str) -> String {
        format!("AudioSocket/{}:{}/{}", self.host, self.port, id)
    }
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// How long an originated leg has to enter the application
    pub answer_timeout: Duration,

    /// Re-originations after an answer timeout (0 = go on caller-only)
    pub leg_retries: u32,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            answer_timeout: LOCAL_CHANNEL_ANSWER_TIMEOUT,
            leg_retries: 0,
        }
    }
}

/// How the audio-processing leg ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegOutcome {
    /// Added to the bridge
    Attached(String),
    /// Never answered; the bridge carries the caller alone
    Downgraded,
    Cancelled(CancelReason),
    Failed,
}

/// How waiting on a bridge ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "end", content = "reason")]
pub enum BridgeEnd {
    /// A member left after both legs had been present
    QuorumLost,
    Cancelled(CancelReason),
    /// Membership events stopped arriving
    MonitorClosed,
}

/// Joins a caller channel to an AudioSocket processing leg.
pub struct BridgeOrchestrator {
    control: Arc<dyn ControlPlane>,
    settings: BridgeSettings,
}

impl BridgeOrchestrator {
    pub fn new(control: Arc<dyn ControlPlane>, settings: BridgeSettings) -> Self {
        Self { control, settings }
    }

    /// Stage a bridge holding `primary` and start attaching the
    /// processing leg toward `endpoint`.
    ///
    /// Returns once the primary is a member; the leg attaches in the
    /// background and shows up in the membership snapshots.
    pub async fn establish(
        &self,
        token: &CallToken,
        primary: &str,
        endpoint: &EndpointDescriptor,
    ) -> Result<BridgeSession> {
        let bridge_id = format!("bridge-{}", Uuid::new_v4());

        // Subscribe first so the primary's own join is not missed.
        let membership = self
            .control
            .subscribe(Subscription::BridgeMembership(bridge_id.clone()))
            .await
            .context("failed to subscribe to bridge events")?;

        self.control
            .create_bridge(&bridge_id)
            .await
            .context("failed to stage bridge creation")?;
        info!(bridge_id = %bridge_id, primary, "Created bridge");

        let (snapshot_tx, snapshots) = mpsc::unbounded_channel();
        let watcher = tokio::spawn(watch_membership(membership, snapshot_tx));

        let mut session = BridgeSession {
            bridge_id: bridge_id.clone(),
            primary: primary.to_string(),
            control: Arc::clone(&self.control),
            snapshots,
            tracker: QuorumTracker::new(),
            leg: Arc::new(Mutex::new(None)),
            watcher: Some(watcher),
            attach: None,
            primary_added: false,
            torn_down: false,
        };

        if let Err(e) = self.control.add_channel(&bridge_id, primary).await {
            session.teardown().await;
            return Err(e).context("failed to add original channel to bridge");
        }
        session.primary_added = true;

        let attach = LegAttach {
            control: Arc::clone(&self.control),
            bridge_id,
            primary: primary.to_string(),
            endpoint: endpoint.clone(),
            settings: self.settings.clone(),
            leg: Arc::clone(&session.leg),
        };
        session.attach = Some(tokio::spawn(attach.run(token.clone())));

        Ok(session)
    }
}

async fn watch_membership(
    mut membership: mpsc::UnboundedReceiver<ControlEvent>,
    snapshots: mpsc::UnboundedSender<BridgeSnapshot>,
) {
    while let Some(event) = membership.recv().await {
        let ControlEvent::BridgeMembership {
            bridge_id,
            channel_ids,
        } = event
        else {
            continue;
        };

        // Every change is forwarded in order, transient ones included.
        if snapshots
            .send(BridgeSnapshot::new(bridge_id, channel_ids))
            .is_err()
        {
            break;
        }
    }
    debug!("Bridge monitor stopped");
}

struct LegAttach {
    control: Arc<dyn ControlPlane>,
    bridge_id: String,
    primary: String,
    endpoint: EndpointDescriptor,
    settings: BridgeSettings,
    leg: Arc<Mutex<Option<String>>>,
}

impl LegAttach {
    async fn run(self, token: CallToken) -> LegOutcome {
        for attempt in 0..=self.settings.leg_retries {
            let leg_id = Uuid::new_v4().to_string();
            *leg_slot(&self.leg) = Some(leg_id.clone());

            let mut started = match self
                .control
                .subscribe(Subscription::StasisStart(leg_id.clone()))
                .await
            {
                Ok(started) => started,
                Err(e) => {
                    warn!("failed to subscribe to AudioSocket channel start: {:#}", e);
                    return LegOutcome::Failed;
                }
            };

            let request = OriginateRequest {
                endpoint: self.endpoint.dial_string(&leg_id),
                channel_id: leg_id.clone(),
                app: self.control.application().to_string(),
                app_args: LEG_APP_ARGS.to_string(),
                originator: self.primary.clone(),
                variables: HashMap::from([("AUDIOSOCKET_ID".to_string(), leg_id.clone())]),
            };
            if let Err(e) = self.control.originate(request).await {
                warn!("failed to create AudioSocket channel: {:#}", e);
                return LegOutcome::Failed;
            }
            debug!(leg = %leg_id, attempt, "Originated AudioSocket channel");

            tokio::select! {
                reason = token.cancelled() => return LegOutcome::Cancelled(reason),
                _ = tokio::time::sleep(self.settings.answer_timeout) => {
                    warn!(
                        leg = %leg_id,
                        "AudioSocket channel not answered within {:?}",
                        self.settings.answer_timeout
                    );
                    self.release(&leg_id).await;
                }
                event = started.recv() => {
                    if event.is_none() {
                        return LegOutcome::Failed;
                    }
                    // The only add of this leg.
                    return match self.control.add_channel(&self.bridge_id, &leg_id).await {
                        Ok(()) => {
                            info!(bridge_id = %self.bridge_id, leg = %leg_id, "Sent AudioSocket channel to bridge");
                            LegOutcome::Attached(leg_id)
                        }
                        Err(e) => {
                            warn!("failed to send AudioSocket channel to bridge: {:#}", e);
                            LegOutcome::Failed
                        }
                    };
                }
            }
        }

        info!(bridge_id = %self.bridge_id, "Continuing without audio-processing leg");
        LegOutcome::Downgraded
    }

    async fn release(&self, leg_id: &str) {
        if let Err(e) = self.control.hangup(leg_id).await {
            debug!("failed to hang up unanswered leg {}: {:#}", leg_id, e);
        }
        leg_slot(&self.leg).take();
    }
}

/// A live bridge: ordered membership snapshots plus cleanup.
pub struct BridgeSession {
    bridge_id: String,
    primary: String,
    control: Arc<dyn ControlPlane>,
    snapshots: mpsc::UnboundedReceiver<BridgeSnapshot>,
    tracker: QuorumTracker,
    leg: Arc<Mutex<Option<String>>>,
    watcher: Option<JoinHandle<()>>,
    attach: Option<JoinHandle<LegOutcome>>,
    primary_added: bool,
    torn_down: bool,
}

impl BridgeSession {
    pub fn bridge_id(&self) -> &str {
        &self.bridge_id
    }

    /// Id of the processing leg currently originated, if any
    pub fn leg_id(&self) -> Option<String> {
        leg_slot(&self.leg).clone()
    }

    pub fn quorum_achieved(&self) -> bool {
        self.tracker.ever_achieved()
    }

    /// Next membership change, in the order the control plane reported them.
    pub async fn next_snapshot(&mut self) -> Option<BridgeSnapshot> {
        self.next_change().await.map(|(snapshot, _)| snapshot)
    }

    async fn next_change(&mut self) -> Option<(BridgeSnapshot, QuorumChange)> {
        let snapshot = self.snapshots.recv().await?;
        let change = self.tracker.observe(&snapshot);
        Some((snapshot, change))
    }

    /// Wait until the bridge is left after quorum, or the call is cancelled.
    pub async fn wait_for_end(&mut self, token: &CallToken) -> BridgeEnd {
        info!(bridge_id = %self.bridge_id, "Waiting for bridge quorum");
        loop {
            tokio::select! {
                reason = token.cancelled() => {
                    info!(bridge_id = %self.bridge_id, ?reason, "Call cancelled");
                    return BridgeEnd::Cancelled(reason);
                }
                next = self.next_change() => match next {
                    None => return BridgeEnd::MonitorClosed,
                    Some((_, QuorumChange::Achieved)) => {
                        info!(bridge_id = %self.bridge_id, "Bridge quorum achieved");
                    }
                    Some((_, QuorumChange::Lost)) => {
                        info!(bridge_id = %self.bridge_id, "Channel left bridge; exiting");
                        return BridgeEnd::QuorumLost;
                    }
                    Some((snapshot, QuorumChange::Unchanged)) => {
                        debug!(
                            bridge_id = %self.bridge_id,
                            "Odd bridge state with {} members",
                            snapshot.members.len()
                        );
                    }
                }
            }
        }
    }

    /// Remove the caller, hang up the processing leg and stop the
    /// monitors. Later calls do nothing.
    pub async fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        // Stop attaching first so no leg joins after this point.
        if let Some(attach) = self.attach.take() {
            attach.abort();
            match attach.await {
                Ok(outcome) => debug!("Leg attach finished: {:?}", outcome),
                Err(e) if e.is_cancelled() => debug!("Leg attach aborted"),
                Err(e) => warn!("Leg attach panicked: {}", e),
            }
        }

        if self.primary_added {
            if let Err(e) = self
                .control
                .remove_channel(&self.bridge_id, &self.primary)
                .await
            {
                debug!("failed to remove {} from bridge: {:#}", self.primary, e);
            }
        }

        let leg = leg_slot(&self.leg).take();
        if let Some(leg) = leg {
            if let Err(e) = self.control.hangup(&leg).await {
                debug!("failed to hang up AudioSocket channel {}: {:#}", leg, e);
            }
        }

        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        info!(bridge_id = %self.bridge_id, "Bridge torn down");
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        if let Some(attach) = self.attach.take() {
            attach.abort();
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(bridge_id = %self.bridge_id, "Bridge dropped outside a runtime; skipping cleanup");
            return;
        };

        let control = Arc::clone(&self.control);
        let bridge_id = self.bridge_id.clone();
        let primary = self.primary_added.then(|| self.primary.clone());
        let leg = leg_slot(&self.leg).take();
        runtime.spawn(async move {
            if let Some(primary) = primary {
                let _ = control.remove_channel(&bridge_id, &primary).await;
            }
            if let Some(leg) = leg {
                let _ = control.hangup(&leg).await;
            }
            debug!(bridge_id = %bridge_id, "Dropped bridge cleaned up");
        });
    }
}

/// The attached leg id. A panic while the slot was held leaves nothing
/// half-updated, so a poisoned lock is still read.
fn leg_slot(leg: &Mutex<Option<String>>) -> MutexGuard<'_, Option<String>> {
    leg.lock().unwrap_or_else(PoisonError::into_inner)
}
