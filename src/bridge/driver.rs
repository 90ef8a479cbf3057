//! Control-plane application drivers: the per-call bridge flow and the
//! listener that hands new calls to it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::control::{ControlEvent, ControlPlane, Subscription};
use super::orchestrator::{BridgeEnd, BridgeOrchestrator, BridgeSettings, EndpointDescriptor, LEG_APP_ARGS};
use crate::cancel::{CallToken, CancelReason};

#[derive(Debug, Clone)]
pub struct BridgedCallSettings {
    /// AudioSocket service the processing leg dials
    pub endpoint: EndpointDescriptor,
    pub bridge: BridgeSettings,
    /// Pause between answering and bridging
    pub settle_delay: Duration,
    /// Hard limit on the whole call
    pub max_call: Duration,
}

impl Default for BridgedCallSettings {
    fn default() -> Self {
        Self {
            endpoint: EndpointDescriptor::new("localhost", 8080),
            bridge: BridgeSettings::default(),
            settle_delay: Duration::from_secs(1),
            max_call: Duration::from_secs(120),
        }
    }
}

/// Answer `channel_id`, bridge it to an AudioSocket leg and wait for the
/// call to end. The caller is hung up on every exit path.
pub async fn run_bridged_call(
    control: Arc<dyn ControlPlane>,
    channel_id: &str,
    settings: &BridgedCallSettings,
    token: &CallToken,
) -> Result<BridgeEnd> {
    info!(channel = channel_id, "Running bridged call");

    // Always quit on hangup.
    let destroyed = control
        .subscribe(Subscription::ChannelDestroyed(channel_id.to_string()))
        .await
        .context("failed to subscribe to channel hangup")?;
    let hangup_watch = tokio::spawn(watch_hangup(destroyed, token.clone()));
    let deadline = token.cancel_after(settings.max_call, CancelReason::Deadline);

    let result = bridge_call(&control, channel_id, settings, token).await;

    token.cancel(CancelReason::Completed);
    hangup_watch.abort();
    deadline.abort();

    if let Err(e) = control.hangup(channel_id).await {
        debug!("failed to hang up {}: {:#}", channel_id, e);
    }

    match &result {
        Ok(end) => info!(channel = channel_id, ?end, "Bridged call ended"),
        Err(e) => warn!(channel = channel_id, "Bridged call failed: {:#}", e),
    }
    result
}

async fn bridge_call(
    control: &Arc<dyn ControlPlane>,
    channel_id: &str,
    settings: &BridgedCallSettings,
    token: &CallToken,
) -> Result<BridgeEnd> {
    control
        .answer(channel_id)
        .await
        .context("failed to answer call")?;

    tokio::select! {
        reason = token.cancelled() => return Ok(BridgeEnd::Cancelled(reason)),
        _ = tokio::time::sleep(settings.settle_delay) => {}
    }

    let orchestrator = BridgeOrchestrator::new(Arc::clone(control), settings.bridge.clone());
    let mut session = orchestrator
        .establish(token, channel_id, &settings.endpoint)
        .await?;

    let end = session.wait_for_end(token).await;
    if !session.quorum_achieved() {
        warn!(
            bridge_id = session.bridge_id(),
            "Call ended without an audio-processing leg"
        );
    }
    session.teardown().await;

    Ok(end)
}

/// Cancel `token` with `Hangup` once the channel's destroyed event arrives.
pub async fn watch_hangup(mut destroyed: mpsc::UnboundedReceiver<ControlEvent>, token: CallToken) {
    tokio::select! {
        event = destroyed.recv() => {
            if event.is_some() {
                token.cancel(CancelReason::Hangup);
            }
        }
        _ = token.cancelled() => {}
    }
}

/// Hand every call entering the application to `handler`, each on its own
/// task with a token derived from `token`.
///
/// Legs this service originated itself carry the `noop` argument and are
/// skipped.
pub async fn serve_calls<F, Fut>(
    control: Arc<dyn ControlPlane>,
    token: CallToken,
    handler: F,
) -> Result<()>
where
    F: Fn(String, CallToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut calls = control
        .subscribe(Subscription::NewCalls)
        .await
        .context("failed to subscribe to new calls")?;
    info!("Listening for calls to {}", control.application());

    loop {
        let event = tokio::select! {
            reason = token.cancelled() => {
                info!(?reason, "Call listener stopping");
                break;
            }
            event = calls.recv() => event,
        };

        match event {
            Some(ControlEvent::StasisStart { channel_id, args }) => {
                if args.iter().any(|arg| arg == LEG_APP_ARGS) {
                    debug!(channel = %channel_id, "Ignoring originated leg");
                    continue;
                }
                info!(channel = %channel_id, "New call");
                tokio::spawn(handler(channel_id, token.child()));
            }
            Some(_) => {}
            None => {
                warn!("Control plane event stream closed");
                break;
            }
        }
    }

    Ok(())
}
