//! Telephony control plane bridged over NATS
//!
//! Commands are requests on `ari.<app>.<op>`; events for the application
//! arrive on `ari.<app>.events` and are fanned out to subscriptions.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::NatsClient;
use super::messages::{ControlCommand, ControlReplyMessage};
use crate::bridge::{
    ControlEvent, ControlPlane, DigitOptions, DigitResult, EventRouter, OriginateRequest,
    Subscription,
};

pub struct NatsControlPlane {
    nats: NatsClient,
    application: String,
    events: Arc<EventRouter>,
    pump: JoinHandle<()>,
}

impl NatsControlPlane {
    /// Subscribe to the application's events and start routing them.
    pub async fn connect(nats: NatsClient, application: &str) -> Result<Self> {
        let subscriber = nats
            .subscribe(format!("ari.{}.events", application))
            .await?;
        let events = Arc::new(EventRouter::new());
        let pump = tokio::spawn(route_events(subscriber, Arc::clone(&events)));
        info!("Control plane ready for application {}", application);

        Ok(Self {
            nats,
            application: application.to_string(),
            events,
            pump,
        })
    }

    async fn command(&self, command: ControlCommand) -> Result<ControlReplyMessage> {
        let subject = format!("ari.{}.{}", self.application, command.op());
        let reply: ControlReplyMessage = self.nats.request_json(subject, &command).await?;

        if !reply.ok {
            anyhow::bail!(
                "{} failed: {}",
                command.op(),
                reply.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(reply)
    }
}

impl Drop for NatsControlPlane {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn route_events(mut subscriber: async_nats::Subscriber, events: Arc<EventRouter>) {
    while let Some(message) = subscriber.next().await {
        match serde_json::from_slice::<ControlEvent>(&message.payload) {
            Ok(event) => {
                debug!("Control event: {:?}", event);
                events.dispatch(&event);
            }
            Err(e) => warn!("Ignoring unparseable control event: {}", e),
        }
    }
    warn!("Control plane event subscription ended");
}

#[async_trait::async_trait]
impl ControlPlane for NatsControlPlane {
    fn application(&self) -> &str {
        &self.application
    }

    async fn answer(&self, channel_id: &str) -> Result<()> {
        self.command(ControlCommand::Answer {
            channel_id: channel_id.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> Result<()> {
        self.command(ControlCommand::Hangup {
            channel_id: channel_id.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        subscription: Subscription,
    ) -> Result<mpsc::UnboundedReceiver<ControlEvent>> {
        Ok(self.events.subscribe(subscription))
    }

    async fn create_bridge(&self, bridge_id: &str) -> Result<()> {
        self.command(ControlCommand::CreateBridge {
            bridge_id: bridge_id.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn add_channel(&self, bridge_id: &str, channel_id: &str) -> Result<()> {
        self.command(ControlCommand::AddChannel {
            bridge_id: bridge_id.to_string(),
            channel_id: channel_id.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn remove_channel(&self, bridge_id: &str, channel_id: &str) -> Result<()> {
        self.command(ControlCommand::RemoveChannel {
            bridge_id: bridge_id.to_string(),
            channel_id: channel_id.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn originate(&self, request: OriginateRequest) -> Result<()> {
        self.command(ControlCommand::Originate(request)).await?;
        Ok(())
    }

    async fn play(&self, channel_id: &str, prompt: &str) -> Result<()> {
        self.command(ControlCommand::Play {
            channel_id: channel_id.to_string(),
            prompt: prompt.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn gather_digits(&self, channel_id: &str, options: DigitOptions) -> Result<DigitResult> {
        let reply = self
            .command(ControlCommand::GatherDigits {
                channel_id: channel_id.to_string(),
                options,
            })
            .await?;

        Ok(reply.digits.unwrap_or(DigitResult::Incomplete))
    }
}
