use anyhow::Result;

use super::client::NatsClient;
use super::messages::{ReplicaQueryMessage, ReplicaReplyMessage, ReplicaUpdateMessage};
use crate::scaling::{Deployment, ReplicaBackend};

/// Replica counts held by a cluster agent listening on
/// `scaling.replicas.get` / `scaling.replicas.set`
pub struct NatsReplicas {
    nats: NatsClient,
}

impl NatsReplicas {
    pub fn new(nats: NatsClient) -> Self {
        Self { nats }
    }
}

fn check(reply: &ReplicaReplyMessage) -> Result<()> {
    match &reply.error {
        Some(error) => anyhow::bail!("{}", error),
        None => Ok(()),
    }
}

#[async_trait::async_trait]
impl ReplicaBackend for NatsReplicas {
    async fn replicas(&self, deployment: &Deployment) -> Result<u32> {
        let reply: ReplicaReplyMessage = self
            .nats
            .request_json(
                "scaling.replicas.get".to_string(),
                &ReplicaQueryMessage {
                    namespace: deployment.namespace.clone(),
                    name: deployment.name.clone(),
                },
            )
            .await?;

        check(&reply)?;
        reply
            .replicas
            .ok_or_else(|| anyhow::anyhow!("no replica count for {}", deployment))
    }

    async fn set_replicas(&self, deployment: &Deployment, replicas: u32) -> Result<()> {
        let reply: ReplicaReplyMessage = self
            .nats
            .request_json(
                "scaling.replicas.set".to_string(),
                &ReplicaUpdateMessage {
                    namespace: deployment.namespace.clone(),
                    name: deployment.name.clone(),
                    replicas,
                },
            )
            .await?;

        check(&reply)
    }
}
