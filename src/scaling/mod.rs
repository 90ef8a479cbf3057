//! Replica scaling action
//!
//! The dialog's side effect: set a deployment's replica count, touching the
//! backend only when the count actually changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A named, scalable resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Deployment {
    pub namespace: String,
    pub name: String,
}

impl Deployment {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Backend holding replica counts (e.g. a cluster API)
#[async_trait::async_trait]
pub trait ReplicaBackend: Send + Sync {
    async fn replicas(&self, deployment: &Deployment) -> Result<u32>;
    async fn set_replicas(&self, deployment: &Deployment, replicas: u32) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleOutcome {
    Unchanged,
    Updated { from: u32, to: u32 },
}

/// The scaling action as seen by the dialog
#[async_trait::async_trait]
pub trait Scaler: Send + Sync {
    async fn scale_to(&self, replicas: u32) -> Result<ScaleOutcome>;

    /// Human name of the scaled resource, used in prompts
    fn target_name(&self) -> &str;
}

/// Set-if-different scaler for one deployment
pub struct DeploymentScaler<B> {
    backend: B,
    deployment: Deployment,
}

impl<B: ReplicaBackend> DeploymentScaler<B> {
    pub fn new(backend: B, deployment: Deployment) -> Self {
        Self {
            backend,
            deployment,
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }
}

#[async_trait::async_trait]
impl<B: ReplicaBackend> Scaler for DeploymentScaler<B> {
    async fn scale_to(&self, replicas: u32) -> Result<ScaleOutcome> {
        let current = self
            .backend
            .replicas(&self.deployment)
            .await
            .with_context(|| format!("failed to retrieve current deployment {}", self.deployment))?;

        if current == replicas {
            info!("{} already at {} replicas", self.deployment, replicas);
            return Ok(ScaleOutcome::Unchanged);
        }

        self.backend
            .set_replicas(&self.deployment, replicas)
            .await
            .with_context(|| format!("failed to scale deployment {}", self.deployment))?;

        info!("Scaled {} from {} to {} replicas", self.deployment, current, replicas);
        Ok(ScaleOutcome::Updated {
            from: current,
            to: replicas,
        })
    }

    fn target_name(&self) -> &str {
        &self.deployment.name
    }
}

/// In-memory replica store for tests and dry runs
#[derive(Clone, Default)]
pub struct InMemoryReplicas {
    replicas: Arc<Mutex<HashMap<Deployment, u32>>>,
    updates: Arc<Mutex<Vec<(Deployment, u32)>>>,
    fail: Arc<Mutex<Option<String>>>,
}

impl InMemoryReplicas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replicas(self, deployment: Deployment, replicas: u32) -> Self {
        self.replicas.lock().unwrap().insert(deployment, replicas);
        self
    }

    /// Make every subsequent call fail with `message`.
    pub fn failing(self, message: &str) -> Self {
        *self.fail.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn get(&self, deployment: &Deployment) -> Option<u32> {
        self.replicas.lock().unwrap().get(deployment).copied()
    }

    pub fn updates(&self) -> Vec<(Deployment, u32)> {
        self.updates.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        match self.fail.lock().unwrap().as_ref() {
            Some(message) => anyhow::bail!("{}", message),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ReplicaBackend for InMemoryReplicas {
    async fn replicas(&self, deployment: &Deployment) -> Result<u32> {
        self.check()?;
        self.get(deployment)
            .with_context(|| format!("deployment {} not found", deployment))
    }

    async fn set_replicas(&self, deployment: &Deployment, replicas: u32) -> Result<()> {
        self.check()?;
        self.replicas
            .lock()
            .unwrap()
            .insert(deployment.clone(), replicas);
        self.updates
            .lock()
            .unwrap()
            .push((deployment.clone(), replicas));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asterisk() -> Deployment {
        Deployment::new("voip", "asterisk")
    }

    #[tokio::test]
    async fn test_scale_updates_when_different() {
        let backend = InMemoryReplicas::new().with_replicas(asterisk(), 2);
        let scaler = DeploymentScaler::new(backend.clone(), asterisk());

        let outcome = scaler.scale_to(5).await.unwrap();

        assert_eq!(outcome, ScaleOutcome::Updated { from: 2, to: 5 });
        assert_eq!(backend.get(&asterisk()), Some(5));
        assert_eq!(backend.updates(), vec![(asterisk(), 5)]);
    }

    #[tokio::test]
    async fn test_scale_is_noop_when_unchanged() {
        let backend = InMemoryReplicas::new().with_replicas(asterisk(), 3);
        let scaler = DeploymentScaler::new(backend.clone(), asterisk());

        assert_eq!(scaler.scale_to(3).await.unwrap(), ScaleOutcome::Unchanged);
        assert!(backend.updates().is_empty());
    }

    #[tokio::test]
    async fn test_scale_surfaces_backend_failure() {
        let backend = InMemoryReplicas::new()
            .with_replicas(asterisk(), 1)
            .failing("cluster unreachable");
        let scaler = DeploymentScaler::new(backend, asterisk());

        let err = scaler.scale_to(4).await.unwrap_err();
        assert!(format!("{:#}", err).contains("cluster unreachable"));
    }

    #[test]
    fn test_deployment_display() {
        assert_eq!(asterisk().to_string(), "voip/asterisk");
    }
}
