//! AudioSocket TCP server: one task per connection

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info, warn};

use crate::cancel::CallToken;
use crate::session::{handle_connection, CallServices};

pub struct AudioSocketServer {
    listener: TcpListener,
    services: Arc<CallServices>,
}

impl AudioSocketServer {
    pub async fn bind<A: ToSocketAddrs + std::fmt::Display>(
        addr: A,
        services: Arc<CallServices>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind listener to socket {}", addr))?;
        Ok(Self { listener, services })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` trips. In-flight calls get a
    /// token derived from `shutdown`, so they end with it.
    pub async fn serve(self, shutdown: CallToken) -> Result<()> {
        info!("Listening for AudioSocket connections on {}", self.local_addr()?);

        loop {
            let accepted = tokio::select! {
                reason = shutdown.cancelled() => {
                    info!(?reason, "AudioSocket server stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept new connection: {}", e);
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
            }
            info!("New AudioSocket connection from {}", peer);

            let services = Arc::clone(&self.services);
            let token = shutdown.child();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, services, token).await {
                    error!("Connection from {} failed: {:#}", peer, e);
                }
            });
        }
    }
}
