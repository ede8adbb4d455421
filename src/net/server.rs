//! Accept loop: turn accepted sockets into connection tasks.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::ProxyConfig;
use crate::lifecycle::Shutdown;
use crate::net::connection;
use crate::net::listener::{Listener, ListenerError};

/// The proxy's front door.
pub struct ProxyServer {
    config: Arc<ProxyConfig>,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Accept connections until shutdown triggers, then wait for every
    /// connection task to finish. Each accepted socket gets its own task
    /// owning all state for that connection pair.
    pub async fn run(&self, listener: Listener, shutdown: &Shutdown) -> Result<(), ListenerError> {
        let mut shutdown_rx = shutdown.subscribe();
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer, permit) = accepted?;
                    let config = Arc::clone(&self.config);
                    let conn_shutdown = shutdown.subscribe();
                    connections.spawn(async move {
                        // Permit held for the connection's lifetime.
                        let _permit = permit;
                        if let Err(e) = connection::handle_connection(stream, config, conn_shutdown).await {
                            tracing::warn!(peer_addr = %peer, error = %e, "Connection ended with error");
                        }
                    });
                }
                // Reap finished tasks so the set does not grow unbounded.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_rx.recv() => {
                    tracing::info!(
                        active = connections.len(),
                        "Shutdown signaled, no longer accepting connections"
                    );
                    break;
                }
            }
        }
        // Every connection task holds its own shutdown receiver and exits on
        // the same broadcast; wait for them here so teardown is orderly.
        while connections.join_next().await.is_some() {}
        tracing::info!("All connections drained");
        Ok(())
    }
}
