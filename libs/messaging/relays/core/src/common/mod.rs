//! # Chat Relay Engine - Common Infrastructure
//!
//! This module provides the foundational components for the relay:
//! - `Relay` owning the registry, stats, validator and session supervision
//! - per-connection sessions (`session`) with their outbound writers
//! - the shared client registry and error types
//!
//! ## Architecture Role
//!
//! ```mermaid
//! graph TB
//!     Listener[TcpListener accept loop] --> Relay
//!     Relay -->|TaskTracker| S1[Session 1]
//!     Relay -->|TaskTracker| S2[Session 2]
//!     S1 --> Registry[(ClientRegistry)]
//!     S2 --> Registry
//!     Registry -->|try_send| W1[Writer 1]
//!     Registry -->|try_send| W2[Writer 2]
//! ```
//!
//! Sessions never block each other: fan-out goes through bounded per-peer
//! queues, and the registry lock is released before any I/O.

pub mod error;
pub mod outbound;
pub mod registry;
pub mod session;

use crate::common::error::RelayEngineError;
use crate::common::registry::ClientRegistry;
use crate::common::session::{handle_connection, SessionContext};
use crate::config::RelayConfig;
use crate::types::{ConnectionId, RelayStats, RelayStatsSnapshot};
use crate::validation::create_validator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// Chat relay server
///
/// Owns everything shared between sessions. Connections can come from the
/// TCP accept loop in [`Relay::run`] or be handed in directly with
/// [`Relay::serve_connection`], which is how tests drive in-memory streams.
pub struct Relay {
    config: RelayConfig,
    context: SessionContext,
    connection_counter: AtomicU64,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Relay {
    /// Create a relay; nothing is bound until [`Relay::bind`]
    pub fn new(config: RelayConfig) -> Self {
        let validator = create_validator(&config.validation);
        info!("🛡️ Validation policy: {}", validator.policy_name());

        let context = SessionContext {
            registry: Arc::new(ClientRegistry::new()),
            stats: Arc::new(RelayStats::new()),
            validator: Arc::from(validator),
            limits: config.limits.clone(),
        };

        Self {
            config,
            context,
            connection_counter: AtomicU64::new(0),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener, RelayEngineError> {
        let address = self.config.bind_address();
        TcpListener::bind(&address)
            .await
            .map_err(|e| RelayEngineError::Setup(format!("Failed to bind {}: {}", address, e)))
    }

    /// Start a supervised session for an accepted stream
    pub fn serve_connection<S>(&self, stream: S) -> ConnectionId
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let connection_id = self.connection_counter.fetch_add(1, Ordering::SeqCst);
        self.context.stats.record_accept();
        info!("📡 Connection {} established", connection_id);

        self.tracker.spawn(handle_connection(
            stream,
            connection_id,
            self.context.clone(),
            self.shutdown.child_token(),
        ));
        connection_id
    }

    /// Accept connections until [`Relay::shutdown`] is called
    ///
    /// Accept failures are logged and the loop continues. Returns after every
    /// session has finished its cleanup.
    pub async fn run(&self, listener: TcpListener) -> Result<(), RelayEngineError> {
        let local = listener.local_addr()?;
        info!("🚀 Starting chat relay");
        info!("✅ Relay listening on: {}", local);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            error!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                        }
                        let id = self.serve_connection(stream);
                        info!("🔌 Connection {} from {}", id, peer);
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        drop(listener);
        self.wait().await;
        Ok(())
    }

    /// Cancel every session and wait for their cleanup
    pub async fn shutdown(&self) {
        info!("🛑 Shutting down relay");
        self.shutdown.cancel();
        self.wait().await;
    }

    /// Token that stops the accept loop and all sessions when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        let stats = self.stats();
        info!(
            "📊 Relay stopped: {} connections, {} relayed, {} rejected, {} evicted",
            stats.connections_accepted,
            stats.messages_relayed,
            stats.total_rejections(),
            stats.evictions
        );
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.context.stats.snapshot()
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.context.registry
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}
