//! # Relay Types - Connection Identity, Session States and Stats
//!
//! ## Session Lifecycle
//! ```text
//! Handshaking ──name line──▶ Active ──EOF / error / eviction──▶ Closed
//!      │                       │ ▲
//!      └──timeout / EOF──▶ Closed └─ valid MESG relayed, invalid MESG → MERR
//! ```
//!
//! ## Stats
//! `RelayStats` is a set of lock-free counters shared by every session. A
//! serializable snapshot is logged on shutdown and used by tests to assert
//! how many messages were relayed or rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use codec::RejectionKind;

/// Unique identifier for client connections
pub type ConnectionId = u64;

/// Per-connection protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Waiting for the display name line
    Handshaking,
    /// Registered, relaying messages
    Active,
    /// Cleanup finished or in progress; terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Handshaking => "handshaking",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Relay-wide counters
#[derive(Debug, Default)]
pub struct RelayStats {
    connections_accepted: AtomicU64,
    handshakes_completed: AtomicU64,
    messages_relayed: AtomicU64,
    deliveries: AtomicU64,
    checksum_rejections: AtomicU64,
    parity_rejections: AtomicU64,
    protocol_rejections: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatsSnapshot {
    pub connections_accepted: u64,
    pub handshakes_completed: u64,
    pub messages_relayed: u64,
    pub deliveries: u64,
    pub checksum_rejections: u64,
    pub parity_rejections: u64,
    pub protocol_rejections: u64,
    pub evictions: u64,
}

impl RelayStatsSnapshot {
    pub fn total_rejections(&self) -> u64 {
        self.checksum_rejections + self.parity_rejections + self.protocol_rejections
    }
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accept(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handshake(&self) {
        self.handshakes_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// One message relayed to `recipients` peers
    pub fn record_relay(&self, recipients: usize) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(recipients as u64, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, kind: RejectionKind) {
        let counter = match kind {
            RejectionKind::Checksum => &self.checksum_rejections,
            RejectionKind::Parity => &self.parity_rejections,
            RejectionKind::Protocol => &self.protocol_rejections,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.record_evictions(1);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            handshakes_completed: self.handshakes_completed.load(Ordering::Relaxed),
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            checksum_rejections: self.checksum_rejections.load(Ordering::Relaxed),
            parity_rejections: self.parity_rejections.load(Ordering::Relaxed),
            protocol_rejections: self.protocol_rejections.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counters() {
        let stats = RelayStats::new();
        stats.record_accept();
        stats.record_handshake();
        stats.record_relay(3);
        stats.record_relay(2);
        stats.record_rejection(RejectionKind::Checksum);
        stats.record_rejection(RejectionKind::Parity);
        stats.record_rejection(RejectionKind::Protocol);
        stats.record_eviction();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_accepted, 1);
        assert_eq!(snapshot.messages_relayed, 2);
        assert_eq!(snapshot.deliveries, 5);
        assert_eq!(snapshot.total_rejections(), 3);
        assert_eq!(snapshot.evictions, 1);
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Handshaking.to_string(), "handshaking");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }
}
