//! # Client Registry
//!
//! Insertion-ordered membership shared by every session. All mutation and
//! iteration happen under one `parking_lot::Mutex`; no critical section
//! awaits or touches a socket. Delivery goes through snapshots of the
//! affected [`PeerHandle`]s, taken under the lock and used after it is
//! released. The one exception is the join announcement, which is queued
//! inside the insertion's critical section (queueing never blocks).
//!
//! Callers get names back, not handles, so no session holds another
//! member's sender longer than one fan-out.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::common::outbound::{Delivery, PeerHandle};
use crate::types::ConnectionId;

/// One registered member
#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub id: ConnectionId,
    pub name: Arc<str>,
    pub handle: PeerHandle,
}

/// Outcome of [`ClientRegistry::add`]
#[derive(Debug)]
pub struct Admission {
    /// Member names in join order, the newcomer last
    pub roster: Vec<Arc<str>>,
    /// Fan-out of the announcement to the members already present
    pub announced: BroadcastReport,
}

/// Outcome of [`ClientRegistry::remove`]
#[derive(Debug)]
pub struct Removal {
    pub entry: ClientEntry,
    /// Members still registered right after the removal
    pub remaining: Vec<ClientEntry>,
}

/// Counts from one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: usize,
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<Vec<ClientEntry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member, queue `announcement` for everyone else and return
    /// the roster including the newcomer
    ///
    /// Both happen under one lock, so a member joining at the same time sees
    /// the newcomer either in its roster or as an announcement, never both.
    /// An id that is already present keeps its position and takes the new
    /// name and handle.
    pub fn add(
        &self,
        id: ConnectionId,
        name: &str,
        handle: PeerHandle,
        announcement: &Bytes,
    ) -> Admission {
        let entry = ClientEntry {
            id,
            name: Arc::from(name),
            handle,
        };

        let mut clients = self.clients.lock();
        match clients.iter_mut().find(|c| c.id == id) {
            Some(existing) => *existing = entry,
            None => clients.push(entry),
        }

        let announced = deliver_all(
            clients.iter().filter(|c| c.id != id).map(|c| &c.handle),
            announcement,
        );
        let roster = clients.iter().map(|c| c.name.clone()).collect();
        Admission { roster, announced }
    }

    /// Unregister a member; `None` if it was not registered
    pub fn remove(&self, id: ConnectionId) -> Option<Removal> {
        let mut clients = self.clients.lock();
        let index = clients.iter().position(|c| c.id == id)?;
        let entry = clients.remove(index);
        Some(Removal {
            entry,
            remaining: clients.clone(),
        })
    }

    /// Members in join order
    pub fn snapshot(&self) -> Vec<ClientEntry> {
        self.clients.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Queue `frame` for every member except `except`
    pub fn broadcast(&self, frame: &Bytes, except: Option<ConnectionId>) -> BroadcastReport {
        let members = self.snapshot();
        deliver_all(
            members
                .iter()
                .filter(|c| Some(c.id) != except)
                .map(|c| &c.handle),
            frame,
        )
    }
}

/// Queue `frame` for each handle, counting deliveries and evictions
pub fn deliver_all<'a, I>(recipients: I, frame: &Bytes) -> BroadcastReport
where
    I: IntoIterator<Item = &'a PeerHandle>,
{
    let mut report = BroadcastReport::default();
    for handle in recipients {
        match handle.try_deliver(frame.clone()) {
            Delivery::Queued => report.delivered += 1,
            Delivery::Evicted => report.evicted += 1,
            Delivery::Closed => {}
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn peer(id: ConnectionId) -> (PeerHandle, mpsc::Receiver<Bytes>) {
        PeerHandle::channel(id, 4, CancellationToken::new())
    }

    fn join(registry: &ClientRegistry, id: ConnectionId, name: &str, handle: PeerHandle) -> Admission {
        registry.add(id, name, handle, &Bytes::from(format!("CONN|{}\n", name)))
    }

    #[test]
    fn test_add_returns_roster_in_join_order() {
        let registry = ClientRegistry::new();
        let (a, _ra) = peer(1);
        let (b, _rb) = peer(2);

        let admission = join(&registry, 1, "alice", a);
        assert_eq!(admission.roster.len(), 1);
        assert_eq!(admission.announced, BroadcastReport::default());

        let admission = join(&registry, 2, "bob", b);
        let names: Vec<&str> = admission.roster.iter().map(|n| &**n).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(admission.announced.delivered, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_names_allowed() {
        let registry = ClientRegistry::new();
        let (a, _ra) = peer(1);
        let (b, _rb) = peer(2);
        join(&registry, 1, "sam", a);
        join(&registry, 2, "sam", b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ClientRegistry::new();
        let (a, _ra) = peer(1);
        let (b, _rb) = peer(2);
        join(&registry, 1, "alice", a);
        join(&registry, 2, "bob", b);

        let removal = registry.remove(1).unwrap();
        assert_eq!(&*removal.entry.name, "alice");
        assert_eq!(removal.remaining.len(), 1);
        assert_eq!(removal.remaining[0].id, 2);

        assert!(registry.remove(1).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let registry = ClientRegistry::new();
        let (a, mut ra) = peer(1);
        let (b, mut rb) = peer(2);
        let (c, mut rc) = peer(3);
        join(&registry, 1, "alice", a);
        join(&registry, 2, "bob", b);
        join(&registry, 3, "carol", c);

        let frame = Bytes::from_static(b"MESG|hi\n");
        let report = registry.broadcast(&frame, Some(1));
        assert_eq!(report, BroadcastReport { delivered: 2, evicted: 0 });

        assert_eq!(ra.try_recv().unwrap(), Bytes::from_static(b"CONN|bob\n"));
        assert_eq!(ra.try_recv().unwrap(), Bytes::from_static(b"CONN|carol\n"));
        assert!(ra.try_recv().is_err());

        assert_eq!(rb.try_recv().unwrap(), Bytes::from_static(b"CONN|carol\n"));
        assert_eq!(rb.try_recv().unwrap(), frame);
        assert_eq!(rc.try_recv().unwrap(), frame);
    }

    #[test]
    fn test_newcomer_is_in_roster_or_announced_not_both() {
        let registry = ClientRegistry::new();
        let (a, mut ra) = peer(1);
        let (b, mut rb) = peer(2);

        let first = join(&registry, 1, "alice", a);
        let second = join(&registry, 2, "bob", b);

        // alice learns of bob through the announcement only
        assert!(!first.roster.iter().any(|n| &**n == "bob"));
        assert_eq!(ra.try_recv().unwrap(), Bytes::from_static(b"CONN|bob\n"));

        // bob learns of alice through the roster only
        assert!(second.roster.iter().any(|n| &**n == "alice"));
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn test_registry_keeps_only_its_own_senders() {
        let registry = ClientRegistry::new();
        let (a, mut ra) = peer(1);
        let (b, _rb) = peer(2);
        join(&registry, 1, "alice", a);
        join(&registry, 2, "bob", b);

        registry.remove(1);
        ra.try_recv().unwrap();
        // Every sender for alice's queue is gone once she is unregistered
        assert!(matches!(
            ra.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_broadcast_evicts_full_peer() {
        let registry = ClientRegistry::new();
        let slow_token = CancellationToken::new();
        // One slot is taken by the CONN for fast
        let (slow, _slow_rx) = PeerHandle::channel(1, 2, slow_token.clone());
        let (fast, mut fast_rx) = peer(2);
        join(&registry, 1, "slow", slow);
        join(&registry, 2, "fast", fast);

        let frame = Bytes::from_static(b"CONN|x\n");
        assert_eq!(registry.broadcast(&frame, None).delivered, 2);
        let report = registry.broadcast(&frame, None);
        assert_eq!(report, BroadcastReport { delivered: 1, evicted: 1 });
        assert!(slow_token.is_cancelled());

        assert_eq!(fast_rx.try_recv().unwrap(), frame);
        assert_eq!(fast_rx.try_recv().unwrap(), frame);
    }
}
