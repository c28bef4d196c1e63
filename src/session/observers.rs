//! Connected observers, the joined subset, and the sharing flag.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::TcpStream;

use super::conn::ObserverConn;
use super::server::CommandHandler;
use super::{EventSink, ObserverId};
use crate::protocol::EventRecord;

#[derive(Debug, Default)]
struct Members {
    /// Every open connection, joined or not.
    connections: HashMap<ObserverId, ObserverConn>,
    /// Connections that sent `START` and receive broadcasts.
    joined: HashSet<ObserverId>,
}

/// Live observer connections and the broadcast set.
///
/// Invariant: `is_sharing() == (observer_count() > 0)` after every
/// mutation. The flag is written only while the members lock is held and is
/// read lock-free on the hot path.
#[derive(Debug, Default)]
pub struct ObserverSet {
    members: Mutex<Members>,
    sharing: AtomicBool,
}

impl ObserverSet {
    /// Empty set, sharing off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted socket and start its read and write tasks.
    ///
    /// The tasks are spawned while the members lock is held, so the first
    /// line they hand to `handler` always finds the connection registered.
    /// Must be called from within the engine's tokio runtime.
    pub(crate) fn accept(
        self: &Arc<Self>,
        id: ObserverId,
        stream: TcpStream,
        handler: Arc<dyn CommandHandler>,
    ) {
        let mut members = self.lock();
        let conn = ObserverConn::spawn(id.clone(), stream, handler, Arc::clone(self));
        let replaced = members.connections.insert(id.clone(), conn);
        drop(members);
        if let Some(old) = replaced {
            log::warn!("[Session] Duplicate connection id {id}, closing previous");
            old.disconnect();
        }
    }

    /// Track a newly accepted connection. It receives nothing until it
    /// joins.
    pub fn add_connection(&self, conn: ObserverConn) {
        let id = conn.id().clone();
        let replaced = self.lock().connections.insert(id.clone(), conn);
        if let Some(old) = replaced {
            log::warn!("[Session] Duplicate connection id {id}, closing previous");
            old.disconnect();
        }
    }

    /// Add a connection to the broadcast set. Returns `false` if the
    /// connection is unknown (already closed).
    pub fn join(&self, id: &ObserverId) -> bool {
        let mut members = self.lock();
        if !members.connections.contains_key(id) {
            return false;
        }
        members.joined.insert(id.clone());
        self.recompute(&members);
        drop(members);
        log::info!("[Session] Event sharing started for {id}");
        true
    }

    /// Remove a connection from the broadcast set; the connection stays
    /// open. Returns `false` if it was not joined.
    pub fn leave(&self, id: &ObserverId) -> bool {
        let mut members = self.lock();
        let left = members.joined.remove(id);
        self.recompute(&members);
        drop(members);
        if left {
            log::info!("[Session] Event sharing stopped for {id}");
        }
        left
    }

    /// Forget a connection entirely and close it.
    pub fn remove(&self, id: &ObserverId) -> bool {
        let mut members = self.lock();
        members.joined.remove(id);
        let conn = members.connections.remove(id);
        self.recompute(&members);
        drop(members);
        match conn {
            Some(conn) => {
                conn.disconnect();
                true
            }
            None => false,
        }
    }

    /// Serialize `event` once and queue it for every joined observer.
    ///
    /// Observers whose queue is closed are evicted and disconnected; the
    /// rest still receive the event. Returns how many observers it was
    /// queued for.
    pub fn broadcast(&self, event: &EventRecord) -> usize {
        if !self.is_sharing() {
            return 0;
        }
        let encoded: Arc<[u8]> = Arc::from(event.encode().into_bytes());

        let mut members = self.lock();
        let mut delivered = 0;
        let mut broken = Vec::new();
        for id in &members.joined {
            match members.connections.get(id) {
                Some(conn) if conn.send(Arc::clone(&encoded)) => delivered += 1,
                _ => broken.push(id.clone()),
            }
        }

        let mut evicted = Vec::with_capacity(broken.len());
        for id in &broken {
            members.joined.remove(id);
            if let Some(conn) = members.connections.remove(id) {
                evicted.push(conn);
            }
        }
        if !broken.is_empty() {
            self.recompute(&members);
        }
        drop(members);

        for conn in evicted {
            log::warn!("[Session] Evicting broken observer {}", conn.id());
            conn.disconnect();
        }
        delivered
    }

    /// Close every connection and clear the set. Safe to call repeatedly.
    pub fn close_all(&self) {
        let mut members = self.lock();
        members.joined.clear();
        let conns: Vec<ObserverConn> = members.connections.drain().map(|(_, c)| c).collect();
        self.recompute(&members);
        drop(members);

        if !conns.is_empty() {
            log::info!("[Session] Closing {} connection(s)", conns.len());
        }
        for conn in conns {
            conn.disconnect();
        }
    }

    /// Whether any observer is joined.
    pub fn is_sharing(&self) -> bool {
        self.sharing.load(Ordering::SeqCst)
    }

    /// Number of joined observers.
    pub fn observer_count(&self) -> usize {
        self.lock().joined.len()
    }

    /// Number of open connections, joined or not.
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Whether `id` is in the broadcast set.
    pub fn is_joined(&self, id: &ObserverId) -> bool {
        self.lock().joined.contains(id)
    }

    fn recompute(&self, members: &Members) {
        self.sharing
            .store(!members.joined.is_empty(), Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Members> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for ObserverSet {
    fn publish(&self, event: &EventRecord) -> usize {
        self.broadcast(event)
    }

    fn is_sharing(&self) -> bool {
        ObserverSet::is_sharing(self)
    }
}
