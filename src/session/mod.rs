//! Loopback TCP session layer for observer connections.
//!
//! Observers connect to a single loopback listener, send newline-delimited
//! control commands, and (after `START`) receive every published event
//! record.
//!
//! # Architecture
//!
//! ```text
//! Host threads (call sites)              Engine runtime (tokio)
//! ┌──────────────────────┐              ┌──────────────────────────┐
//! │ CallHooks / Sampler  │  broadcast   │ SessionServer            │
//! │  EventSink::publish ─┼─────────────►│  TcpListener accept loop │
//! └──────────────────────┘  (queue per  │  ObserverConn per socket │
//!                            observer)  │   read task ─► handler   │
//!                                       │   write task ◄─ queue    │
//!                                       └────────────┬─────────────┘
//!                                                    │ ControlMessage
//!                                                    ▼
//!                                        CommandHandler (control plane)
//! ```
//!
//! [`ObserverSet`] owns the live connections and the joined subset; the
//! sharing flag is recomputed under the same lock on every join, leave and
//! eviction.

pub mod conn;
pub mod observers;
pub mod server;

pub use conn::ObserverConn;
pub use observers::ObserverSet;
pub use server::{CommandHandler, SessionServer};

use std::fmt;

use crate::protocol::EventRecord;

/// Destination for published event records.
///
/// Implemented by [`ObserverSet`]; the coordinator, hooks and sampler only
/// see this trait.
pub trait EventSink: Send + Sync {
    /// Publish `event`. Returns the number of observers it was queued for.
    /// Never fails; delivery problems are handled by the sink.
    fn publish(&self, event: &EventRecord) -> usize;

    /// Whether any observer is currently joined.
    fn is_sharing(&self) -> bool;
}

/// Identifier of one accepted connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObserverId(String);

impl ObserverId {
    /// Generate a unique id using a monotonic counter + random suffix.
    pub fn generate() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let rand: u16 = rand::random();
        Self(format!("observer:{seq:x}{rand:04x}"))
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
