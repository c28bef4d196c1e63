//! Blocking request/response round-trip for one intercepted call.
//!
//! # State machine
//!
//! ```text
//!            begin()                 reply stored
//!   IDLE ───────────────► AWAITING ───────────────► RESOLVED ──┐
//!     ▲                      │                                  │
//!     │                      └── deadline ──────► TIMED_OUT ────┤
//!     └─────────────────────────────────────────────────────────┘
//! ```
//!
//! There is one reply slot process-wide. A call site that arrives while
//! another interception is awaiting queues on the same condition variable
//! until the slot is idle again, bounded by its own deadline. Each
//! round-trip gets a request id, published in the `Interceptor` event; a
//! reply that echoes a different id is stale and dropped.
//!
//! Rust guideline compliant 2026-02

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::constants;
use crate::hooks::{ArgValue, CallContext};
use crate::protocol::event::render_list;
use crate::protocol::{EventRecord, InterceptionReply};
use crate::session::EventSink;

/// Outcome of one blocking interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The controller answered; `overridden` arguments were rewritten.
    Resolved {
        /// Number of arguments replaced by reply values.
        overridden: usize,
    },
    /// The controller answered with an empty reply: skip the call.
    Vetoed,
    /// No answer in time (or the engine is shutting down): fail open.
    TimedOut,
}

impl Resolution {
    /// Whether the original call should run.
    pub fn allows_call(self) -> bool {
        !matches!(self, Resolution::Vetoed)
    }
}

#[derive(Debug, Default)]
struct Slot {
    /// Request id of the interception currently awaiting a reply.
    awaiting: Option<u64>,
    /// Last issued request id.
    last_request: u64,
    /// Reply for `awaiting`; `Some(None)` is an explicit veto.
    reply: Option<Option<InterceptionReply>>,
    closed: bool,
}

/// Resolves blocking interceptions against controller replies.
#[derive(Debug)]
pub struct InterceptionCoordinator {
    slot: Mutex<Slot>,
    ready: Condvar,
    timeout: Duration,
}

impl InterceptionCoordinator {
    /// Coordinator whose waits give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            ready: Condvar::new(),
            timeout,
        }
    }

    /// Configured reply timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a round-trip is currently waiting for its reply.
    pub fn is_awaiting(&self) -> bool {
        self.lock().awaiting.is_some()
    }

    /// Publish an `Interceptor` event for `call`, wait for the controller's
    /// reply and apply it to `call.args`.
    ///
    /// Blocks the calling thread for at most the configured timeout.
    pub fn intercept(&self, call: &mut CallContext, sink: &dyn EventSink) -> Resolution {
        let deadline = Instant::now() + self.timeout;

        let Some(request) = self.begin(deadline) else {
            return Resolution::TimedOut;
        };

        let delivered = sink.publish(&interceptor_event(request, call));
        log::debug!(
            "[Intercept] Request {request} for {} sent to {delivered} observer(s)",
            call.method.qualified_name()
        );

        match self.await_reply(request, deadline) {
            None => {
                log::warn!(
                    "[Intercept] No reply for {} within {:?}, allowing call",
                    call.method.qualified_name(),
                    self.timeout
                );
                Resolution::TimedOut
            }
            Some(None) => {
                log::info!("[Intercept] Call to {} vetoed", call.method.qualified_name());
                Resolution::Vetoed
            }
            Some(Some(reply)) => Resolution::Resolved {
                overridden: apply_overrides(&reply, &mut call.args),
            },
        }
    }

    /// Hand a controller reply to the waiting interception.
    ///
    /// `None` is an explicit veto. Returns `false` if the reply was dropped:
    /// nothing is awaiting, the reply names another request, or a reply was
    /// already delivered for this round-trip.
    pub fn deliver(&self, reply: Option<InterceptionReply>) -> bool {
        let mut slot = self.lock();
        let Some(awaiting) = slot.awaiting else {
            log::debug!("[Intercept] Reply arrived with no pending interception, dropped");
            return false;
        };
        if let Some(request) = reply.as_ref().and_then(InterceptionReply::request) {
            if request != awaiting {
                log::warn!(
                    "[Intercept] Stale reply for request {request} (awaiting {awaiting}), dropped"
                );
                return false;
            }
        }
        if slot.reply.is_some() {
            log::warn!("[Intercept] Duplicate reply for request {awaiting}, dropped");
            return false;
        }
        slot.reply = Some(reply);
        drop(slot);
        self.ready.notify_all();
        true
    }

    /// Release any waiter and make later interceptions fail open
    /// immediately.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Wait for the slot to be idle, then claim it.
    fn begin(&self, deadline: Instant) -> Option<u64> {
        let mut slot = self.lock();
        loop {
            if slot.closed {
                return None;
            }
            if slot.awaiting.is_none() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!("[Intercept] Reply slot busy until deadline, allowing call");
                return None;
            }
            slot = self.wait(slot, deadline - now);
        }

        slot.last_request += 1;
        let request = slot.last_request;
        slot.awaiting = Some(request);
        slot.reply = None;
        Some(request)
    }

    /// Wait for the reply to `request`, then return the slot to idle.
    fn await_reply(&self, request: u64, deadline: Instant) -> Option<Option<InterceptionReply>> {
        let mut slot = self.lock();
        while slot.reply.is_none() && !slot.closed {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            slot = self.wait(slot, deadline - now);
        }

        debug_assert_eq!(slot.awaiting, Some(request));
        let reply = slot.reply.take();
        slot.awaiting = None;
        drop(slot);
        self.ready.notify_all();
        reply
    }

    fn wait<'a>(&self, slot: MutexGuard<'a, Slot>, timeout: Duration) -> MutexGuard<'a, Slot> {
        self.ready
            .wait_timeout(slot, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the `Interceptor` event describing a pending call.
fn interceptor_event(request: u64, call: &CallContext) -> EventRecord {
    EventRecord::new(constants::EVENT_INTERCEPTOR)
        .field("Type", constants::EVENT_INTERCEPTOR)
        .field("Request", request)
        .field("Method", &call.method.name)
        .field("DeclaringType", &call.method.declaring_type)
        .field("Instance", call.instance_label())
        .field("Arguments", render_list(&call.args))
}

/// Overwrite each argument that has an `arg<i>` override, coerced to the
/// argument's runtime type. Values that do not coerce leave the original
/// argument in place.
fn apply_overrides(reply: &InterceptionReply, args: &mut [ArgValue]) -> usize {
    let mut overridden = 0;
    for (index, arg) in args.iter_mut().enumerate() {
        let Some(raw) = reply.override_for(index) else {
            continue;
        };
        match arg.coerce_from(raw) {
            Ok(value) => {
                *arg = value;
                overridden += 1;
            }
            Err(e) => {
                log::warn!("[Intercept] Ignoring override for arg{index}: {e}");
            }
        }
    }
    overridden
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::MethodDescriptor;
    use std::sync::{mpsc, Arc};
    use std::thread;

    /// Sink that records events and optionally answers the first one inline.
    struct ReplyingSink {
        coordinator: Arc<InterceptionCoordinator>,
        reply: Mutex<Option<Option<InterceptionReply>>>,
        events: Mutex<Vec<EventRecord>>,
    }

    impl ReplyingSink {
        fn new(coordinator: &Arc<InterceptionCoordinator>, reply: Option<Option<InterceptionReply>>) -> Self {
            Self {
                coordinator: Arc::clone(coordinator),
                reply: Mutex::new(reply),
                events: Mutex::new(Vec::new()),
            }
        }
    }

    impl EventSink for ReplyingSink {
        fn publish(&self, event: &EventRecord) -> usize {
            self.events.lock().unwrap().push(event.clone());
            if let Some(reply) = self.reply.lock().unwrap().take() {
                self.coordinator.deliver(reply);
            }
            1
        }

        fn is_sharing(&self) -> bool {
            true
        }
    }

    /// Sink that forwards events to the test thread.
    struct ChannelSink(Mutex<mpsc::Sender<EventRecord>>);

    impl EventSink for ChannelSink {
        fn publish(&self, event: &EventRecord) -> usize {
            let _ = self.0.lock().unwrap().send(event.clone());
            1
        }

        fn is_sharing(&self) -> bool {
            true
        }
    }

    fn call(args: Vec<ArgValue>) -> CallContext {
        CallContext::new(
            Arc::new(MethodDescriptor::new("Foo", "Bar")),
            Some("Foo".to_string()),
            args,
        )
    }

    fn coordinator(timeout_ms: u64) -> Arc<InterceptionCoordinator> {
        Arc::new(InterceptionCoordinator::new(Duration::from_millis(timeout_ms)))
    }

    #[test]
    fn test_timeout_fails_open_and_returns_to_idle() {
        let coord = coordinator(50);
        let silent = ReplyingSink::new(&coord, None);
        let mut c = call(vec![ArgValue::Int(1)]);

        let started = Instant::now();
        assert_eq!(coord.intercept(&mut c, &silent), Resolution::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(Resolution::TimedOut.allows_call());
        assert!(!coord.is_awaiting());

        // The next interception proceeds normally.
        let answering = ReplyingSink::new(&coord, Some(Some(InterceptionReply::new())));
        let mut c = call(vec![ArgValue::Int(1)]);
        assert_eq!(
            coord.intercept(&mut c, &answering),
            Resolution::Resolved { overridden: 0 }
        );
    }

    #[test]
    fn test_empty_reply_vetoes() {
        let coord = coordinator(2_000);
        let sink = ReplyingSink::new(&coord, Some(None));
        let mut c = call(vec![ArgValue::Int(1)]);

        let resolution = coord.intercept(&mut c, &sink);
        assert_eq!(resolution, Resolution::Vetoed);
        assert!(!resolution.allows_call());
        assert_eq!(c.args, vec![ArgValue::Int(1)]);
    }

    #[test]
    fn test_override_coerces_to_original_type() {
        let coord = coordinator(2_000);
        let reply = InterceptionReply::new().with_param("arg0", "42");
        let sink = ReplyingSink::new(&coord, Some(Some(reply)));
        let mut c = call(vec![ArgValue::Int(1), ArgValue::from("x")]);

        assert_eq!(
            coord.intercept(&mut c, &sink),
            Resolution::Resolved { overridden: 1 }
        );
        assert_eq!(c.args, vec![ArgValue::Int(42), ArgValue::from("x")]);
    }

    #[test]
    fn test_uncoercible_override_keeps_original() {
        let coord = coordinator(2_000);
        let reply = InterceptionReply::new()
            .with_param("arg0", "not a number")
            .with_param("arg1", "y")
            .with_param("arg5", "ignored");
        let sink = ReplyingSink::new(&coord, Some(Some(reply)));
        let mut c = call(vec![ArgValue::Int(1), ArgValue::from("x")]);

        assert_eq!(
            coord.intercept(&mut c, &sink),
            Resolution::Resolved { overridden: 1 }
        );
        assert_eq!(c.args, vec![ArgValue::Int(1), ArgValue::from("y")]);
    }

    #[test]
    fn test_interceptor_event_fields() {
        let coord = coordinator(2_000);
        let sink = ReplyingSink::new(&coord, Some(Some(InterceptionReply::new())));
        let mut c = call(vec![ArgValue::Int(1), ArgValue::from("x")]);
        coord.intercept(&mut c, &sink);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name(), "Interceptor");
        assert_eq!(event.get("Type"), Some("Interceptor"));
        assert_eq!(event.get("Request"), Some("1"));
        assert_eq!(event.get("Method"), Some("Bar"));
        assert_eq!(event.get("DeclaringType"), Some("Foo"));
        assert_eq!(event.get("Instance"), Some("Foo"));
        assert_eq!(event.get("Arguments"), Some("[1, x]"));
    }

    #[test]
    fn test_reply_without_pending_request_is_dropped() {
        let coord = coordinator(50);
        assert!(!coord.deliver(Some(InterceptionReply::new())));

        // A stray reply must not resolve a later interception.
        let silent = ReplyingSink::new(&coord, None);
        let mut c = call(vec![]);
        assert_eq!(coord.intercept(&mut c, &silent), Resolution::TimedOut);
    }

    #[test]
    fn test_stale_request_id_dropped() {
        let coord = coordinator(100);
        let stale = InterceptionReply::new().for_request(999);
        let sink = ReplyingSink::new(&coord, Some(Some(stale)));
        let mut c = call(vec![]);
        assert_eq!(coord.intercept(&mut c, &sink), Resolution::TimedOut);
    }

    #[test]
    fn test_matching_request_id_accepted() {
        let coord = coordinator(2_000);
        let reply = InterceptionReply::new().for_request(1).with_param("arg0", "7");
        let sink = ReplyingSink::new(&coord, Some(Some(reply)));
        let mut c = call(vec![ArgValue::UInt(0)]);
        assert_eq!(
            coord.intercept(&mut c, &sink),
            Resolution::Resolved { overridden: 1 }
        );
        assert_eq!(c.args, vec![ArgValue::UInt(7)]);
    }

    #[test]
    fn test_concurrent_interceptions_are_serialized() {
        let coord = coordinator(5_000);
        let (tx, rx) = mpsc::channel();
        let sink = Arc::new(ChannelSink(Mutex::new(tx)));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let coord = Arc::clone(&coord);
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    let mut c = call(vec![ArgValue::Int(i)]);
                    coord.intercept(&mut c, sink.as_ref())
                })
            })
            .collect();

        let first = rx.recv_timeout(Duration::from_secs(2)).expect("first request");
        // The second call site is queued behind the first.
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
        assert!(coord.deliver(Some(InterceptionReply::new())));

        let second = rx.recv_timeout(Duration::from_secs(2)).expect("second request");
        assert_ne!(first.get("Request"), second.get("Request"));
        assert!(coord.deliver(None));

        let mut results: Vec<Resolution> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort_by_key(|r| matches!(r, Resolution::Vetoed));
        assert_eq!(
            results,
            vec![Resolution::Resolved { overridden: 0 }, Resolution::Vetoed]
        );
    }

    #[test]
    fn test_close_releases_waiter() {
        let coord = coordinator(10_000);
        let (tx, rx) = mpsc::channel();
        let sink = Arc::new(ChannelSink(Mutex::new(tx)));

        let waiter = {
            let coord = Arc::clone(&coord);
            let sink = Arc::clone(&sink);
            thread::spawn(move || coord.intercept(&mut call(vec![]), sink.as_ref()))
        };

        rx.recv_timeout(Duration::from_secs(2)).expect("request published");
        let started = Instant::now();
        coord.close();
        assert_eq!(waiter.join().unwrap(), Resolution::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));

        // Closed coordinator fails open without publishing.
        assert_eq!(coord.intercept(&mut call(vec![]), sink.as_ref()), Resolution::TimedOut);
        assert!(rx.try_recv().is_err());
    }
}
