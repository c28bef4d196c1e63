//! Application-wide constants for calltap.
//!
//! Centralizes defaults and limits so the config layer, the transport and
//! the coordinator agree on them. Constants are grouped by domain.
//!
//! # Categories
//!
//! - **Transport**: listening endpoint and framing limits
//! - **Interception**: blocking round-trip timing
//! - **Sampler**: lifecycle sampler cadence and callback names
//! - **Wire**: event names and sentinels used in outbound records

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

// ============================================================================
// Transport
// ============================================================================

/// Default bind address. Only loopback addresses are accepted.
pub const DEFAULT_BIND_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Default listening port for the control channel.
pub const DEFAULT_PORT: u16 = 6942;

/// Maximum length of a single inbound control line (1 MiB).
///
/// Longer lines are discarded up to the next newline and reported as a
/// protocol error; the connection stays open.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Encoded records queued per observer before it counts as stalled.
///
/// An observer whose queue is full when a record is published is evicted
/// like one whose connection broke.
pub const OBSERVER_QUEUE_CAPACITY: usize = 4096;

/// Back-off after a failed `accept()` before retrying.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// Interception
// ============================================================================

/// How long a blocking interception waits for the controller's reply
/// before failing open.
pub const DEFAULT_INTERCEPTION_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Sampler
// ============================================================================

/// Default period between lifecycle sampler ticks.
pub const DEFAULT_SAMPLER_INTERVAL: Duration = Duration::from_millis(100);

/// Well-known lifecycle callback names published by the sampler.
pub const DEFAULT_LIFECYCLE_CALLBACKS: &[&str] = &[
    "Awake",
    "Start",
    "Update",
    "FixedUpdate",
    "LateUpdate",
    "OnEnable",
    "OnDisable",
    "OnDestroy",
    "OnTriggerEnter",
    "OnTriggerExit",
    "OnCollisionEnter",
    "OnCollisionExit",
];

// ============================================================================
// Wire
// ============================================================================

/// Event name for blocking interception requests.
pub const EVENT_INTERCEPTOR: &str = "Interceptor";

/// Event name for completed method calls (after-hook).
pub const EVENT_METHOD_CALL: &str = "MethodCall";

/// Event name for lifecycle sampler ticks.
pub const EVENT_LIFECYCLE: &str = "LifecycleMessage";

/// Rendering of a missing instance or a null value.
pub const NULL_SENTINEL: &str = "null";

/// Rendering of the result of a method that returns nothing.
pub const VOID_SENTINEL: &str = "void";
