//! Blocking interception: which methods block, and how a blocked call is
//! resolved against the controller's reply.
//!
//! - [`InterceptorSet`] - method identifiers flagged by `REGISTER_INTERCEPTOR:`
//! - [`InterceptionCoordinator`] - publish, wait with timeout, apply reply

pub mod coordinator;
pub mod registry;

pub use coordinator::{InterceptionCoordinator, Resolution};
pub use registry::InterceptorSet;
