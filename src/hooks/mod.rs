//! Hook installation on top of the host's patching capability.
//!
//! The host enumerates methods and wraps them ([`HookHost`]); the
//! [`HookInstaller`] decides which ones to wrap and attaches one shared
//! [`CallHooks`] pair to each.
//!
//! Every wrapped call takes one of two paths:
//!
//! - **event-only** - the after-hook publishes a `MethodCall` record while
//!   anyone is observing; nothing blocks.
//! - **blocking** - for methods in the interceptor set, the before-hook asks
//!   the controller and may rewrite arguments or veto the call.

pub mod host;
pub mod installer;
pub mod trampoline;
pub mod value;

pub use host::{CallContext, HookHost, MethodDescriptor};
pub use installer::{CallHooks, HookInstaller, InstallReport};
pub use trampoline::{Invocation, Trampoline};
pub use value::{ArgValue, CoerceError};
