//! calltap - process-wide call interception with a loopback control channel.
//!
//! This crate instruments a host's methods so that calls can be observed,
//! reported to external observers over TCP, and (for methods a controller
//! registers) paused until the controller vetoes, rewrites or releases them.
//!
//! # Architecture
//!
//! The crate is organised around one owned [`Engine`]:
//!
//! - **Session** - loopback TCP server, observer membership, broadcast
//! - **Protocol** - control-line decoding and event record encoding
//! - **Intercept** - interceptor registry and the blocking reply coordinator
//! - **Hooks** - method selection, the before/after hook pair, host seam
//! - **Sampler** - periodic lifecycle messages
//!
//! # Modules
//!
//! - [`engine`] - construction and teardown
//! - [`hooks`] - [`HookHost`] trait and the call hooks
//! - [`session`] - control channel transport
//! - [`config`] - configuration loading

// Library modules
pub mod control;
pub mod engine;
pub mod hooks;
pub mod intercept;
pub mod protocol;
pub mod sampler;
pub mod session;

pub mod config;
pub mod constants;

// Re-export commonly used types
pub use config::{Config, SamplerConfig};
pub use engine::Engine;
pub use hooks::{ArgValue, CallContext, CallHooks, HookHost, Invocation, MethodDescriptor, Trampoline};
pub use intercept::{InterceptorSet, Resolution};
pub use protocol::{EventRecord, InterceptionReply};
pub use sampler::{LifecycleProbe, LifecycleSampler};
pub use session::{EventSink, ObserverSet};
