//! Periodic lifecycle sampler.
//!
//! Publishes one `LifecycleMessage` record per well-known callback name on
//! a fixed period, through the same [`EventSink`] the hooks use. It keeps no
//! state beyond the names and never touches the interceptor set.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SamplerConfig;
use crate::constants;
use crate::protocol::EventRecord;
use crate::session::EventSink;

/// Supplies the argument reported for a callback, if any.
pub trait LifecycleProbe: Send + Sync {
    /// Description of the argument `callback` would receive right now.
    fn sample(&self, callback: &str) -> Option<String>;
}

/// Probe that reports no arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArguments;

impl LifecycleProbe for NoArguments {
    fn sample(&self, _callback: &str) -> Option<String> {
        None
    }
}

/// Fixed list of callback names published every `interval`.
#[derive(Debug, Clone)]
pub struct LifecycleSampler {
    callbacks: Vec<String>,
    interval: Duration,
}

impl LifecycleSampler {
    /// Sampler over `callbacks`, ticking every `interval`.
    pub fn new(callbacks: Vec<String>, interval: Duration) -> Self {
        Self {
            callbacks,
            interval,
        }
    }

    /// Sampler configured from [`SamplerConfig`].
    pub fn from_config(config: &SamplerConfig) -> Self {
        Self::new(config.callbacks.clone(), config.interval())
    }

    /// Callback names published on each tick.
    pub fn callbacks(&self) -> &[String] {
        &self.callbacks
    }

    /// Publish one record per callback. Returns the number published;
    /// nothing is published while no observer is joined.
    pub fn tick(&self, sink: &dyn EventSink, probe: &dyn LifecycleProbe) -> usize {
        if !sink.is_sharing() {
            return 0;
        }
        for callback in &self.callbacks {
            let argument = probe
                .sample(callback)
                .unwrap_or_else(|| constants::NULL_SENTINEL.to_string());
            sink.publish(
                &EventRecord::new(constants::EVENT_LIFECYCLE)
                    .field("Method", callback)
                    .field("Argument", argument),
            );
        }
        self.callbacks.len()
    }

    /// Run the sampler on `runtime` until the returned task is aborted.
    pub fn spawn(
        self,
        runtime: &Handle,
        sink: Arc<dyn EventSink>,
        probe: Arc<dyn LifecycleProbe>,
    ) -> JoinHandle<()> {
        log::info!(
            "[Sampler] Publishing {} lifecycle callback(s) every {:?}",
            self.callbacks.len(),
            self.interval
        );
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick(sink.as_ref(), probe.as_ref());
            }
        })
    }
}
