//! Engine construction and teardown.
//!
//! The [`Engine`] owns everything the interception machinery needs: a tokio
//! runtime for the control channel, the observer and interceptor sets, the
//! reply coordinator and the optional lifecycle sampler. Hosts build one at
//! startup, hand it their [`HookHost`], and drop it on exit.
//!
//! Rust guideline compliant 2026-02

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::control::ControlPlane;
use crate::hooks::{CallHooks, HookHost, HookInstaller, InstallReport};
use crate::intercept::{InterceptionCoordinator, InterceptorSet};
use crate::protocol::EventRecord;
use crate::sampler::{LifecycleProbe, LifecycleSampler, NoArguments};
use crate::session::{CommandHandler, EventSink, ObserverSet, SessionServer};

/// Running interception engine.
pub struct Engine {
    config: Config,
    observers: Arc<ObserverSet>,
    interceptors: Arc<InterceptorSet>,
    coordinator: Arc<InterceptionCoordinator>,
    hooks: Arc<CallHooks>,
    server: Option<SessionServer>,
    sampler: Option<JoinHandle<()>>,
    /// Dropped last; every task above runs on it.
    runtime: Option<Runtime>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("local_addr", &self.local_addr())
            .field("observers", &self.observers.observer_count())
            .field("interceptors", &self.interceptors.len())
            .field("running", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Start the engine with no lifecycle probe.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the runtime cannot be built,
    /// or the control channel cannot be bound.
    pub fn start(config: Config) -> Result<Self> {
        Self::start_with_probe(config, Arc::new(NoArguments))
    }

    /// Start the engine, using `probe` to describe lifecycle arguments when
    /// the sampler is enabled.
    pub fn start_with_probe(config: Config, probe: Arc<dyn LifecycleProbe>) -> Result<Self> {
        config.validate()?;

        let runtime = Runtime::new().context("Failed to build tokio runtime")?;

        let observers = Arc::new(ObserverSet::new());
        let interceptors = Arc::new(InterceptorSet::new());
        let coordinator = Arc::new(InterceptionCoordinator::new(config.interception_timeout()));

        let control = Arc::new(ControlPlane::new(
            Arc::clone(&observers),
            Arc::clone(&interceptors),
            Arc::clone(&coordinator),
        ));
        let server = SessionServer::start(
            runtime.handle(),
            config.listen_addr(),
            Arc::clone(&observers),
            control as Arc<dyn CommandHandler>,
        )?;

        let sink = Arc::clone(&observers) as Arc<dyn EventSink>;
        let hooks = Arc::new(CallHooks::new(
            Arc::clone(&sink),
            Arc::clone(&interceptors),
            Arc::clone(&coordinator),
        ));

        let sampler = config.sampler.enabled.then(|| {
            LifecycleSampler::from_config(&config.sampler).spawn(runtime.handle(), sink, probe)
        });

        log::info!(
            "[Engine] Started on {} (interception timeout {:?})",
            server.local_addr(),
            coordinator.timeout()
        );

        Ok(Self {
            config,
            observers,
            interceptors,
            coordinator,
            hooks,
            server: Some(server),
            sampler,
            runtime: Some(runtime),
        })
    }

    /// Attach the shared hooks to every eligible method of `host`.
    pub fn install(&self, host: &dyn HookHost) -> InstallReport {
        HookInstaller::new(self.config.ignored_namespaces.clone()).install(host, &self.hooks)
    }

    /// The hook pair hosts call around each instrumented method.
    pub fn hooks(&self) -> Arc<CallHooks> {
        Arc::clone(&self.hooks)
    }

    /// Broadcast a host-defined record. Returns the number of observers it
    /// was queued for.
    pub fn publish(&self, event: &EventRecord) -> usize {
        self.observers.broadcast(event)
    }

    /// Address of the control channel, until shutdown.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(SessionServer::local_addr)
    }

    /// Methods currently registered for interception.
    pub fn interceptors(&self) -> &InterceptorSet {
        &self.interceptors
    }

    /// Whether at least one observer is joined.
    pub fn is_sharing(&self) -> bool {
        self.observers.is_sharing()
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the sampler and the control channel, release any blocked call
    /// site and close every connection. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
        self.coordinator.close();
        self.observers.close_all();

        // Does not block, so shutdown also works from inside async code.
        runtime.shutdown_background();
        log::info!("[Engine] Stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
