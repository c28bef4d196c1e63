//! Method selection and the shared before/after hook pair.

use std::sync::Arc;

use crate::constants;
use crate::intercept::{InterceptionCoordinator, InterceptorSet};
use crate::protocol::event::render_list;
use crate::protocol::EventRecord;
use crate::session::EventSink;

use super::host::{CallContext, HookHost, MethodDescriptor};
use super::value::ArgValue;

/// The hook pair attached to every instrumented method.
///
/// One instance is shared by all wrapped methods; the per-call state lives
/// in the [`CallContext`] the host passes in.
pub struct CallHooks {
    sink: Arc<dyn EventSink>,
    interceptors: Arc<InterceptorSet>,
    coordinator: Arc<InterceptionCoordinator>,
}

impl std::fmt::Debug for CallHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHooks")
            .field("sharing", &self.sink.is_sharing())
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

impl CallHooks {
    /// Hooks publishing to `sink`, blocking on methods in `interceptors`.
    pub fn new(
        sink: Arc<dyn EventSink>,
        interceptors: Arc<InterceptorSet>,
        coordinator: Arc<InterceptionCoordinator>,
    ) -> Self {
        Self {
            sink,
            interceptors,
            coordinator,
        }
    }

    /// Runs before the original body. Returns `false` to skip the call.
    ///
    /// Cheap unless someone is observing and the method is registered for
    /// interception; then it blocks for at most the coordinator's timeout.
    pub fn before(&self, call: &mut CallContext) -> bool {
        if !self.sink.is_sharing() || !self.interceptors.matches(&call.method) {
            return true;
        }
        self.coordinator
            .intercept(call, self.sink.as_ref())
            .allows_call()
    }

    /// Runs after the original body. `result` is `None` for methods that
    /// return nothing.
    pub fn after(&self, call: &CallContext, result: Option<&ArgValue>) {
        if !self.sink.is_sharing() {
            return;
        }
        self.sink.publish(&method_call_event(call, result));
    }
}

fn method_call_event(call: &CallContext, result: Option<&ArgValue>) -> EventRecord {
    EventRecord::new(constants::EVENT_METHOD_CALL)
        .field("Type", "Postfix")
        .field("Method", &call.method.name)
        .field("DeclaringType", &call.method.declaring_type)
        .field("Instance", call.instance_label())
        .field("Arguments", render_list(&call.args))
        .field(
            "Result",
            result.map_or_else(|| constants::VOID_SENTINEL.to_string(), ToString::to_string),
        )
}

/// Counts from one installation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Methods now wrapped.
    pub attached: usize,
    /// Methods skipped by policy (ignored namespace, abstract, generic).
    pub filtered: usize,
    /// Methods the host failed to wrap.
    pub failed: usize,
}

/// Decides which methods to wrap and wraps them.
#[derive(Debug, Clone)]
pub struct HookInstaller {
    ignored_namespaces: Vec<String>,
}

impl HookInstaller {
    /// Installer skipping types whose namespace starts with any of
    /// `ignored_namespaces`.
    pub fn new(ignored_namespaces: Vec<String>) -> Self {
        Self { ignored_namespaces }
    }

    /// Whether `method` is eligible for instrumentation.
    pub fn should_instrument(&self, method: &MethodDescriptor) -> bool {
        if method.is_abstract || method.has_generic_parameters {
            return false;
        }
        match method.namespace.as_deref() {
            Some(ns) => !self
                .ignored_namespaces
                .iter()
                .any(|ignored| ns.starts_with(ignored.as_str())),
            None => true,
        }
    }

    /// Attach `hooks` to every eligible method `host` exposes.
    ///
    /// A method the host cannot wrap is logged and skipped.
    pub fn install(&self, host: &dyn HookHost, hooks: &Arc<CallHooks>) -> InstallReport {
        let mut report = InstallReport::default();

        for method in host.methods() {
            if !self.should_instrument(&method) {
                report.filtered += 1;
                continue;
            }
            match host.attach(&method, Arc::clone(hooks)) {
                Ok(()) => report.attached += 1,
                Err(e) => {
                    log::error!(
                        "[Hooks] Failed to patch method {} in type {}: {e:#}",
                        method.name,
                        method.declaring_type
                    );
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "[Hooks] Installed hooks on {} method(s) ({} filtered, {} failed)",
            report.attached,
            report.filtered,
            report.failed
        );
        report
    }
}
