//! In-process [`HookHost`] for hosts that route calls through a dispatcher.
//!
//! Hosts without a patching layer of their own can define their methods on
//! a `Trampoline` and make every call through [`Trampoline::invoke`], which
//! runs the attached hooks around the body.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};

use super::host::{CallContext, HookHost, MethodDescriptor};
use super::installer::CallHooks;
use super::value::ArgValue;

#[derive(Debug)]
struct Entry {
    descriptor: Arc<MethodDescriptor>,
    hooks: Option<Arc<CallHooks>>,
}

/// Outcome of one call made through the trampoline.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The body ran with `args` (possibly rewritten by the controller).
    Completed {
        /// Arguments the body was called with.
        args: Vec<ArgValue>,
        /// Body's return value; `None` for methods that return nothing.
        result: Option<ArgValue>,
    },
    /// The controller vetoed the call; the body did not run. The after-hook
    /// still reports it with a `void` result.
    Vetoed,
}

/// Method table with hook slots.
#[derive(Debug, Default)]
pub struct Trampoline {
    methods: Mutex<HashMap<String, Entry>>,
}

impl Trampoline {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method. Redefining a method drops its attached hooks.
    pub fn define(&self, descriptor: MethodDescriptor) -> Arc<MethodDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.lock().insert(
            descriptor.qualified_name(),
            Entry {
                descriptor: Arc::clone(&descriptor),
                hooks: None,
            },
        );
        descriptor
    }

    /// Whether hooks are attached to `qualified_name`.
    pub fn is_attached(&self, qualified_name: &str) -> bool {
        self.lock()
            .get(qualified_name)
            .is_some_and(|entry| entry.hooks.is_some())
    }

    /// Call `qualified_name` with `args`, running attached hooks around
    /// `body`.
    ///
    /// The after-hook runs whether or not `body` did. Unknown or unhooked
    /// methods run `body` directly.
    pub fn invoke<F>(
        &self,
        qualified_name: &str,
        instance_type: Option<&str>,
        args: Vec<ArgValue>,
        body: F,
    ) -> Invocation
    where
        F: FnOnce(&[ArgValue]) -> Option<ArgValue>,
    {
        let target = self
            .lock()
            .get(qualified_name)
            .and_then(|entry| {
                entry
                    .hooks
                    .as_ref()
                    .map(|hooks| (Arc::clone(&entry.descriptor), Arc::clone(hooks)))
            });

        let Some((descriptor, hooks)) = target else {
            let result = body(&args);
            return Invocation::Completed { args, result };
        };

        let mut call = CallContext::new(descriptor, instance_type.map(str::to_string), args);
        if !hooks.before(&mut call) {
            hooks.after(&call, None);
            return Invocation::Vetoed;
        }
        let result = body(&call.args);
        hooks.after(&call, result.as_ref());
        Invocation::Completed {
            args: call.args,
            result,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.methods.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HookHost for Trampoline {
    fn methods(&self) -> Vec<MethodDescriptor> {
        let mut methods: Vec<MethodDescriptor> = self
            .lock()
            .values()
            .map(|entry| (*entry.descriptor).clone())
            .collect();
        methods.sort_by_key(MethodDescriptor::qualified_name);
        methods
    }

    fn attach(&self, method: &MethodDescriptor, hooks: Arc<CallHooks>) -> Result<()> {
        let mut methods = self.lock();
        let entry = methods
            .get_mut(&method.qualified_name())
            .ok_or_else(|| anyhow!("method {} is not defined", method.qualified_name()))?;
        entry.hooks = Some(hooks);
        Ok(())
    }
}
