//! The host capability the installer builds on.
//!
//! The host process owns reflection and patching. It exposes the methods it
//! can instrument and a way to wrap one of them with a before/after hook
//! pair; everything else in this crate sits on top of that.

use std::sync::Arc;

use anyhow::Result;

use super::installer::CallHooks;
use super::value::ArgValue;

/// Identity of one instrumentable method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Method name (`Bar`).
    pub name: String,
    /// Fully qualified declaring type (`Game.Foo`).
    pub declaring_type: String,
    /// Namespace of the declaring type (`Game`), if it has one.
    pub namespace: Option<String>,
    /// Abstract methods have no body to wrap.
    pub is_abstract: bool,
    /// Methods with unresolved generic parameters cannot be wrapped.
    pub has_generic_parameters: bool,
}

impl MethodDescriptor {
    /// Concrete method `declaring_type.name`, namespace derived from the
    /// declaring type's leading path.
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        let declaring_type = declaring_type.into();
        let namespace = declaring_type
            .rsplit_once('.')
            .map(|(ns, _)| ns.to_string());
        Self {
            name: name.into(),
            declaring_type,
            namespace,
            is_abstract: false,
            has_generic_parameters: false,
        }
    }

    /// Mark the method abstract (builder style).
    #[must_use]
    pub fn abstract_method(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Mark the method as having open generic parameters (builder style).
    #[must_use]
    pub fn generic(mut self) -> Self {
        self.has_generic_parameters = true;
        self
    }

    /// `DeclaringType.Method`, the identifier controllers register.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_type, self.name)
    }
}

/// One invocation passing through the hooks.
///
/// Owned by the calling thread for the duration of the call. The blocking
/// path may overwrite entries of `args` before the original body runs.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Method being called.
    pub method: Arc<MethodDescriptor>,
    /// Runtime type name of the receiver; `None` for static calls.
    pub instance_type: Option<String>,
    /// Positional arguments.
    pub args: Vec<ArgValue>,
}

impl CallContext {
    /// Build a call context.
    pub fn new(
        method: Arc<MethodDescriptor>,
        instance_type: Option<String>,
        args: Vec<ArgValue>,
    ) -> Self {
        Self {
            method,
            instance_type,
            args,
        }
    }

    /// Receiver type for event records, `null` for static calls.
    pub fn instance_label(&self) -> &str {
        self.instance_type
            .as_deref()
            .unwrap_or(crate::constants::NULL_SENTINEL)
    }
}

/// The "wrap this callable" capability supplied by the host.
pub trait HookHost {
    /// Every method reachable through the host's type surface.
    fn methods(&self) -> Vec<MethodDescriptor>;

    /// Wrap `method` so every call runs `hooks.before` first and
    /// `hooks.after` once the body has returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot patch this particular method.
    fn attach(&self, method: &MethodDescriptor, hooks: Arc<CallHooks>) -> Result<()>;
}
