//! The set of methods eligible for blocking interception.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::hooks::MethodDescriptor;

/// Method identifiers currently flagged for the blocking path.
///
/// Mutated by `REGISTER_INTERCEPTOR:` / `UNREGISTER_INTERCEPTOR:` and read
/// on every before-hook. A method matches when either its qualified name
/// (`Foo.Bar`) or its bare name (`Bar`) is registered.
#[derive(Debug, Default)]
pub struct InterceptorSet {
    methods: Mutex<HashSet<String>>,
}

impl InterceptorSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identifier. Returns `false` if it was already registered.
    pub fn register(&self, method: &str) -> bool {
        let added = self.lock().insert(method.to_string());
        if added {
            log::info!("[Intercept] Registered interceptor: {method}");
        }
        added
    }

    /// Remove an identifier. Returns `false` if it was not registered.
    pub fn unregister(&self, method: &str) -> bool {
        let removed = self.lock().remove(method);
        if removed {
            log::info!("[Intercept] Unregistered interceptor: {method}");
        } else {
            log::debug!("[Intercept] Unregister for unknown interceptor: {method}");
        }
        removed
    }

    /// Whether calls to `method` take the blocking path.
    pub fn matches(&self, method: &MethodDescriptor) -> bool {
        let methods = self.lock();
        if methods.is_empty() {
            return false;
        }
        methods.contains(&method.name) || methods.contains(&method.qualified_name())
    }

    /// Whether this exact identifier is registered.
    pub fn contains(&self, method: &str) -> bool {
        self.lock().contains(method)
    }

    /// Registered identifiers, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.lock().iter().cloned().collect();
        methods.sort();
        methods
    }

    /// Number of registered identifiers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // A panic while holding this lock cannot leave the set half-updated.
        self.methods
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
