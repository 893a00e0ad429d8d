//! Reactive Runtime
//!
//! The runtime is one reactive universe: it owns the identity registry
//! and the dependency graph, and its factory methods are the only way
//! wrappers come into existence. Handing the registry and graph to an
//! explicitly-constructed object (instead of process-wide statics) lets
//! tests host several isolated universes side by side.
//!
//! # Wrapper factory
//!
//! Four entry points produce the four wrapper flavors. All of them
//! funnel into one creation routine that guarantees idempotent,
//! collision-free wrapping:
//!
//! 1. Already registered → the existing wrapper comes back (identity
//!    stability: same raw, same family, same wrapper object).
//! 2. Ineligible → the raw value comes back unchanged.
//! 3. Otherwise a wrapper is constructed, registered, and returned.
//!
//! Precedence rules: a readonly wrapper is never silently downgraded
//! (`reactive` of one returns it unchanged); `readonly` of a mutable
//! wrapper collapses to readonly-of-raw, never a double wrap; values
//! marked readonly always resolve to the readonly flavor; ref boxes are
//! never re-wrapped.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::classify;
use super::computed::Computed;
use super::graph::DepGraph;
use super::observed::{Flavor, Observed, ObservedCore};
use super::refbox::RefBox;
use super::registry::Registry;
use crate::value::store::RawStore;
use crate::value::Value;

pub(crate) struct RuntimeInner {
    registry: Registry,
    graph: DepGraph,
}

/// One reactive universe.
///
/// Cheap to clone; clones share the universe. Wrappers hold a handle to
/// the runtime that created them, so state wrapped by one runtime never
/// leaks dependencies into another.
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                registry: Registry::new(),
                graph: DepGraph::new(),
            }),
        }
    }

    pub(crate) fn graph(&self) -> &DepGraph {
        &self.inner.graph
    }

    /// Wrap a value in the deep mutable flavor.
    ///
    /// Readonly wrappers pass through unchanged (readonly takes
    /// precedence), as do ref boxes; values marked readonly resolve to
    /// [`readonly`](Self::readonly); non-composites come back unchanged
    /// with a debug warning.
    pub fn reactive(&self, value: Value) -> Value {
        match &value {
            Value::Observed(_) => value,
            Value::Ref(_) => value,
            Value::Composite(store) => {
                if store.is_readonly_hinted() {
                    return self.readonly(value);
                }
                let store = Arc::clone(store);
                self.create(store, Flavor::Mutable)
            }
            _ => {
                if cfg!(debug_assertions) {
                    warn!("reactive() called on a non-composite value; returned unchanged");
                }
                value
            }
        }
    }

    /// Wrap a value in the deep readonly flavor.
    ///
    /// A mutable wrapper is unwrapped to its raw first, so
    /// readonly-of-reactive is readonly-of-raw.
    pub fn readonly(&self, value: Value) -> Value {
        self.readonly_flavored(value, Flavor::Readonly)
    }

    /// Wrap a value in the shallow mutable flavor: interception at the
    /// first property level only, no ref unwrapping, no deep wrapping.
    pub fn shallow_reactive(&self, value: Value) -> Value {
        match &value {
            Value::Observed(_) => value,
            Value::Ref(_) => value,
            Value::Composite(store) => {
                if store.is_readonly_hinted() {
                    return self.shallow_readonly(value);
                }
                let store = Arc::clone(store);
                self.create(store, Flavor::ShallowMutable)
            }
            _ => value,
        }
    }

    /// Wrap a value in the shallow readonly flavor.
    pub fn shallow_readonly(&self, value: Value) -> Value {
        self.readonly_flavored(value, Flavor::ShallowReadonly)
    }

    fn readonly_flavored(&self, value: Value, flavor: Flavor) -> Value {
        // Readonly-of-reactive collapses to readonly-of-raw.
        let value = match &value {
            Value::Observed(obs) if !obs.flavor().is_readonly() => {
                Value::Composite(obs.raw_store())
            }
            _ => value,
        };
        match &value {
            Value::Observed(_) => value,
            Value::Composite(store) => {
                let store = Arc::clone(store);
                self.create(store, flavor)
            }
            _ => value,
        }
    }

    /// The generic creation routine behind all four factory methods.
    fn create(&self, store: Arc<RawStore>, flavor: Flavor) -> Value {
        let family = flavor.family();
        if let Some(core) = self.inner.registry.lookup(store.id(), family) {
            return Value::Observed(Observed::from_core(core));
        }
        if !classify::eligible(&store) {
            return Value::Composite(store);
        }
        let core = Arc::new(ObservedCore::new(Arc::clone(&store), flavor, self.clone()));
        self.inner.registry.register(store.id(), &core, family);
        Value::Observed(Observed::from_core(core))
    }

    /// Create a ref box holding the given value.
    pub fn create_ref(&self, value: Value) -> RefBox {
        RefBox::new(self.clone(), value)
    }

    /// Create a lazily cached derived value.
    pub fn computed<F>(&self, getter: F) -> Computed
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Computed::new(self.clone(), getter)
    }
}

impl Clone for Runtime {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}
