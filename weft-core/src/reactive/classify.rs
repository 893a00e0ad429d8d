//! Observability Classifier
//!
//! Decides whether a value is eligible for wrapping. A value is eligible
//! iff it is a composite (object, array, map, or set) that is not
//! frozen, not permanently opted out, and not a framework-internal
//! object. The check runs on every wrap attempt, so it is a handful of
//! flag loads, never a traversal.

use tracing::warn;

use crate::value::store::RawStore;
use crate::value::Value;

/// Whether a composite store may be wrapped.
pub(crate) fn eligible(store: &RawStore) -> bool {
    !store.is_skipped() && !store.is_internal() && !store.is_frozen()
}

/// Whether a value may be wrapped. Non-composites never are.
pub(crate) fn is_eligible(value: &Value) -> bool {
    match value.composite_store() {
        Some(store) => eligible(store),
        None => false,
    }
}

/// Mark a value so that requesting a mutable wrapper for it always
/// yields the readonly wrapper instead. Sticky for the value's lifetime.
pub fn mark_readonly(value: Value) -> Value {
    match value.composite_store() {
        Some(store) => store.mark_readonly_hint(),
        None => {
            if cfg!(debug_assertions) {
                warn!("mark_readonly() called on a non-composite value");
            }
        }
    }
    value
}

/// Permanently exclude a value from observation.
pub fn mark_non_reactive(value: Value) -> Value {
    match value.composite_store() {
        Some(store) => store.mark_skip(),
        None => {
            if cfg!(debug_assertions) {
                warn!("mark_non_reactive() called on a non-composite value");
            }
        }
    }
    value
}

/// Mark a value as framework-internal, so the framework's own node and
/// instance objects can never become observable.
pub fn mark_internal(value: Value) -> Value {
    if let Some(store) = value.composite_store() {
        store.mark_internal();
    }
    value
}
