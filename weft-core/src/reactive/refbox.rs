//! Ref Boxes
//!
//! A `RefBox` is a single-value container with the same track/trigger
//! contract as one property: reading it inside an effect records a
//! dependency, writing a changed value notifies the dependents. It is
//! the reactive home for primitives that live outside any object.
//!
//! Stored inside an observed object, a ref box is auto-unwrapped on
//! property reads (arrays excepted), and a plain value written over it
//! assigns into its inner slot. Both behaviors live in the interception
//! layer; this type is the standalone handle.

use std::fmt;
use std::sync::Arc;

use super::graph::{Change, DepKey, TargetId};
use super::runtime::Runtime;
use crate::value::store::RefStore;
use crate::value::{has_changed, Value};

/// A single independently reactive slot.
///
/// Cheap to clone; clones are handles to the same slot.
pub struct RefBox {
    store: Arc<RefStore>,
    rt: Runtime,
}

impl RefBox {
    pub(crate) fn new(rt: Runtime, value: Value) -> Self {
        Self {
            store: Arc::new(RefStore::new(value.to_raw())),
            rt,
        }
    }

    /// Rebind a stored `Value::Ref` to a runtime, recovering a handle.
    pub fn bind(rt: &Runtime, value: &Value) -> Option<RefBox> {
        match value {
            Value::Ref(store) => Some(Self {
                store: Arc::clone(store),
                rt: rt.clone(),
            }),
            _ => None,
        }
    }

    fn target(&self) -> TargetId {
        TargetId(self.store.id())
    }

    /// Tracked read of the inner value.
    ///
    /// A composite inner value comes back as its mutable wrapper, like
    /// a deep property read.
    pub fn get(&self) -> Value {
        self.rt.graph().track(self.target(), DepKey::RefValue);
        let inner = self.store.value.read().expect("ref lock poisoned").clone();
        match &inner {
            Value::Composite(_) => self.rt.reactive(inner),
            _ => inner,
        }
    }

    /// Write the inner value, notifying dependents if it changed.
    pub fn set(&self, value: Value) {
        let incoming = value.to_raw();
        let changed = {
            let mut slot = self.store.value.write().expect("ref lock poisoned");
            let changed = has_changed(&slot, &incoming);
            *slot = incoming;
            changed
        };
        if changed {
            self.rt
                .graph()
                .trigger(self.target(), Change::Set(DepKey::RefValue));
        }
    }

    /// The storable form of this ref box.
    pub fn into_value(self) -> Value {
        Value::Ref(self.store)
    }

    /// The storable form, without consuming the handle.
    pub fn value(&self) -> Value {
        Value::Ref(Arc::clone(&self.store))
    }
}

impl Clone for RefBox {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            rt: self.rt.clone(),
        }
    }
}

impl fmt::Debug for RefBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefBox").field("id", &self.store.id()).finish()
    }
}
