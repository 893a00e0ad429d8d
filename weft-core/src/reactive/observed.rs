//! Observed Wrappers
//!
//! An `Observed` is the interception-layer facade over exactly one raw
//! composite value. Every read through it records a dependency for the
//! currently running effect; every write notifies exactly the effects
//! that depend on what changed.
//!
//! Rust has no universal interception primitive, so the wrapper is an
//! explicit type implementing the observable-container capability set
//! (`get`/`set`/`has`/`delete`/`len`/`keys`/...) and dispatching on the
//! raw store's structural kind. Plain-object and array handlers live
//! here; the map/set handlers live in [`collections`](super::collections).
//!
//! # Flavors
//!
//! - `Mutable`: tracked reads, deep lazy wrapping, writes trigger.
//! - `Readonly`: writes are absorbed with a debug warning; reads do not
//!   track (the raw can only change through the mutable wrapper, whose
//!   own deep wrappers track).
//! - `Shallow*`: interception at the first property level only; nested
//!   composites come back raw and refs are not unwrapped.
//!
//! # Ref boxes
//!
//! Reading an object property that holds a ref box auto-unwraps it to
//! its inner value, tracking the ref's own dependency. Array elements
//! are exempt so index semantics stay intact. Writing a plain value over
//! a stored ref assigns into the ref's slot instead of replacing it.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::classify;
use super::graph::{Change, DepKey, TargetId};
use super::runtime::Runtime;
use crate::value::store::{RawStore, RefStore, StoreData, StoreKind};
use crate::value::{has_changed, Value};

/// The four wrapper flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Mutable,
    Readonly,
    ShallowMutable,
    ShallowReadonly,
}

/// Flavor family: which registry map a wrapper lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    Mutable,
    Readonly,
}

impl Flavor {
    /// Whether writes through this flavor are rejected.
    pub fn is_readonly(self) -> bool {
        matches!(self, Flavor::Readonly | Flavor::ShallowReadonly)
    }

    /// Whether interception stops at the first property level.
    pub fn is_shallow(self) -> bool {
        matches!(self, Flavor::ShallowMutable | Flavor::ShallowReadonly)
    }

    pub(crate) fn family(self) -> Family {
        if self.is_readonly() {
            Family::Readonly
        } else {
            Family::Mutable
        }
    }
}

/// Shared state of one wrapper: the raw store, the flavor, and the
/// runtime whose registry and graph it belongs to.
pub(crate) struct ObservedCore {
    pub(crate) raw: Arc<RawStore>,
    pub(crate) flavor: Flavor,
    pub(crate) rt: Runtime,
}

impl ObservedCore {
    pub(crate) fn new(raw: Arc<RawStore>, flavor: Flavor, rt: Runtime) -> Self {
        Self { raw, flavor, rt }
    }
}

/// An observed wrapper over a raw composite value.
///
/// Cheap to clone; clones are handles to the same wrapper. Produced by
/// the factory methods on [`Runtime`], never constructed directly.
pub struct Observed {
    core: Arc<ObservedCore>,
}

impl Observed {
    pub(crate) fn from_core(core: Arc<ObservedCore>) -> Self {
        Self { core }
    }

    pub fn flavor(&self) -> Flavor {
        self.core.flavor
    }

    /// The structural kind of the underlying raw value.
    pub fn kind(&self) -> StoreKind {
        self.core.raw.kind()
    }

    /// The runtime this wrapper belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.core.rt
    }

    pub(crate) fn raw_store(&self) -> Arc<RawStore> {
        Arc::clone(&self.core.raw)
    }

    pub(crate) fn raw(&self) -> &RawStore {
        &self.core.raw
    }

    /// The underlying raw value.
    pub fn to_raw(&self) -> Value {
        Value::Composite(self.raw_store())
    }

    /// Whether two handles refer to the same wrapper.
    pub(crate) fn same_wrapper(&self, other: &Observed) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    pub(crate) fn target(&self) -> TargetId {
        TargetId(self.core.raw.id())
    }

    /// Readonly flavors never track.
    fn tracks(&self) -> bool {
        !self.core.flavor.is_readonly()
    }

    pub(crate) fn track(&self, key: DepKey) {
        if self.tracks() {
            self.core.rt.graph().track(self.target(), key);
        }
    }

    pub(crate) fn trigger(&self, change: Change) {
        self.core.rt.graph().trigger(self.target(), change);
    }

    /// The synthetic key structural reads depend on: iteration for keyed
    /// containers, length for arrays.
    pub(crate) fn iteration_key(&self) -> DepKey {
        match self.kind() {
            StoreKind::Array => DepKey::Length,
            _ => DepKey::Iterate,
        }
    }

    /// Lazily wrap a nested read result according to this wrapper's
    /// flavor: readonly begets readonly, mutable begets mutable.
    /// Shallow flavors and ineligible values pass through raw.
    pub(crate) fn wrap_nested(&self, value: Value) -> Value {
        if self.core.flavor.is_shallow() || !classify::is_eligible(&value) {
            return value;
        }
        match self.core.flavor.family() {
            Family::Mutable => self.core.rt.reactive(value),
            Family::Readonly => self.core.rt.readonly(value),
        }
    }

    /// Read through a stored ref box, tracking its dependency.
    fn read_ref(&self, store: &Arc<RefStore>) -> Value {
        if self.tracks() {
            self.core
                .rt
                .graph()
                .track(TargetId(store.id()), DepKey::RefValue);
        }
        let inner = store.value.read().expect("ref lock poisoned").clone();
        self.wrap_nested(inner)
    }

    /// Assign into a stored ref box's inner slot.
    fn write_ref(&self, store: &Arc<RefStore>, value: Value) {
        let incoming = value.to_raw();
        let changed = {
            let mut slot = store.value.write().expect("ref lock poisoned");
            let changed = has_changed(&slot, &incoming);
            *slot = incoming;
            changed
        };
        if changed {
            self.core
                .rt
                .graph()
                .trigger(TargetId(store.id()), Change::Set(DepKey::RefValue));
        }
    }

    fn warn_readonly_write(&self, op: &str, key: &Value) {
        if cfg!(debug_assertions) {
            warn!(
                kind = ?self.kind(),
                store = self.core.raw.id(),
                key = ?key,
                "{op} through a readonly wrapper was ignored"
            );
        }
    }

    fn warn_frozen_write(&self, op: &str, key: &Value) {
        if cfg!(debug_assertions) {
            warn!(
                kind = ?self.kind(),
                store = self.core.raw.id(),
                key = ?key,
                "{op} on a frozen value was ignored"
            );
        }
    }

    // ------------------------------------------------------------------
    // Capability set
    // ------------------------------------------------------------------

    /// Tracked read of a property, element, or map entry.
    ///
    /// Absent entries yield `Null` but still record the dependency, so
    /// a later add of the key re-runs the reader.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        let key = key.into().to_raw();
        match self.kind() {
            StoreKind::Object => self.object_get(key),
            StoreKind::Array => self.array_get(key),
            StoreKind::Map => self.map_get(key),
            StoreKind::Set => {
                if cfg!(debug_assertions) {
                    warn!(store = self.core.raw.id(), "get() called on a set wrapper");
                }
                Value::Null
            }
        }
    }

    /// Tracked write of a property, element, or map entry.
    ///
    /// Returns whether the write was applied. Readonly flavors absorb
    /// the write (debug warning, no trigger, `false`).
    pub fn set(&self, key: impl Into<Value>, value: Value) -> bool {
        let key = key.into().to_raw();
        if self.core.flavor.is_readonly() {
            self.warn_readonly_write("set", &key);
            return false;
        }
        if self.core.raw.is_frozen() {
            self.warn_frozen_write("set", &key);
            return false;
        }
        match self.kind() {
            StoreKind::Object => self.object_set(key, value),
            StoreKind::Array => self.array_set(key, value),
            StoreKind::Map => self.map_set(key, value),
            StoreKind::Set => {
                if cfg!(debug_assertions) {
                    warn!(store = self.core.raw.id(), "set() called on a set wrapper");
                }
                false
            }
        }
    }

    /// Tracked existence check.
    pub fn has(&self, key: impl Into<Value>) -> bool {
        let key = key.into().to_raw();
        match self.kind() {
            StoreKind::Object => {
                let Value::Str(k) = &key else { return false };
                self.track(DepKey::Prop(key.clone()));
                let data = self.core.raw.data.read().expect("store lock poisoned");
                match &*data {
                    StoreData::Object(map) => map.contains_key(k.as_ref()),
                    _ => false,
                }
            }
            StoreKind::Array => {
                let Some(index) = as_index(&key) else {
                    return false;
                };
                self.track(DepKey::Prop(key.clone()));
                let data = self.core.raw.data.read().expect("store lock poisoned");
                match &*data {
                    StoreData::Array(items) => index < items.len(),
                    _ => false,
                }
            }
            StoreKind::Map | StoreKind::Set => self.collection_has(key),
        }
    }

    /// Tracked removal. Triggers dependents of the removed key and of
    /// the synthetic iteration key.
    pub fn delete(&self, key: impl Into<Value>) -> bool {
        let key = key.into().to_raw();
        if self.core.flavor.is_readonly() {
            self.warn_readonly_write("delete", &key);
            return false;
        }
        if self.core.raw.is_frozen() {
            self.warn_frozen_write("delete", &key);
            return false;
        }
        match self.kind() {
            StoreKind::Object => {
                let Value::Str(k) = &key else { return false };
                let existed = {
                    let mut data = self.core.raw.data.write().expect("store lock poisoned");
                    match &mut *data {
                        StoreData::Object(map) => map.shift_remove(k.as_ref()).is_some(),
                        _ => false,
                    }
                };
                if existed {
                    self.trigger(Change::Delete(DepKey::Prop(key)));
                }
                existed
            }
            StoreKind::Array => {
                // Deleting an element nulls the slot; elements never
                // shift, so the other indices stay valid.
                let Some(index) = as_index(&key) else {
                    return false;
                };
                let existed = {
                    let mut data = self.core.raw.data.write().expect("store lock poisoned");
                    match &mut *data {
                        StoreData::Array(items) if index < items.len() => {
                            items[index] = Value::Null;
                            true
                        }
                        _ => false,
                    }
                };
                if existed {
                    self.trigger(Change::Delete(DepKey::Prop(key)));
                }
                existed
            }
            StoreKind::Map | StoreKind::Set => self.collection_delete(key),
        }
    }

    /// Tracked count of entries, elements, or members.
    pub fn len(&self) -> usize {
        self.track(self.iteration_key());
        let data = self.core.raw.data.read().expect("store lock poisoned");
        match &*data {
            StoreData::Object(map) => map.len(),
            StoreData::Array(items) => items.len(),
            StoreData::Map(map) => map.len(),
            StoreData::Set(members) => members.len(),
        }
    }

    /// Tracked emptiness check.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked snapshot of keys (object keys, array indices, map keys,
    /// set members), in insertion order. Map keys and set members are
    /// wrapped per flavor.
    pub fn keys(&self) -> Vec<Value> {
        self.track(self.iteration_key());
        let snapshot = {
            let data = self.core.raw.data.read().expect("store lock poisoned");
            match &*data {
                StoreData::Object(map) => map.keys().map(|k| Value::Str(k.clone())).collect(),
                StoreData::Array(items) => (0..items.len() as i64).map(Value::Int).collect(),
                StoreData::Map(map) => map.keys().cloned().collect(),
                StoreData::Set(members) => members.iter().cloned().collect::<Vec<_>>(),
            }
        };
        match self.kind() {
            StoreKind::Map | StoreKind::Set => snapshot
                .into_iter()
                .map(|k| self.wrap_nested(k))
                .collect(),
            _ => snapshot,
        }
    }

    /// Tracked snapshot of values, wrapped per flavor. Object values
    /// unwrap stored refs the same way [`get`](Self::get) does.
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    /// Tracked snapshot of `(key, value)` pairs, wrapped per flavor.
    /// Sets yield each member as both key and value.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.track(self.iteration_key());
        let snapshot: Vec<(Value, Value)> = {
            let data = self.core.raw.data.read().expect("store lock poisoned");
            match &*data {
                StoreData::Object(map) => map
                    .iter()
                    .map(|(k, v)| (Value::Str(k.clone()), v.clone()))
                    .collect(),
                StoreData::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (Value::Int(i as i64), v.clone()))
                    .collect(),
                StoreData::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                StoreData::Set(members) => {
                    members.iter().map(|m| (m.clone(), m.clone())).collect()
                }
            }
        };
        let unwrap_refs = self.kind() == StoreKind::Object && !self.core.flavor.is_shallow();
        snapshot
            .into_iter()
            .map(|(k, v)| {
                let k = match self.kind() {
                    StoreKind::Map | StoreKind::Set => self.wrap_nested(k),
                    _ => k,
                };
                let v = match &v {
                    Value::Ref(store) if unwrap_refs => self.read_ref(store),
                    _ => self.wrap_nested(v),
                };
                (k, v)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Plain-object handlers
    // ------------------------------------------------------------------

    fn object_get(&self, key: Value) -> Value {
        let Value::Str(k) = &key else {
            return Value::Null;
        };
        self.track(DepKey::Prop(key.clone()));
        let found = {
            let data = self.core.raw.data.read().expect("store lock poisoned");
            match &*data {
                StoreData::Object(map) => map.get(k.as_ref()).cloned(),
                _ => None,
            }
        };
        match found {
            Some(Value::Ref(store)) if !self.core.flavor.is_shallow() => self.read_ref(&store),
            Some(value) => self.wrap_nested(value),
            None => Value::Null,
        }
    }

    fn object_set(&self, key: Value, value: Value) -> bool {
        let Value::Str(k) = &key else {
            return false;
        };
        let shallow = self.core.flavor.is_shallow();
        let incoming = if shallow { value } else { value.to_raw() };

        enum Outcome {
            RefAssign(Arc<RefStore>, Value),
            Added,
            Changed,
            Unchanged,
        }

        let outcome = {
            let mut data = self.core.raw.data.write().expect("store lock poisoned");
            let StoreData::Object(map) = &mut *data else {
                return false;
            };
            match map.get(k.as_ref()).cloned() {
                Some(Value::Ref(store)) if !shallow && !incoming.is_ref() => {
                    Outcome::RefAssign(store, incoming)
                }
                Some(existing) => {
                    let changed = has_changed(&existing, &incoming);
                    map.insert(k.clone(), incoming);
                    if changed {
                        Outcome::Changed
                    } else {
                        Outcome::Unchanged
                    }
                }
                None => {
                    map.insert(k.clone(), incoming);
                    Outcome::Added
                }
            }
        };

        match outcome {
            Outcome::RefAssign(store, incoming) => self.write_ref(&store, incoming),
            Outcome::Added => self.trigger(Change::Add(DepKey::Prop(key))),
            Outcome::Changed => self.trigger(Change::Set(DepKey::Prop(key))),
            Outcome::Unchanged => {}
        }
        true
    }

    // ------------------------------------------------------------------
    // Array handlers
    // ------------------------------------------------------------------

    fn array_get(&self, key: Value) -> Value {
        let Some(index) = as_index(&key) else {
            return Value::Null;
        };
        self.track(DepKey::Prop(key));
        let found = {
            let data = self.core.raw.data.read().expect("store lock poisoned");
            match &*data {
                StoreData::Array(items) => items.get(index).cloned(),
                _ => None,
            }
        };
        // No ref unwrapping for elements: index semantics stay intact.
        match found {
            Some(value) => self.wrap_nested(value),
            None => Value::Null,
        }
    }

    fn array_set(&self, key: Value, value: Value) -> bool {
        let Some(index) = as_index(&key) else {
            return false;
        };
        let incoming = if self.core.flavor.is_shallow() {
            value
        } else {
            value.to_raw()
        };

        let added = {
            let mut data = self.core.raw.data.write().expect("store lock poisoned");
            let StoreData::Array(items) = &mut *data else {
                return false;
            };
            if index < items.len() {
                let changed = has_changed(&items[index], &incoming);
                items[index] = incoming;
                if !changed {
                    return true;
                }
                false
            } else {
                items.resize(index, Value::Null);
                items.push(incoming);
                true
            }
        };

        if added {
            self.trigger(Change::Add(DepKey::Prop(key)));
        } else {
            self.trigger(Change::Set(DepKey::Prop(key)));
        }
        true
    }

    /// Append an element; returns the new length.
    pub fn push(&self, value: Value) -> usize {
        if self.core.flavor.is_readonly() {
            self.warn_readonly_write("push", &Value::Null);
            return self.untracked_len();
        }
        if self.core.raw.is_frozen() {
            self.warn_frozen_write("push", &Value::Null);
            return self.untracked_len();
        }
        let incoming = if self.core.flavor.is_shallow() {
            value
        } else {
            value.to_raw()
        };
        let index = {
            let mut data = self.core.raw.data.write().expect("store lock poisoned");
            let StoreData::Array(items) = &mut *data else {
                return 0;
            };
            items.push(incoming);
            items.len() - 1
        };
        self.trigger(Change::Add(DepKey::Prop(Value::Int(index as i64))));
        index + 1
    }

    /// Remove and return the last element, wrapped per flavor.
    pub fn pop(&self) -> Value {
        if self.core.flavor.is_readonly() {
            self.warn_readonly_write("pop", &Value::Null);
            return Value::Null;
        }
        if self.core.raw.is_frozen() {
            self.warn_frozen_write("pop", &Value::Null);
            return Value::Null;
        }
        let removed = {
            let mut data = self.core.raw.data.write().expect("store lock poisoned");
            let StoreData::Array(items) = &mut *data else {
                return Value::Null;
            };
            match items.pop() {
                Some(value) => Some((items.len(), value)),
                None => None,
            }
        };
        match removed {
            Some((index, value)) => {
                self.trigger(Change::Delete(DepKey::Prop(Value::Int(index as i64))));
                self.wrap_nested(value)
            }
            None => Value::Null,
        }
    }

    /// Set the array's length explicitly, padding with `Null` on growth.
    ///
    /// Notifies length dependents plus the dependents of every index at
    /// or beyond the new length.
    pub fn set_len(&self, new_len: usize) {
        if self.core.flavor.is_readonly() {
            self.warn_readonly_write("set_len", &Value::from(new_len));
            return;
        }
        if self.core.raw.is_frozen() {
            self.warn_frozen_write("set_len", &Value::from(new_len));
            return;
        }
        let changed = {
            let mut data = self.core.raw.data.write().expect("store lock poisoned");
            let StoreData::Array(items) = &mut *data else {
                return;
            };
            if items.len() == new_len {
                false
            } else {
                items.resize(new_len, Value::Null);
                true
            }
        };
        if changed {
            self.trigger(Change::Resize { new_len });
        }
    }

    fn untracked_len(&self) -> usize {
        self.to_raw().len()
    }
}

/// Interpret a key as an array index.
fn as_index(key: &Value) -> Option<usize> {
    match key {
        Value::Int(i) => usize::try_from(*i).ok(),
        _ => None,
    }
}

impl Clone for Observed {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl PartialEq for Observed {
    fn eq(&self, other: &Self) -> bool {
        self.same_wrapper(other)
    }
}

impl Eq for Observed {}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("kind", &self.kind())
            .field("flavor", &self.flavor())
            .field("raw", &self.core.raw.id())
            .finish()
    }
}
