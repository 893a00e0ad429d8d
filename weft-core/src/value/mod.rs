//! Dynamic Value Model
//!
//! This module defines [`Value`], the dynamic data type the observation
//! system operates on. A `Value` is either a scalar (null, bool, int,
//! float, string), a handle to a composite store (object, array, map,
//! set), a ref box, or an observed wrapper produced by the factory.
//!
//! # Identity
//!
//! Scalars compare structurally; composites, refs, and wrappers compare
//! by identity. Two structurally-equal but distinct objects are distinct
//! values everywhere identity matters: the registry, the dependency
//! graph, and map/set keys.
//!
//! # Equality and change detection
//!
//! Map/set key equality follows SameValueZero: `NaN` keys unify, signed
//! zeros unify. Change detection ([`has_changed`]) is stricter about
//! zeros (a `-0.0` written over `+0.0` counts as a change) but still
//! treats `NaN` as unchanged relative to `NaN`, so a redundant `NaN`
//! write never re-runs effects.
//!
//! # Raw access
//!
//! The accessors on `Value` itself (`get`, `insert`, `len`, ...) operate
//! on the raw storage and never touch the dependency graph. Tracked
//! access goes through an [`Observed`] wrapper obtained from a
//! [`Runtime`](crate::reactive::Runtime).

mod convert;
pub(crate) mod store;

pub use convert::TypeError;
pub use store::StoreKind;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use crate::reactive::observed::Observed;
use store::{RawStore, RefStore, StoreData};

/// A dynamic value: scalar, composite handle, ref box, or wrapper.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// Handle to a raw composite store.
    Composite(Arc<RawStore>),
    /// A ref box: a single independently reactive slot.
    Ref(Arc<RefStore>),
    /// An observed wrapper over a raw composite.
    Observed(Observed),
}

impl Value {
    /// Create an empty object.
    pub fn object() -> Self {
        Value::Composite(Arc::new(RawStore::new(StoreData::Object(IndexMap::new()))))
    }

    /// Create an object from key/value pairs.
    pub fn object_from<K, I>(entries: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect::<IndexMap<_, _>>();
        Value::Composite(Arc::new(RawStore::new(StoreData::Object(map))))
    }

    /// Create an empty array.
    pub fn array() -> Self {
        Value::Composite(Arc::new(RawStore::new(StoreData::Array(Vec::new()))))
    }

    /// Create an array from a sequence of values.
    pub fn array_from<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::Composite(Arc::new(RawStore::new(StoreData::Array(
            items.into_iter().collect(),
        ))))
    }

    /// Create an empty map.
    pub fn map() -> Self {
        Value::Composite(Arc::new(RawStore::new(StoreData::Map(IndexMap::new()))))
    }

    /// Create a map from key/value pairs.
    pub fn map_from<I: IntoIterator<Item = (Value, Value)>>(entries: I) -> Self {
        Value::Composite(Arc::new(RawStore::new(StoreData::Map(
            entries.into_iter().collect(),
        ))))
    }

    /// Create an empty set.
    pub fn set() -> Self {
        Value::Composite(Arc::new(RawStore::new(StoreData::Set(IndexSet::new()))))
    }

    /// Create a set from a sequence of members.
    pub fn set_from<I: IntoIterator<Item = Value>>(members: I) -> Self {
        Value::Composite(Arc::new(RawStore::new(StoreData::Set(
            members.into_iter().collect(),
        ))))
    }

    /// The structural kind of this value, if it is a composite.
    ///
    /// Wrappers report the kind of their underlying raw store.
    pub fn kind(&self) -> Option<StoreKind> {
        match self {
            Value::Composite(store) => Some(store.kind()),
            Value::Observed(obs) => Some(obs.kind()),
            _ => None,
        }
    }

    /// Whether this value is a ref box.
    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    /// Whether this value is a wrapper of the mutable family.
    pub fn is_reactive(&self) -> bool {
        matches!(self, Value::Observed(obs) if !obs.flavor().is_readonly())
    }

    /// Whether this value is a wrapper of the readonly family.
    pub fn is_readonly(&self) -> bool {
        matches!(self, Value::Observed(obs) if obs.flavor().is_readonly())
    }

    /// Strip one level of wrapping: an observed wrapper yields its raw
    /// composite, anything else yields itself unchanged.
    pub fn to_raw(&self) -> Value {
        match self {
            Value::Observed(obs) => Value::Composite(obs.raw_store()),
            other => other.clone(),
        }
    }

    /// Extract the wrapper, if this value is one.
    pub fn as_observed(&self) -> Option<&Observed> {
        match self {
            Value::Observed(obs) => Some(obs),
            _ => None,
        }
    }

    /// Consume the value and extract the wrapper, if it is one.
    pub fn into_observed(self) -> Option<Observed> {
        match self {
            Value::Observed(obs) => Some(obs),
            _ => None,
        }
    }

    /// Freeze a composite at the storage level.
    ///
    /// Frozen values are never eligible for wrapping and reject writes
    /// through wrappers that already exist. No-op on non-composites.
    pub fn freeze(&self) -> &Value {
        if let Value::Composite(store) = self {
            store.freeze();
        }
        self
    }

    /// Whether this composite is frozen. Always false for scalars.
    pub fn is_frozen(&self) -> bool {
        match self {
            Value::Composite(store) => store.is_frozen(),
            Value::Observed(obs) => obs.raw_store().is_frozen(),
            _ => false,
        }
    }

    pub(crate) fn composite_store(&self) -> Option<&Arc<RawStore>> {
        match self {
            Value::Composite(store) => Some(store),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Raw structural access (never tracked)
    // ------------------------------------------------------------------

    /// Read an entry from the raw storage. Never records a dependency.
    ///
    /// Absent entries and kind mismatches yield `Null`.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        let key = key.into();
        let Value::Composite(store) = self else {
            return Value::Null;
        };
        let data = store.data.read().expect("store lock poisoned");
        match (&*data, &key) {
            (StoreData::Object(map), Value::Str(k)) => {
                map.get(k.as_ref()).cloned().unwrap_or(Value::Null)
            }
            (StoreData::Array(items), Value::Int(i)) => {
                usize::try_from(*i)
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or(Value::Null)
            }
            (StoreData::Map(map), k) => map.get(k).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Write an entry into the raw storage. Never triggers effects.
    ///
    /// Frozen stores and kind mismatches are absorbed as no-ops.
    pub fn insert(&self, key: impl Into<Value>, value: Value) {
        let key = key.into();
        let Value::Composite(store) = self else {
            if cfg!(debug_assertions) {
                warn!("insert() called on a non-composite value");
            }
            return;
        };
        if store.is_frozen() {
            if cfg!(debug_assertions) {
                warn!(id = store.id(), "insert() called on a frozen value");
            }
            return;
        }
        let mut data = store.data.write().expect("store lock poisoned");
        match (&mut *data, key) {
            (StoreData::Object(map), Value::Str(k)) => {
                map.insert(k, value);
            }
            (StoreData::Array(items), Value::Int(i)) => {
                if let Ok(i) = usize::try_from(i) {
                    if i >= items.len() {
                        items.resize(i + 1, Value::Null);
                    }
                    items[i] = value;
                }
            }
            (StoreData::Map(map), k) => {
                map.insert(k, value);
            }
            _ => {
                if cfg!(debug_assertions) {
                    warn!(id = store.id(), "insert() key does not fit this container");
                }
            }
        }
    }

    /// Add a member to a raw set. Never triggers effects.
    pub fn add(&self, member: Value) {
        let Value::Composite(store) = self else { return };
        if store.is_frozen() {
            return;
        }
        let mut data = store.data.write().expect("store lock poisoned");
        if let StoreData::Set(members) = &mut *data {
            members.insert(member);
        }
    }

    /// Remove an entry or member from the raw storage. Never triggers
    /// effects. Array removal nulls the slot without shifting.
    pub fn remove(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        let Value::Composite(store) = self else {
            return false;
        };
        if store.is_frozen() {
            return false;
        }
        let mut data = store.data.write().expect("store lock poisoned");
        match (&mut *data, &key) {
            (StoreData::Object(map), Value::Str(k)) => map.shift_remove(k.as_ref()).is_some(),
            (StoreData::Array(items), Value::Int(i)) => match usize::try_from(*i) {
                Ok(i) if i < items.len() => {
                    items[i] = Value::Null;
                    true
                }
                _ => false,
            },
            (StoreData::Map(map), k) => map.shift_remove(k).is_some(),
            (StoreData::Set(members), m) => members.shift_remove(m),
            _ => false,
        }
    }

    /// Number of entries, elements, or members. Zero for scalars.
    pub fn len(&self) -> usize {
        let Value::Composite(store) = self else { return 0 };
        let data = store.data.read().expect("store lock poisoned");
        match &*data {
            StoreData::Object(map) => map.len(),
            StoreData::Array(items) => items.len(),
            StoreData::Map(map) => map.len(),
            StoreData::Set(members) => members.len(),
        }
    }

    /// Whether the composite is empty. True for scalars.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the raw storage contains the key (or member, for sets).
    pub fn contains(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        let Value::Composite(store) = self else {
            return false;
        };
        let data = store.data.read().expect("store lock poisoned");
        match (&*data, &key) {
            (StoreData::Object(map), Value::Str(k)) => map.contains_key(k.as_ref()),
            (StoreData::Array(items), Value::Int(i)) => {
                usize::try_from(*i).map(|i| i < items.len()).unwrap_or(false)
            }
            (StoreData::Map(map), k) => map.contains_key(k),
            (StoreData::Set(members), m) => members.contains(m),
            _ => false,
        }
    }

    /// Snapshot of the raw keys (object keys, array indices, map keys,
    /// or set members), in insertion order.
    pub fn keys(&self) -> Vec<Value> {
        let Value::Composite(store) = self else {
            return Vec::new();
        };
        let data = store.data.read().expect("store lock poisoned");
        match &*data {
            StoreData::Object(map) => map.keys().map(|k| Value::Str(k.clone())).collect(),
            StoreData::Array(items) => (0..items.len() as i64).map(Value::Int).collect(),
            StoreData::Map(map) => map.keys().cloned().collect(),
            StoreData::Set(members) => members.iter().cloned().collect(),
        }
    }
}

/// NaN-aware change detection.
///
/// Two `NaN`s are unchanged relative to each other; everything else uses
/// value equality, except that floats compare by bit pattern so a signed
/// zero flip counts as a change.
pub(crate) fn has_changed(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Float(a), Value::Float(b)) => {
            if a.is_nan() && b.is_nan() {
                false
            } else {
                a.to_bits() != b.to_bits()
            }
        }
        (a, b) => a != b,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // SameValueZero: NaNs unify, signed zeros unify.
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Composite(a), Value::Composite(b)) => a.id() == b.id(),
            (Value::Ref(a), Value::Ref(b)) => a.id() == b.id(),
            (Value::Observed(a), Value::Observed(b)) => a.same_wrapper(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => {
                // Normalize so Hash agrees with SameValueZero equality.
                let bits = if *f == 0.0 {
                    0u64
                } else if f.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    f.to_bits()
                };
                bits.hash(state);
            }
            Value::Str(s) => s.hash(state),
            Value::Composite(store) => store.id().hash(state),
            Value::Ref(store) => store.id().hash(state),
            Value::Observed(obs) => obs.raw_store().id().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Composite(store) => f
                .debug_struct("Composite")
                .field("kind", &store.kind())
                .field("id", &store.id())
                .field("len", &self.len())
                .finish(),
            Value::Ref(store) => f.debug_struct("Ref").field("id", &store.id()).finish(),
            Value::Observed(obs) => f
                .debug_struct("Observed")
                .field("flavor", &obs.flavor())
                .field("raw", &obs.raw_store().id())
                .finish(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Arc::from(v.as_str()))
    }
}
