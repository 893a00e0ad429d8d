//! Composite Value Storage
//!
//! A `RawStore` is the single allocation behind every composite value
//! (object, array, map, set). It carries the data, a permanent identity,
//! and the sticky observability flags the classifier inspects.
//!
//! # Identity
//!
//! Every store draws a unique id from a process-wide atomic counter when
//! it is created. The id never changes and is never reused, so it is safe
//! to key registries and the dependency graph by it even after the store
//! has been dropped.
//!
//! # Flags
//!
//! The flags are one-way switches: once a store is frozen or marked, it
//! stays that way for the rest of its life. This matches the observation
//! system's contract that marker membership is sticky.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use indexmap::{IndexMap, IndexSet};

use super::Value;

/// Counter for generating unique observable identities.
///
/// Shared by composite stores, ref boxes, and computed values so that a
/// target id is unique across every kind of trackable thing.
static IDENTITY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique observable identity.
pub(crate) fn next_identity() -> u64 {
    IDENTITY_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// The structural kind of a composite value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// String-keyed record with insertion-ordered keys.
    Object,
    /// Index-addressed sequence.
    Array,
    /// Arbitrarily-keyed map with insertion-ordered entries.
    Map,
    /// Membership set with insertion-ordered members.
    Set,
}

/// The data held by a composite store, one variant per structural kind.
#[derive(Debug, Clone)]
pub(crate) enum StoreData {
    Object(IndexMap<std::sync::Arc<str>, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

impl StoreData {
    fn kind(&self) -> StoreKind {
        match self {
            StoreData::Object(_) => StoreKind::Object,
            StoreData::Array(_) => StoreKind::Array,
            StoreData::Map(_) => StoreKind::Map,
            StoreData::Set(_) => StoreKind::Set,
        }
    }
}

/// Backing storage for one composite value.
///
/// The observation layer never mutates anything here besides the data
/// behind the lock and the one-way flags; identity and kind are fixed at
/// construction. Nominally public because [`Value`] carries handles to
/// it; not nameable outside the crate.
#[derive(Debug)]
pub struct RawStore {
    id: u64,
    kind: StoreKind,
    pub(crate) data: RwLock<StoreData>,

    /// Storage-level immutability. A frozen store is never eligible for
    /// wrapping and rejects writes through existing wrappers.
    frozen: AtomicBool,
    /// Permanently excluded from observation (`mark_non_reactive`).
    skip: AtomicBool,
    /// Always resolves to the readonly wrapper (`mark_readonly`).
    readonly_hint: AtomicBool,
    /// Framework-internal object, never observable.
    internal: AtomicBool,
}

impl RawStore {
    pub(crate) fn new(data: StoreData) -> Self {
        Self {
            id: next_identity(),
            kind: data.kind(),
            data: RwLock::new(data),
            frozen: AtomicBool::new(false),
            skip: AtomicBool::new(false),
            readonly_hint: AtomicBool::new(false),
            internal: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn kind(&self) -> StoreKind {
        self.kind
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Relaxed)
    }

    pub(crate) fn freeze(&self) {
        self.frozen.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_skipped(&self) -> bool {
        self.skip.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_skip(&self) {
        self.skip.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_readonly_hinted(&self) -> bool {
        self.readonly_hint.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_readonly_hint(&self) {
        self.readonly_hint.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_internal(&self) -> bool {
        self.internal.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_internal(&self) {
        self.internal.store(true, Ordering::Relaxed);
    }
}

/// Backing storage for a ref box: a single reactive slot.
#[derive(Debug)]
pub struct RefStore {
    id: u64,
    pub(crate) value: RwLock<Value>,
}

impl RefStore {
    pub(crate) fn new(value: Value) -> Self {
        Self {
            id: next_identity(),
            value: RwLock::new(value),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique() {
        let a = RawStore::new(StoreData::Object(IndexMap::new()));
        let b = RawStore::new(StoreData::Array(Vec::new()));
        let r = RefStore::new(Value::Null);

        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), r.id());
        assert_ne!(a.id(), r.id());
    }

    #[test]
    fn kind_matches_data() {
        let store = RawStore::new(StoreData::Set(IndexSet::new()));
        assert_eq!(store.kind(), StoreKind::Set);
    }

    #[test]
    fn flags_are_sticky() {
        let store = RawStore::new(StoreData::Object(IndexMap::new()));

        assert!(!store.is_frozen());
        store.freeze();
        assert!(store.is_frozen());

        assert!(!store.is_skipped());
        store.mark_skip();
        assert!(store.is_skipped());

        assert!(!store.is_readonly_hinted());
        store.mark_readonly_hint();
        assert!(store.is_readonly_hinted());

        assert!(!store.is_internal());
        store.mark_internal();
        assert!(store.is_internal());
    }
}
