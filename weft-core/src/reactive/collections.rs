//! Collection Handlers
//!
//! The interception handlers for built-in collections (maps and sets).
//! Structurally distinct from the plain-object/array handlers in
//! [`observed`](super::observed): membership and entry reads track the
//! specific key, size and iteration track the synthetic iteration key,
//! and every structural write notifies iteration dependents alongside
//! the key's own.
//!
//! Keys are normalized to their raw form before lookup or tracking, so
//! a wrapper used as a key finds the entry stored under its raw value.

use tracing::warn;

use super::graph::{Change, DepKey};
use super::observed::Observed;
use crate::value::store::{StoreData, StoreKind};
use crate::value::{has_changed, Value};

impl Observed {
    /// Tracked map entry read. The value comes back wrapped per flavor.
    pub(crate) fn map_get(&self, key: Value) -> Value {
        self.track(DepKey::Prop(key.clone()));
        let found = {
            let data = self.raw().data.read().expect("store lock poisoned");
            match &*data {
                StoreData::Map(map) => map.get(&key).cloned(),
                _ => None,
            }
        };
        match found {
            Some(value) => self.wrap_nested(value),
            None => Value::Null,
        }
    }

    /// Tracked map entry write. Readonly and frozen guards are applied
    /// by the dispatching [`set`](Observed::set).
    pub(crate) fn map_set(&self, key: Value, value: Value) -> bool {
        let incoming = if self.flavor().is_shallow() {
            value
        } else {
            value.to_raw()
        };

        let (had, changed) = {
            let mut data = self.raw().data.write().expect("store lock poisoned");
            let StoreData::Map(map) = &mut *data else {
                return false;
            };
            let existing = map.get(&key).cloned();
            let changed = match &existing {
                Some(old) => has_changed(old, &incoming),
                None => true,
            };
            map.insert(key.clone(), incoming);
            (existing.is_some(), changed)
        };

        if !had {
            self.trigger(Change::Add(DepKey::Prop(key)));
        } else if changed {
            self.trigger(Change::Set(DepKey::Prop(key)));
        }
        true
    }

    /// Tracked membership check for maps and sets.
    pub(crate) fn collection_has(&self, key: Value) -> bool {
        self.track(DepKey::Prop(key.clone()));
        let data = self.raw().data.read().expect("store lock poisoned");
        match &*data {
            StoreData::Map(map) => map.contains_key(&key),
            StoreData::Set(members) => members.contains(&key),
            _ => false,
        }
    }

    /// Tracked removal for maps and sets. Guards applied by the
    /// dispatching [`delete`](Observed::delete).
    pub(crate) fn collection_delete(&self, key: Value) -> bool {
        let existed = {
            let mut data = self.raw().data.write().expect("store lock poisoned");
            match &mut *data {
                StoreData::Map(map) => map.shift_remove(&key).is_some(),
                StoreData::Set(members) => members.shift_remove(&key),
                _ => false,
            }
        };
        if existed {
            self.trigger(Change::Delete(DepKey::Prop(key)));
        }
        existed
    }

    /// Add a member to a set. Returns whether the member was new.
    pub fn add(&self, member: Value) -> bool {
        let member = member.to_raw();
        if self.flavor().is_readonly() {
            if cfg!(debug_assertions) {
                warn!(
                    store = self.raw().id(),
                    member = ?member,
                    "add through a readonly wrapper was ignored"
                );
            }
            return false;
        }
        if self.raw().is_frozen() {
            return false;
        }
        if self.kind() != StoreKind::Set {
            if cfg!(debug_assertions) {
                warn!(
                    store = self.raw().id(),
                    "add() called on a non-set wrapper"
                );
            }
            return false;
        }

        let inserted = {
            let mut data = self.raw().data.write().expect("store lock poisoned");
            match &mut *data {
                StoreData::Set(members) => members.insert(member.clone()),
                _ => false,
            }
        };
        if inserted {
            self.trigger(Change::Add(DepKey::Prop(member)));
        }
        inserted
    }

    /// Remove every entry or member, notifying the dependents of each
    /// drained key plus iteration dependents, deduplicated into one
    /// notification per effect.
    pub fn clear(&self) {
        if self.flavor().is_readonly() {
            if cfg!(debug_assertions) {
                warn!(
                    store = self.raw().id(),
                    "clear through a readonly wrapper was ignored"
                );
            }
            return;
        }
        if self.raw().is_frozen() {
            return;
        }

        let drained: Vec<DepKey> = {
            let mut data = self.raw().data.write().expect("store lock poisoned");
            match &mut *data {
                StoreData::Map(map) => map
                    .drain(..)
                    .map(|(k, _)| DepKey::Prop(k))
                    .collect(),
                StoreData::Set(members) => members
                    .drain(..)
                    .map(DepKey::Prop)
                    .collect(),
                _ => {
                    if cfg!(debug_assertions) {
                        warn!(
                            store = self.raw().id(),
                            "clear() called on a non-collection wrapper"
                        );
                    }
                    return;
                }
            }
        };
        if !drained.is_empty() {
            self.trigger(Change::Clear(drained));
        }
    }

    /// Tracked iteration: calls `f(value, key)` for each entry, with
    /// values and collection keys wrapped per flavor.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value)) {
        for (key, value) in self.entries() {
            f(&value, &key);
        }
    }
}
