//! Dependency Graph
//!
//! The track/trigger engine at the center of the reactivity core. It
//! maps `(target identity, dependency key)` pairs to the set of effects
//! that read them, and notifies exactly those effects when the pair is
//! written.
//!
//! # How It Works
//!
//! 1. When a wrapped value is read inside a running effect, the
//!    interception layer calls [`DepGraph::track`]. The graph records
//!    the membership bidirectionally: the dependency set gains the
//!    effect, and the effect's dep list gains the set.
//!
//! 2. When a wrapped value is written, the interception layer calls
//!    [`DepGraph::trigger`] with a [`Change`] describing what happened.
//!    The graph collects the union of affected dependency sets,
//!    deduplicates effects, and notifies each one — through its
//!    scheduler if it has one, synchronously otherwise.
//!
//! Effects are held by weak reference only: the graph never extends an
//! effect's lifetime, and dead entries are pruned as they are seen.
//!
//! # Ordering
//!
//! Dependency sets are insertion-ordered maps, so for a given trigger
//! call effects are notified in the order they first tracked the
//! affected pairs, deduplicated. All notification happens before the
//! trigger call returns; batching across writes is the business of
//! schedulers, not the graph.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;

use super::context;
use super::effect::{Effect, EffectId, EffectInner};
use crate::value::Value;

/// Identity of a trackable target: a composite store, a ref box, or a
/// computed value. Counter-issued, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TargetId(pub(crate) u64);

/// One trackable aspect of a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    /// A single property, element, entry, or member.
    Prop(Value),
    /// Synthetic iteration key: "the set of keys changed".
    Iterate,
    /// Array length (also what array iteration depends on).
    Length,
    /// The single slot of a ref box or computed value.
    RefValue,
}

/// A write, described precisely enough to collect its dependents.
#[derive(Debug)]
pub(crate) enum Change {
    /// An existing entry's value changed.
    Set(DepKey),
    /// A new key/element/member appeared.
    Add(DepKey),
    /// An entry was removed.
    Delete(DepKey),
    /// Every entry was removed; carries the drained keys.
    Clear(Vec<DepKey>),
    /// An array's length was set explicitly.
    Resize { new_len: usize },
}

/// The set of effects depending on one `(target, key)` pair.
///
/// Insertion-ordered and deduplicated by effect id. Holds weak
/// references so membership never keeps an effect alive.
pub(crate) struct DepSet {
    effects: RwLock<IndexMap<EffectId, Weak<EffectInner>>>,
}

impl DepSet {
    fn new() -> Self {
        Self {
            effects: RwLock::new(IndexMap::new()),
        }
    }

    /// Add an effect; returns false if it was already a member.
    fn insert(&self, effect: &Arc<EffectInner>) -> bool {
        let mut effects = self.effects.write().expect("dep set lock poisoned");
        if effects.contains_key(&effect.id()) {
            return false;
        }
        effects.insert(effect.id(), Arc::downgrade(effect));
        true
    }

    pub(crate) fn remove(&self, id: EffectId) {
        self.effects
            .write()
            .expect("dep set lock poisoned")
            .shift_remove(&id);
    }

    /// Snapshot the live members in insertion order, pruning dead ones.
    fn snapshot(&self) -> Vec<(EffectId, Arc<EffectInner>)> {
        let mut effects = self.effects.write().expect("dep set lock poisoned");
        effects.retain(|_, weak| weak.upgrade().is_some());
        effects
            .iter()
            .filter_map(|(id, weak)| weak.upgrade().map(|inner| (*id, inner)))
            .collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.effects.read().expect("dep set lock poisoned").len()
    }
}

/// The dependency graph for one reactive universe.
pub(crate) struct DepGraph {
    target_map: RwLock<HashMap<TargetId, HashMap<DepKey, Arc<DepSet>>>>,
}

impl DepGraph {
    pub(crate) fn new() -> Self {
        Self {
            target_map: RwLock::new(HashMap::new()),
        }
    }

    /// Record that the currently active effect depends on
    /// `(target, key)`.
    ///
    /// No-op when no effect is running or tracking is paused.
    pub(crate) fn track(&self, target: TargetId, key: DepKey) {
        let Some(effect) = context::active_effect() else {
            return;
        };

        // Fast path: the dep set already exists.
        let dep = {
            let map = self.target_map.read().expect("target map lock poisoned");
            map.get(&target).and_then(|keys| keys.get(&key)).cloned()
        };
        let dep = match dep {
            Some(dep) => dep,
            None => {
                let mut map = self.target_map.write().expect("target map lock poisoned");
                Arc::clone(
                    map.entry(target)
                        .or_default()
                        .entry(key)
                        .or_insert_with(|| Arc::new(DepSet::new())),
                )
            }
        };

        if dep.insert(&effect) {
            effect.push_dep(dep);
        }
    }

    /// Notify every effect depending on the changed aspects of `target`.
    pub(crate) fn trigger(&self, target: TargetId, change: Change) {
        // Collect the affected dep sets with the lock held, then release
        // everything before any effect code runs.
        let deps: Vec<Arc<DepSet>> = {
            let map = self.target_map.read().expect("target map lock poisoned");
            let Some(keys) = map.get(&target) else {
                return;
            };
            match &change {
                Change::Set(key) => keys.get(key).cloned().into_iter().collect(),
                // Adding or removing an entry also invalidates structural
                // reads: iteration for keyed containers, length for
                // arrays. Absent keys simply contribute nothing.
                Change::Add(key) | Change::Delete(key) => [key, &DepKey::Iterate, &DepKey::Length]
                    .into_iter()
                    .filter_map(|k| keys.get(k).cloned())
                    .collect(),
                Change::Clear(drained) => drained
                    .iter()
                    .chain(std::iter::once(&DepKey::Iterate))
                    .filter_map(|k| keys.get(k).cloned())
                    .collect(),
                Change::Resize { new_len } => {
                    let past_end = |key: &DepKey| match key {
                        DepKey::Length => true,
                        DepKey::Prop(Value::Int(i)) => {
                            usize::try_from(*i).map(|i| i >= *new_len).unwrap_or(false)
                        }
                        _ => false,
                    };
                    keys.iter()
                        .filter(|(key, _)| past_end(key))
                        .map(|(_, dep)| Arc::clone(dep))
                        .collect()
                }
            }
        };

        if deps.is_empty() {
            return;
        }

        // Union across dep sets, deduplicated by effect id in insertion
        // order: one trigger call re-runs an effect at most once.
        let mut to_notify: IndexMap<EffectId, Arc<EffectInner>> = IndexMap::new();
        for dep in &deps {
            for (id, inner) in dep.snapshot() {
                to_notify.entry(id).or_insert(inner);
            }
        }

        for (id, inner) in to_notify {
            if !inner.is_active() {
                continue;
            }
            // Self-triggering guard: an effect's own write must not
            // re-enter it, unless it explicitly allows recursion.
            if context::is_current(id) && !inner.allow_recurse() {
                continue;
            }
            let effect = Effect::from_inner(inner);
            match effect.inner().scheduler() {
                Some(scheduler) => scheduler(&effect),
                None => effect.run(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::context::TrackingScope;
    use crate::reactive::effect::EffectOptions;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn tracked(graph: &DepGraph, effect: &Effect, target: TargetId, key: DepKey) {
        let _scope = TrackingScope::enter(effect.inner());
        graph.track(target, key);
    }

    #[test]
    fn track_without_active_effect_is_a_no_op() {
        let graph = DepGraph::new();
        graph.track(TargetId(1), DepKey::Iterate);
        assert!(graph
            .target_map
            .read()
            .unwrap()
            .get(&TargetId(1))
            .is_none());
    }

    #[test]
    fn track_is_deduplicated_per_effect() {
        let graph = DepGraph::new();
        let effect = Effect::new_lazy(|| {});

        {
            let _scope = TrackingScope::enter(effect.inner());
            graph.track(TargetId(1), DepKey::Iterate);
            graph.track(TargetId(1), DepKey::Iterate);
        }

        assert_eq!(effect.dep_count(), 1);
    }

    #[test]
    fn trigger_runs_exact_key_dependents() {
        let graph = DepGraph::new();
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let effect = Effect::new_lazy(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let key = DepKey::Prop(Value::from("a"));
        tracked(&graph, &effect, TargetId(1), key.clone());

        graph.trigger(TargetId(1), Change::Set(key));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // A different key does not notify.
        graph.trigger(TargetId(1), Change::Set(DepKey::Prop(Value::from("b"))));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn add_notifies_iteration_dependents() {
        let graph = DepGraph::new();
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let effect = Effect::new_lazy(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        tracked(&graph, &effect, TargetId(1), DepKey::Iterate);

        graph.trigger(TargetId(1), Change::Add(DepKey::Prop(Value::from("new"))));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // A plain value change does not touch iteration dependents.
        graph.trigger(TargetId(1), Change::Set(DepKey::Prop(Value::from("new"))));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_trigger_runs_an_effect_at_most_once() {
        let graph = DepGraph::new();
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let effect = Effect::new_lazy(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Depend on both an entry and iteration; an Add affects both.
        let key = DepKey::Prop(Value::from("a"));
        tracked(&graph, &effect, TargetId(1), key.clone());
        tracked(&graph, &effect, TargetId(1), DepKey::Iterate);

        graph.trigger(TargetId(1), Change::Add(key));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resize_notifies_length_and_truncated_indices() {
        let graph = DepGraph::new();
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let effect = Effect::new_lazy(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        let survivor_runs = Arc::new(AtomicI32::new(0));
        let survivor_clone = survivor_runs.clone();
        let survivor = Effect::new_lazy(move || {
            survivor_clone.fetch_add(1, Ordering::SeqCst);
        });

        tracked(&graph, &effect, TargetId(1), DepKey::Prop(Value::from(5)));
        tracked(&graph, &survivor, TargetId(1), DepKey::Prop(Value::from(0)));

        graph.trigger(TargetId(1), Change::Resize { new_len: 2 });

        // Index 5 is past the new end, index 0 survives.
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(survivor_runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stopped_effect_is_not_notified() {
        let graph = DepGraph::new();
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let effect = Effect::new_lazy(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let key = DepKey::RefValue;
        tracked(&graph, &effect, TargetId(9), key.clone());
        effect.stop();

        graph.trigger(TargetId(9), Change::Set(key));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropped_effect_is_pruned_from_the_set() {
        let graph = DepGraph::new();
        let effect = Effect::new_lazy(|| {});
        let key = DepKey::RefValue;
        tracked(&graph, &effect, TargetId(3), key.clone());

        let dep = {
            let map = graph.target_map.read().unwrap();
            Arc::clone(map.get(&TargetId(3)).unwrap().get(&key).unwrap())
        };
        assert_eq!(dep.len(), 1);

        drop(effect);
        graph.trigger(TargetId(3), Change::Set(key));
        assert_eq!(dep.len(), 0);
    }

    #[test]
    fn scheduler_is_invoked_instead_of_the_function() {
        let graph = DepGraph::new();
        let ran = Arc::new(AtomicI32::new(0));
        let scheduled = Arc::new(AtomicI32::new(0));

        let ran_clone = ran.clone();
        let scheduled_clone = scheduled.clone();
        let effect = Effect::with_options(
            EffectOptions {
                lazy: true,
                scheduler: Some(Arc::new(move |_e: &Effect| {
                    scheduled_clone.fetch_add(1, Ordering::SeqCst);
                })),
                ..EffectOptions::default()
            },
            move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        let key = DepKey::RefValue;
        tracked(&graph, &effect, TargetId(7), key.clone());

        graph.trigger(TargetId(7), Change::Set(key));
        assert_eq!(scheduled.load(Ordering::SeqCst), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
