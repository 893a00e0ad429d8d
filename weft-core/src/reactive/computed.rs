//! Computed Values
//!
//! A `Computed` is a lazily cached derived value. Its getter runs inside
//! a tracking scope, so the dependencies it reads are recorded; when any
//! of them changes, the computed is only marked dirty — the getter does
//! not re-run until the value is next read.
//!
//! A computed is itself trackable: effects that read it re-run when it
//! is invalidated, which is how a change deep in the source data
//! propagates through a chain of derived values to the rendering layer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use super::effect::{Effect, EffectOptions, Scheduler};
use super::graph::{Change, DepKey, TargetId};
use super::runtime::Runtime;
use crate::value::store::next_identity;
use crate::value::Value;

struct ComputedInner {
    id: u64,
    rt: Runtime,
    value: RwLock<Option<Value>>,
    dirty: AtomicBool,
    effect: OnceLock<Effect>,
}

/// A lazily cached derived value.
///
/// Cheap to clone; clones share the cache.
pub struct Computed {
    inner: Arc<ComputedInner>,
}

impl Computed {
    pub(crate) fn new<F>(rt: Runtime, getter: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let inner = Arc::new(ComputedInner {
            id: next_identity(),
            rt,
            value: RwLock::new(None),
            dirty: AtomicBool::new(true),
            effect: OnceLock::new(),
        });

        // The effect recomputes into the shared cache slot.
        let compute_target = Arc::downgrade(&inner);
        let func = move || {
            if let Some(inner) = compute_target.upgrade() {
                let result = getter();
                *inner.value.write().expect("computed lock poisoned") = Some(result);
            }
        };

        // Invalidation marks dirty and notifies the computed's own
        // dependents; recomputation waits for the next read.
        let invalidate_target = Arc::downgrade(&inner);
        let scheduler: Scheduler = Arc::new(move |_effect: &Effect| {
            if let Some(inner) = invalidate_target.upgrade() {
                if !inner.dirty.swap(true, Ordering::SeqCst) {
                    inner
                        .rt
                        .graph()
                        .trigger(TargetId(inner.id), Change::Set(DepKey::RefValue));
                }
            }
        });

        let effect = Effect::with_options(
            EffectOptions {
                lazy: true,
                scheduler: Some(scheduler),
                ..EffectOptions::default()
            },
            func,
        );
        inner
            .effect
            .set(effect)
            .unwrap_or_else(|_| unreachable!("computed effect installed once"));

        Self { inner }
    }

    /// Read the derived value, recomputing only if a dependency changed
    /// since the last read. Tracks this computed as a dependency of the
    /// currently running effect.
    pub fn get(&self) -> Value {
        self.inner
            .rt
            .graph()
            .track(TargetId(self.inner.id), DepKey::RefValue);

        if self.inner.dirty.load(Ordering::SeqCst) {
            self.effect().run();
            self.inner.dirty.store(false, Ordering::SeqCst);
        }

        self.inner
            .value
            .read()
            .expect("computed lock poisoned")
            .clone()
            .unwrap_or(Value::Null)
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Stop tracking; the cached value stays readable but never
    /// invalidates again.
    pub fn stop(&self) {
        self.effect().stop();
    }

    fn effect(&self) -> &Effect {
        self.inner.effect.get().expect("computed effect installed")
    }
}

impl Clone for Computed {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
