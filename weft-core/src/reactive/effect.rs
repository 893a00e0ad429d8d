//! Effect Implementation
//!
//! An Effect is a re-runnable computation whose reads through observed
//! wrappers are tracked, and which re-runs whenever one of those tracked
//! dependencies changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless created lazy).
//!
//! 2. When any dependency changes, the trigger path either re-runs the
//!    effect synchronously or hands it to the effect's scheduler.
//!
//! 3. Before re-running, the effect removes itself from every dependency
//!    set it belongs to; the run then repopulates them from scratch. An
//!    effect that conditionally reads different properties on different
//!    runs therefore never retains stale dependencies.
//!
//! # Schedulers
//!
//! A scheduler is a callback invoked *instead of* the effect function
//! when a dependency changes. The rendering layer uses this to batch
//! re-renders: the graph guarantees the scheduler is called, and the
//! scheduler decides when (and whether) to actually call
//! [`Effect::run`].
//!
//! # Stopping
//!
//! A stopped effect is removed from every dependency set and marked
//! permanently inactive; subsequent writes never notify it again.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use smallvec::SmallVec;

use super::context::{self, TrackingScope};
use super::graph::DepSet;

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        Self(EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Callback invoked on dependency change instead of running the effect.
pub type Scheduler = Arc<dyn Fn(&Effect) + Send + Sync>;

/// Construction options for [`Effect::with_options`].
#[derive(Default)]
pub struct EffectOptions {
    /// Do not run on creation; the first run is the caller's to invoke.
    pub lazy: bool,
    /// Allow this effect's own writes to re-trigger it.
    pub allow_recurse: bool,
    /// Invoked on dependency change instead of running synchronously.
    pub scheduler: Option<Scheduler>,
}

pub(crate) struct EffectInner {
    id: EffectId,

    /// The effect function.
    func: Box<dyn Fn() + Send + Sync>,

    scheduler: Option<Scheduler>,
    allow_recurse: bool,

    /// Cleared by [`Effect::stop`]; a stopped effect is never notified.
    active: AtomicBool,

    /// Every dependency set this effect is currently a member of, in the
    /// order it joined them. Enables O(deps) cleanup before a re-run.
    deps: RwLock<SmallVec<[Arc<DepSet>; 4]>>,

    /// Number of times the effect has run.
    run_count: AtomicU64,
}

impl EffectInner {
    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn allow_recurse(&self) -> bool {
        self.allow_recurse
    }

    pub(crate) fn scheduler(&self) -> Option<Scheduler> {
        self.scheduler.clone()
    }

    /// Record membership in a dependency set.
    pub(crate) fn push_dep(&self, dep: Arc<DepSet>) {
        self.deps.write().expect("deps lock poisoned").push(dep);
    }

    /// Remove this effect from every dependency set it belongs to.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.write().expect("deps lock poisoned"));
        for dep in deps {
            dep.remove(self.id);
        }
    }
}

/// A re-runnable tracked computation.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let state = rt.reactive(Value::object_from([("count", Value::from(0))]))
///     .into_observed()
///     .unwrap();
///
/// let effect = Effect::new({
///     let state = state.clone();
///     move || println!("count is {:?}", state.get("count"))
/// });
///
/// state.set("count", Value::from(5)); // prints: count is Int(5)
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it immediately to establish its
    /// initial dependencies.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_options(EffectOptions::default(), func)
    }

    /// Create a new effect without running it.
    pub fn new_lazy<F>(func: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_options(
            EffectOptions {
                lazy: true,
                ..EffectOptions::default()
            },
            func,
        )
    }

    /// Create a new effect with explicit options.
    pub fn with_options<F>(options: EffectOptions, func: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self {
            inner: Arc::new(EffectInner {
                id: EffectId::next(),
                func: Box::new(func),
                scheduler: options.scheduler,
                allow_recurse: options.allow_recurse,
                active: AtomicBool::new(true),
                deps: RwLock::new(SmallVec::new()),
                run_count: AtomicU64::new(0),
            }),
        };

        if !options.lazy {
            effect.run();
        }

        effect
    }

    pub(crate) fn from_inner(inner: Arc<EffectInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<EffectInner> {
        &self.inner
    }

    /// Get this effect's unique ID.
    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    /// Execute the effect function inside a tracking scope.
    ///
    /// Old dependencies are dropped first and fresh ones are recorded
    /// during execution. A stopped effect runs its function as a plain
    /// untracked call; an effect already running further up the stack is
    /// not re-entered.
    pub fn run(&self) {
        if !self.inner.is_active() {
            (self.inner.func)();
            return;
        }
        if context::is_running(self.inner.id) {
            return;
        }

        self.inner.cleanup();
        self.inner.run_count.fetch_add(1, Ordering::SeqCst);

        let _scope = TrackingScope::enter(&self.inner);
        (self.inner.func)();
    }

    /// Stop the effect.
    ///
    /// Removes it from every dependency set and marks it permanently
    /// inactive; subsequent dependency changes will not notify it.
    pub fn stop(&self) {
        if self.inner.active.swap(false, Ordering::SeqCst) {
            self.inner.cleanup();
        }
    }

    /// Whether the effect is still active (not stopped).
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Number of times the effect has run.
    pub fn run_count(&self) -> u64 {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of dependency sets the effect currently belongs to.
    pub fn dep_count(&self) -> usize {
        self.inner.deps.read().expect("deps lock poisoned").len()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dep_count", &self.dep_count())
            .field("active", &self.is_active())
            .finish()
    }
}
