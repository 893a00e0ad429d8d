//! Tracking Context
//!
//! The tracking context records which effect is currently executing.
//! This enables automatic dependency tracking: when a wrapped value is
//! read, the interception layer can register the current effect as a
//! dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing effect.
//! When an effect starts running we push it onto the stack; when the run
//! completes, we pop it. This design supports nested effects (an effect
//! whose body creates or re-runs another effect): an inner effect's reads
//! are never attributed to the outer one.
//!
//! Both the stack and the pause switch are maintained by RAII guards, so
//! they are restored on every exit path, including panics out of an
//! effect body.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use super::effect::{EffectId, EffectInner};

/// The tracking context stack.
///
/// Each thread has its own stack of executing effects. This thread-local
/// approach keeps the single-threaded cooperative common case free of
/// synchronization.
thread_local! {
    static EFFECT_STACK: RefCell<Vec<Arc<EffectInner>>> = const { RefCell::new(Vec::new()) };
    static PAUSE_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Guard that pops the effect stack when dropped.
///
/// This ensures the stack is properly maintained even if the effect's
/// body panics.
pub(crate) struct TrackingScope {
    effect_id: EffectId,
}

impl TrackingScope {
    /// Enter a tracking scope for the given effect.
    ///
    /// While this scope is active, any wrapped value that is read will
    /// register the effect as a dependent.
    pub(crate) fn enter(effect: &Arc<EffectInner>) -> Self {
        let effect_id = effect.id();
        EFFECT_STACK.with(|stack| {
            stack.borrow_mut().push(Arc::clone(effect));
        });
        Self { effect_id }
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        EFFECT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right scope.
            if let Some(effect) = popped {
                debug_assert_eq!(
                    effect.id(),
                    self.effect_id,
                    "TrackingScope mismatch: expected {:?}, got {:?}",
                    self.effect_id,
                    effect.id()
                );
            }
        });
    }
}

/// The currently executing effect, if any and if tracking is enabled.
pub(crate) fn active_effect() -> Option<Arc<EffectInner>> {
    if is_paused() {
        return None;
    }
    EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Whether the given effect is the one currently executing.
///
/// Used by the trigger path for the self-triggering guard. Pausing does
/// not affect this check.
pub(crate) fn is_current(id: EffectId) -> bool {
    EFFECT_STACK.with(|stack| stack.borrow().last().map(|e| e.id()) == Some(id))
}

/// Whether the given effect is anywhere on the executing stack.
pub(crate) fn is_running(id: EffectId) -> bool {
    EFFECT_STACK.with(|stack| stack.borrow().iter().any(|e| e.id() == id))
}

fn is_paused() -> bool {
    PAUSE_DEPTH.with(|depth| depth.get() > 0)
}

/// Guard returned by [`pause_tracking`]. Tracking resumes when every
/// outstanding guard has been dropped.
pub struct TrackingPause {
    _private: (),
}

/// Suspend dependency tracking on this thread.
///
/// While any pause guard is alive, reads through wrappers are pure
/// passthroughs: no dependencies are recorded. Used for internal
/// operations that must not be observed.
pub fn pause_tracking() -> TrackingPause {
    PAUSE_DEPTH.with(|depth| depth.set(depth.get() + 1));
    TrackingPause { _private: () }
}

impl Drop for TrackingPause {
    fn drop(&mut self) {
        PAUSE_DEPTH.with(|depth| {
            let d = depth.get();
            debug_assert!(d > 0, "tracking pause depth underflow");
            depth.set(d.saturating_sub(1));
        });
    }
}

/// Run a closure with dependency tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _pause = pause_tracking();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::Effect;

    #[test]
    fn stack_tracks_the_running_effect() {
        assert!(active_effect().is_none());

        let effect = Effect::new_lazy(|| {});
        {
            let _scope = TrackingScope::enter(effect.inner());
            let active = active_effect().expect("scope active");
            assert_eq!(active.id(), effect.inner().id());
            assert!(is_current(effect.inner().id()));
        }

        assert!(active_effect().is_none());
        assert!(!is_current(effect.inner().id()));
    }

    #[test]
    fn nested_scopes_restore_the_outer_effect() {
        let outer = Effect::new_lazy(|| {});
        let inner = Effect::new_lazy(|| {});

        let _outer_scope = TrackingScope::enter(outer.inner());
        {
            let _inner_scope = TrackingScope::enter(inner.inner());
            assert!(is_current(inner.inner().id()));
            assert!(is_running(outer.inner().id()));
        }
        assert!(is_current(outer.inner().id()));
    }

    #[test]
    fn pausing_hides_the_active_effect() {
        let effect = Effect::new_lazy(|| {});
        let _scope = TrackingScope::enter(effect.inner());

        assert!(active_effect().is_some());
        {
            let _pause = pause_tracking();
            assert!(active_effect().is_none());

            // Nested pauses stack.
            let _inner = pause_tracking();
        }
        assert!(active_effect().is_some());
    }

    #[test]
    fn untracked_restores_on_exit() {
        let effect = Effect::new_lazy(|| {});
        let _scope = TrackingScope::enter(effect.inner());

        untracked(|| assert!(active_effect().is_none()));
        assert!(active_effect().is_some());
    }
}
