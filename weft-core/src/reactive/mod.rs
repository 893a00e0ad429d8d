//! Observation and Dependency Tracking
//!
//! This module implements the reactivity core: observed wrappers over
//! plain data, the dependency graph that records which effect reads
//! which property, and the trigger machinery that re-runs exactly the
//! effects that depend on what changed.
//!
//! # Concepts
//!
//! ## Wrappers
//!
//! A wrapper ([`Observed`]) is an interception facade over one raw
//! composite value, produced by a [`Runtime`] in one of four flavors:
//! mutable, readonly, and their shallow variants. Reads through a
//! wrapper record dependencies; writes notify dependents.
//!
//! ## Effects
//!
//! An [`Effect`] is a re-runnable computation. While it runs, every
//! tracked read registers it as a dependent; when any of those
//! dependencies changes, it re-runs (or its scheduler is invoked, which
//! is how the rendering layer batches re-renders).
//!
//! ## Ref boxes and computed values
//!
//! A [`RefBox`] gives a single value the same track/trigger contract as
//! one property. A [`Computed`] is a cached derived value that
//! invalidates lazily.
//!
//! # Implementation Notes
//!
//! The currently running effect lives on a thread-local stack consulted
//! by the wrapper layer on every read. This approach (sometimes called
//! "automatic dependency tracking" or "transparent reactivity") is used
//! by SolidJS, Vue 3, and Leptos.

mod classify;
mod collections;
mod computed;
mod context;
mod effect;
mod graph;
pub(crate) mod observed;
mod refbox;
mod registry;
mod runtime;

pub use classify::{mark_internal, mark_non_reactive, mark_readonly};
pub use computed::Computed;
pub use context::{pause_tracking, untracked, TrackingPause};
pub use effect::{Effect, EffectId, EffectOptions, Scheduler};
pub use observed::{Flavor, Observed};
pub use refbox::RefBox;
pub use runtime::Runtime;
