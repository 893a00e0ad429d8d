//! Weft Core
//!
//! This crate provides the observation and dependency-tracking runtime
//! underlying the Weft reactive UI framework. It implements:
//!
//! - A dynamic value model (objects, arrays, maps, sets, ref boxes)
//! - Observed wrappers in four flavors (mutable, readonly, shallow)
//! - Automatic dependency tracking and precise change propagation
//! - Effects, schedulers, and lazily cached computed values
//!
//! The rendering layer consumes this crate by wrapping component state
//! with [`Runtime::reactive`], registering render functions as
//! [`Effect`]s, and reading and writing wrapped state during patch; the
//! graph guarantees a write re-runs exactly the effects that read what
//! changed.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `value`: the dynamic value model and raw (untracked) access
//! - `reactive`: wrappers, the dependency graph, effects, ref boxes,
//!   and computed values
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{Effect, Runtime, Value};
//!
//! let rt = Runtime::new();
//! let state = rt
//!     .reactive(Value::object_from([("count", Value::from(0))]))
//!     .into_observed()
//!     .unwrap();
//!
//! let reader = state.clone();
//! let effect = Effect::new(move || {
//!     println!("doubled: {}", reader.get("count").as_i64().unwrap() * 2);
//! });
//!
//! state.set("count", Value::from(5));
//! // Effect automatically re-runs, prints: "doubled: 10"
//! ```

pub mod reactive;
pub mod value;

pub use reactive::{
    mark_internal, mark_non_reactive, mark_readonly, pause_tracking, untracked, Computed, Effect,
    EffectId, EffectOptions, Flavor, Observed, RefBox, Runtime, Scheduler, TrackingPause,
};
pub use value::{StoreKind, TypeError, Value};
