//! Reactive Primitives
//!
//! This module implements the dependency-tracking core: cells, computed
//! values, effects, watches and reactive proxies. Everything else in the
//! crate (async tasks, the render bridge) is layered on top of it.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Cell`] holds one mutable value. Reading it inside a tracked run
//! records a dependency edge; assigning a different value notifies every
//! subscriber.
//!
//! ## Proxies
//!
//! A [`Proxy`] is a view of a shared container (an object, a list or a set).
//! Reactive views track every property they read and trigger on every
//! property they change. Readonly views reject writes with a diagnostic.
//!
//! ## Computed Values
//!
//! A [`Computed`] value caches the result of a getter and recomputes it
//! lazily, only when read after one of its dependencies changed.
//!
//! ## Effects and Watches
//!
//! An [`Effect`] re-runs a function whenever something it read changes, or
//! hands the re-run to a scheduler. A [`watch`] separates what is observed
//! (the source) from what happens on change (a callback receiving the new and
//! old values).
//!
//! ## Scopes
//!
//! An [`EffectScope`] collects the effects created while it runs, so they
//! can be stopped together.
//!
//! # Implementation Notes
//!
//! Dependency edges live in a global map keyed by `(target, key)`. The
//! subscriber a read is attributed to comes from a per-thread stack of
//! tracking contexts, pushed when a run starts and popped when it ends, so
//! nested runs (a computed read inside an effect) attribute correctly.
//!
//! Notifications are delivered in waves: one mutation (or one
//! [`Runtime::batch`]) queues every affected effect once, and the queue is
//! flushed when the outermost wave closes.

mod cell;
mod collections;
mod computed;
mod context;
mod effect;
mod object;
mod proxy;
mod runtime;
mod scope;
mod subscriber;
mod swap;
mod traverse;
mod value;
mod watch;

pub use cell::{Cell, Track, Trigger};
pub use collections::{ListData, ReactiveList, ReactiveSet, SetData, MAX_LIST_GAP};
pub use computed::Computed;
pub use context::{untracked, Collected, ReactiveContext};
pub use effect::{
    effect, on_effect_cleanup, Cleanup, Effect, EffectOptions, IntoCleanup, Scheduler, StopHook,
    WeakEffect,
};
pub use object::{ObjectData, ReactiveObject};
pub use proxy::{
    mark_raw, reactive, readonly, shallow_reactive, shallow_readonly, to_raw, Container,
    PropertyAccess, Proxy, ProxyKind,
};
pub use runtime::{DepKey, Key, Runtime, TargetId};
pub use scope::{on_scope_dispose, EffectScope, Stoppable};
pub use subscriber::{DirtyState, Reactive, SubscriberId};
pub use swap::SwapRef;
pub use traverse::{traverse, Seen};
pub use value::{same_number, Props, ReactiveValue, Value};
pub use watch::{watch, SourceGetter, WatchHandle, WatchOptions, WatchSource};
