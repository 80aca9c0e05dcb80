//! Watches
//!
//! A watch runs a callback with `(new, old)` whenever its source produces a
//! different value. It is built on a lazy [`Effect`] whose function is a
//! getter derived from the source, and whose scheduler (the job) re-runs the
//! getter, compares the result with the previous value and calls back only
//! on change.
//!
//! # Sources
//!
//! | source                  | getter                 | fires when                  |
//! |-------------------------|------------------------|-----------------------------|
//! | `Cell<T>`               | the cell's value       | value changed, or always for a shallow cell |
//! | `Computed<T>`           | the computed value     | value changed               |
//! | reactive proxy          | the proxy itself, deep | any nested property changed |
//! | closure `Fn() -> T`     | the closure            | result changed              |
//! | tuple / `Vec` of these  | one slot per source    | any slot changed            |
//!
//! Anything else is reported as
//! [`InvalidWatchSource`](crate::diagnostics::Diagnostic::InvalidWatchSource)
//! and watched as a constant, so the callback never fires.
//!
//! # Timing
//!
//! With `immediate`, the job runs once at creation and the callback sees no
//! old value. Otherwise the first run only records the old value. A cleanup
//! returned by the callback runs before the next callback and when the watch
//! is stopped.

use std::sync::Arc;

use parking_lot::Mutex;

use super::cell::Cell;
use super::computed::Computed;
use super::effect::{Cleanup, Effect, EffectOptions, IntoCleanup, StopHook};
use super::proxy::{Container, Proxy};
use super::traverse::traverse;
use super::value::{ReactiveValue, Value};
use crate::diagnostics::{self, Diagnostic};

/// A getter compiled from a watch source.
pub struct SourceGetter<T> {
    get: Box<dyn Fn() -> T + Send + Sync>,
    /// Read the whole value deeply on every run.
    deep: bool,
    /// Fire even if the value is the same as before.
    force_trigger: bool,
}

impl<T: ReactiveValue> SourceGetter<T> {
    pub fn new(get: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            get: Box::new(get),
            deep: false,
            force_trigger: false,
        }
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn force_trigger(mut self, force_trigger: bool) -> Self {
        self.force_trigger = force_trigger;
        self
    }

    /// A getter that always returns `value`, after reporting the source as
    /// invalid.
    pub fn invalid(value: T, description: String) -> Self {
        diagnostics::emit(Diagnostic::InvalidWatchSource {
            source: description,
        });
        Self::new(move || value.clone())
    }

    /// Run the getter, reading everything it returned if the source is deep.
    fn read(&self) -> T {
        let value = (self.get)();
        if self.deep {
            traverse(&value);
        }
        value
    }
}

/// Something a watch can observe.
pub trait WatchSource {
    type Value: ReactiveValue;

    fn into_getter(self) -> SourceGetter<Self::Value>;
}

impl<T: ReactiveValue> WatchSource for Cell<T> {
    type Value = T;

    fn into_getter(self) -> SourceGetter<T> {
        let shallow = self.is_shallow();
        SourceGetter::new(move || self.get()).force_trigger(shallow)
    }
}

impl<T: ReactiveValue> WatchSource for Computed<T> {
    type Value = T;

    fn into_getter(self) -> SourceGetter<T> {
        SourceGetter::new(move || self.get())
    }
}

impl<S: Container> WatchSource for Proxy<S> {
    type Value = Proxy<S>;

    fn into_getter(self) -> SourceGetter<Proxy<S>> {
        if !self.is_proxy() {
            let description = format!("{self:?}");
            return SourceGetter::invalid(self, description);
        }
        SourceGetter::new(move || self.clone()).deep(true)
    }
}

impl WatchSource for Value {
    type Value = Value;

    fn into_getter(self) -> SourceGetter<Value> {
        let tracked = match &self {
            Value::Object(obj) => obj.is_proxy(),
            Value::List(list) => list.is_proxy(),
            Value::Set(set) => set.is_proxy(),
            _ => false,
        };
        if !tracked {
            let description = format!("{self:?}");
            return SourceGetter::invalid(self, description);
        }
        SourceGetter::new(move || self.clone()).deep(true)
    }
}

impl<T, F> WatchSource for F
where
    T: ReactiveValue,
    F: Fn() -> T + Send + Sync + 'static,
{
    type Value = T;

    fn into_getter(self) -> SourceGetter<T> {
        SourceGetter::new(self)
    }
}

/// A multi-source slot forces the callback when its source is shallow or
/// deep, since neither changes identity on nested mutation.
fn forces(getter: &SourceGetter<impl ReactiveValue>) -> bool {
    getter.force_trigger || getter.deep
}

macro_rules! impl_watch_source_tuple {
    ($($name:ident $var:ident),+) => {
        impl<$($name: WatchSource),+> WatchSource for ($($name,)+) {
            type Value = ($($name::Value,)+);

            fn into_getter(self) -> SourceGetter<Self::Value> {
                let ($($var,)+) = self;
                $(let $var = $var.into_getter();)+
                let force = false $(|| forces(&$var))+;
                SourceGetter::new(move || ($($var.read(),)+)).force_trigger(force)
            }
        }
    };
}

impl_watch_source_tuple!(A a);
impl_watch_source_tuple!(A a, B b);
impl_watch_source_tuple!(A a, B b, C c);
impl_watch_source_tuple!(A a, B b, C c, D d);

impl<W: WatchSource> WatchSource for Vec<W> {
    type Value = Vec<W::Value>;

    fn into_getter(self) -> SourceGetter<Self::Value> {
        let getters: Vec<SourceGetter<W::Value>> =
            self.into_iter().map(WatchSource::into_getter).collect();
        let force = getters.iter().any(forces);
        SourceGetter::new(move || getters.iter().map(SourceGetter::read).collect())
            .force_trigger(force)
    }
}

/// Options for [`watch`].
#[derive(Clone, Default)]
pub struct WatchOptions {
    /// Call back once at creation, with no old value.
    pub immediate: bool,
    /// Compare by deep traversal: any nested change fires the callback.
    pub deep: bool,
    /// Accepted for parity with effect options. Watches always collect their
    /// dependencies at creation; the hook versions warn when it is set.
    pub lazy: bool,
    pub on_stop: Option<StopHook>,
}

impl WatchOptions {
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn on_stop(mut self, on_stop: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(on_stop));
        self
    }
}

/// State the job carries between runs.
struct WatchState<T> {
    old: Mutex<Option<T>>,
    cleanup: Mutex<Option<Cleanup>>,
}

impl<T> WatchState<T> {
    fn run_cleanup(&self) {
        let cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

trait WatchControl: Send + Sync {
    fn stop(&self);
    fn is_active(&self) -> bool;
}

impl<T: Send + 'static> WatchControl for Effect<T> {
    fn stop(&self) {
        Effect::stop(self);
    }

    fn is_active(&self) -> bool {
        Effect::is_active(self)
    }
}

/// Handle returned by [`watch`].
#[derive(Clone)]
pub struct WatchHandle {
    effect: Arc<dyn WatchControl>,
}

impl WatchHandle {
    /// Stop watching: runs the pending cleanup and the `on_stop` hook.
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

type Job = Arc<dyn Fn() + Send + Sync>;

/// Watch `source` and call `callback(new, old)` when it changes.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use trellis_core::reactive::{watch, Cell, WatchOptions};
///
/// let count = Cell::new(1);
/// let log = Arc::new(Mutex::new(Vec::new()));
///
/// let log_clone = log.clone();
/// let handle = watch(
///     count.clone(),
///     move |new: &i32, old: Option<&i32>| log_clone.lock().push((*new, old.copied())),
///     WatchOptions::default(),
/// );
///
/// count.set(2);
/// assert_eq!(*log.lock(), vec![(2, Some(1))]);
/// handle.stop();
/// ```
pub fn watch<S, F, C>(source: S, callback: F, options: WatchOptions) -> WatchHandle
where
    S: WatchSource,
    F: Fn(&S::Value, Option<&S::Value>) -> C + Send + Sync + 'static,
    C: IntoCleanup,
{
    let getter = source.into_getter();
    let deep = options.deep || getter.deep;
    let force_trigger = getter.force_trigger;
    let getter = getter.deep(deep);

    let state = Arc::new(WatchState::<S::Value> {
        old: Mutex::new(None),
        cleanup: Mutex::new(None),
    });

    let mut job: Option<Job> = None;
    let effect = Effect::new_cyclic(
        move || getter.read(),
        |weak| {
            let job_state = Arc::clone(&state);
            let run_job: Job = Arc::new(move || {
                let Some(effect) = weak.upgrade() else {
                    return;
                };
                let Some(new_value) = effect.run() else {
                    return;
                };

                let old = job_state.old.lock().clone();
                let changed = deep
                    || force_trigger
                    || old.as_ref().map_or(true, |old| !old.same_value(&new_value));
                if !changed {
                    return;
                }

                job_state.run_cleanup();
                let cleanup = callback(&new_value, old.as_ref()).into_cleanup();
                *job_state.cleanup.lock() = cleanup;
                *job_state.old.lock() = Some(new_value);
            });
            job = Some(Arc::clone(&run_job));

            let stop_state = Arc::clone(&state);
            let user_on_stop = options.on_stop.clone();
            EffectOptions::default()
                .lazy(true)
                .allow_recurse(true)
                .scheduler(move || run_job())
                .on_stop(move || {
                    stop_state.run_cleanup();
                    if let Some(on_stop) = &user_on_stop {
                        on_stop();
                    }
                })
        },
    );

    match job {
        Some(job) if options.immediate => job(),
        _ => {
            let initial = effect.run();
            *state.old.lock() = initial;
        }
    }

    WatchHandle {
        effect: Arc::new(effect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::object::ReactiveObject;
    use crate::reactive::proxy::reactive;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn fires_only_on_change() {
        let cell = Cell::new(1);
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let handle = watch(
            cell.clone(),
            move |_: &i32, _: Option<&i32>| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cell.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cell.set(2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        handle.stop();
    }

    #[test]
    fn immediate_sees_no_old_value() {
        let cell = Cell::new(5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let handle = watch(
            cell.clone(),
            move |new: &i32, old: Option<&i32>| seen_clone.lock().push((*new, old.copied())),
            WatchOptions::default().immediate(true),
        );
        cell.set(6);

        assert_eq!(*seen.lock(), vec![(5, None), (6, Some(5))]);
        handle.stop();
    }

    #[test]
    fn shallow_cell_source_fires_on_mark_changed() {
        let cell = Cell::shallow(Value::Object(ReactiveObject::new()));
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let handle = watch(
            cell.clone(),
            move |_: &Value, _: Option<&Value>| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        cell.mark_changed();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        handle.stop();
    }

    #[test]
    fn raw_proxy_is_an_invalid_source() {
        let raw = ReactiveObject::new();
        let (handle, warnings) = diagnostics::capture(|| {
            watch(
                raw.clone(),
                |_: &ReactiveObject, _: Option<&ReactiveObject>| {},
                WatchOptions::default(),
            )
        });

        assert!(matches!(
            warnings.as_slice(),
            [Diagnostic::InvalidWatchSource { .. }]
        ));
        handle.stop();
    }

    #[test]
    fn reactive_proxy_source_is_deep() {
        let inner = ReactiveObject::from_iter([("n", 1)]);
        let state = reactive(&ReactiveObject::from_iter([("inner", inner)])).expect("extensible");
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let handle = watch(
            state.clone(),
            move |new: &ReactiveObject, old: Option<&ReactiveObject>| {
                assert_eq!(Some(new), old);
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        let nested = state.get("inner");
        nested.as_object().expect("object").set("n", 2).expect("writable");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        handle.stop();
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let cell = Cell::new(0);
        let cleanups = Arc::new(AtomicI32::new(0));
        let stops = Arc::new(AtomicI32::new(0));

        let (cleanups_clone, stops_clone) = (cleanups.clone(), stops.clone());
        let handle = watch(
            cell.clone(),
            move |_: &i32, _: Option<&i32>| {
                let cleanups = cleanups_clone.clone();
                move || {
                    cleanups.fetch_add(1, Ordering::SeqCst);
                }
            },
            WatchOptions::default().on_stop(move || {
                stops_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        cell.set(1);
        cell.set(2);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        handle.stop();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());

        cell.set(3);
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }
}
