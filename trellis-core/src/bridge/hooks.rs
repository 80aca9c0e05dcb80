//! Hooks
//!
//! A render function is called again on every host render, but the reactive
//! state it creates must survive between calls. [`Hooks`] is a slot store
//! indexed by call order: the n-th `use_*` call of a pass gets the n-th slot,
//! creating its value on the first pass and returning the stored value on
//! every later one. Hooks must therefore be called in the same order on every
//! pass.
//!
//! # Side-effecting hooks
//!
//! `use_watch_effect`, `use_watch` and `use_async_watch` create effects. They
//! are created inside the scope the hooks are attached to, so they stop with
//! it:
//!
//! - Inside a bridge, that is the bridge instance's scope, stopped on
//!   unmount. During a provisional render pass these hooks are inert: the
//!   pass is thrown away, and its effects would never be torn down.
//! - With [`Hooks::detached`], it is a scope owned by the hooks themselves,
//!   stopped by [`Hooks::teardown`], which the host calls on unmount. Each
//!   such hook reports [`Diagnostic::OutsideBridgeScope`] when created.
//!
//! The `lazy` option is not supported by these hooks. It is reported as
//! [`Diagnostic::UnsupportedOption`] and ignored.

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::props::ReactiveProps;
use crate::diagnostics::{self, Diagnostic};
use crate::error::Result;
use crate::reactive::{
    effect, reactive, readonly, shallow_reactive, shallow_readonly, untracked, watch, Cell,
    Computed, Container, Effect, EffectOptions, EffectScope, IntoCleanup, Props, Proxy,
    ReactiveObject, ReactiveValue, Track, Trigger, WatchHandle, WatchOptions, WatchSource,
};
use crate::task::{
    async_watch, AsyncOptions, AsyncTask, AsyncWatch, AsyncWatchOptions, WatchArgs,
};

type Slot = Arc<dyn Any + Send + Sync>;

struct HooksInner {
    slots: Mutex<Vec<Slot>>,
    cursor: AtomicUsize,
    scope: Mutex<EffectScope>,
    bridged: bool,
    provisional: AtomicBool,
}

/// Per-instance state store for render functions.
#[derive(Clone)]
pub struct Hooks {
    inner: Arc<HooksInner>,
}

impl Hooks {
    fn build(bridged: bool) -> Self {
        Self {
            inner: Arc::new(HooksInner {
                slots: Mutex::new(Vec::new()),
                cursor: AtomicUsize::new(0),
                scope: Mutex::new(EffectScope::detached()),
                bridged,
                provisional: AtomicBool::new(false),
            }),
        }
    }

    /// Hooks driven by a host without a reactive bridge.
    ///
    /// The host calls [`begin_pass`](Self::begin_pass) before every render and
    /// [`teardown`](Self::teardown) on unmount.
    pub fn detached() -> Self {
        Self::build(false)
    }

    pub(crate) fn bridged() -> Self {
        Self::build(true)
    }

    /// Start a render pass: the next `use_*` call gets the first slot.
    pub fn begin_pass(&self) {
        self.inner.cursor.store(0, Ordering::Release);
    }

    /// Stop every effect created through these hooks and forget all state.
    pub fn teardown(&self) {
        let scope = std::mem::replace(&mut *self.inner.scope.lock(), EffectScope::detached());
        scope.stop();
        self.reset();
    }

    /// Whether these hooks are driven by a bridge.
    pub fn is_bridged(&self) -> bool {
        self.inner.bridged
    }

    /// Number of slots created so far.
    pub fn slot_count(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub(crate) fn begin_bridged_pass(&self, scope: &EffectScope, provisional: bool) {
        *self.inner.scope.lock() = scope.clone();
        self.inner.provisional.store(provisional, Ordering::Release);
        self.begin_pass();
    }

    pub(crate) fn reset(&self) {
        self.inner.slots.lock().clear();
        self.begin_pass();
    }

    fn is_provisional(&self) -> bool {
        self.inner.provisional.load(Ordering::Acquire)
    }

    /// The value of the next slot, created by `init` if the slot is new.
    ///
    /// A slot holding a different type (hooks called in a different order
    /// than on the previous pass) is replaced.
    fn use_slot<T>(&self, init: impl FnOnce() -> T) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        let index = self.inner.cursor.fetch_add(1, Ordering::AcqRel);
        let existing = self.inner.slots.lock().get(index).cloned();
        if let Some(slot) = existing {
            match slot.downcast::<T>() {
                Ok(value) => return T::clone(&value),
                Err(_) => tracing::warn!(index, "hook slot changed type, recreating it"),
            }
        }

        let value = untracked(init);
        let slot: Slot = Arc::new(value.clone());
        let mut slots = self.inner.slots.lock();
        if index < slots.len() {
            slots[index] = slot;
        } else {
            slots.push(slot);
        }
        value
    }

    /// Run `create` inside the scope the hooks are attached to.
    fn create_effect<R>(&self, hook: &'static str, create: impl FnOnce() -> R) -> Option<R> {
        if !self.inner.bridged {
            diagnostics::emit(Diagnostic::OutsideBridgeScope { hook });
        }
        let scope = self.inner.scope.lock().clone();
        scope.run(create)
    }

    fn reject_lazy(lazy: bool, api: &'static str) {
        if lazy {
            diagnostics::emit(Diagnostic::UnsupportedOption {
                option: "lazy",
                api,
            });
        }
    }

    /// A deep cell created on the first pass.
    pub fn use_cell<T: ReactiveValue>(&self, init: impl FnOnce() -> T) -> Cell<T> {
        self.use_slot(|| Cell::new(init()))
    }

    pub fn use_shallow_cell<T: ReactiveValue>(&self, init: impl FnOnce() -> T) -> Cell<T> {
        self.use_slot(|| Cell::shallow(init()))
    }

    /// A [`Cell::custom`] built by `factory` on the first pass.
    pub fn use_custom_cell<T, F, G, S>(&self, factory: F) -> Cell<T>
    where
        T: ReactiveValue,
        F: FnOnce(Track, Trigger) -> (G, S),
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        self.use_slot(|| Cell::custom(factory))
    }

    /// A computed value created on the first pass. Later passes keep the
    /// first getter.
    pub fn use_computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: ReactiveValue,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.use_slot(|| Computed::new(getter))
    }

    pub fn use_writable_computed<T, F, S>(&self, getter: F, setter: S) -> Computed<T>
    where
        T: ReactiveValue,
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        self.use_slot(|| Computed::writable(getter, setter))
    }

    pub fn use_reactive<S: Container>(&self, init: impl FnOnce() -> Proxy<S>) -> Result<Proxy<S>> {
        self.use_slot(|| reactive(&init()))
    }

    pub fn use_shallow_reactive<S: Container>(
        &self,
        init: impl FnOnce() -> Proxy<S>,
    ) -> Result<Proxy<S>> {
        self.use_slot(|| shallow_reactive(&init()))
    }

    pub fn use_readonly<S: Container>(&self, init: impl FnOnce() -> Proxy<S>) -> Result<Proxy<S>> {
        self.use_slot(|| readonly(&init()))
    }

    pub fn use_shallow_readonly<S: Container>(
        &self,
        init: impl FnOnce() -> Proxy<S>,
    ) -> Result<Proxy<S>> {
        self.use_slot(|| shallow_readonly(&init()))
    }

    /// An effect created on the first committed pass.
    ///
    /// Returns `None` during a provisional pass.
    pub fn use_watch_effect<F, C>(&self, f: F, options: EffectOptions) -> Option<Effect>
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: IntoCleanup,
    {
        let provisional = self.is_provisional();
        self.use_slot(|| {
            Self::reject_lazy(options.lazy, "use_watch_effect");
            if provisional {
                return None;
            }
            let options = options.lazy(false);
            self.create_effect("use_watch_effect", || effect(f, options))
        })
    }

    /// A watch created on the first committed pass.
    ///
    /// Returns `None` during a provisional pass.
    pub fn use_watch<S, F, C>(
        &self,
        source: S,
        callback: F,
        options: WatchOptions,
    ) -> Option<WatchHandle>
    where
        S: WatchSource,
        F: Fn(&S::Value, Option<&S::Value>) -> C + Send + Sync + 'static,
        C: IntoCleanup,
    {
        let provisional = self.is_provisional();
        self.use_slot(|| {
            Self::reject_lazy(options.lazy, "use_watch");
            if provisional {
                return None;
            }
            let options = options.lazy(false);
            self.create_effect("use_watch", || watch(source, callback, options))
        })
    }

    /// An async task created on the first pass.
    pub fn use_async<A, R, E, F, Fut>(&self, func: F, options: AsyncOptions) -> AsyncTask<A, R, E>
    where
        A: Send + 'static,
        R: ReactiveValue,
        E: ReactiveValue,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.use_slot(|| AsyncTask::new(func, options))
    }

    /// An async task re-executed whenever `source` changes.
    ///
    /// During a provisional pass the task is created but never executed, so
    /// the caller sees its idle state.
    pub fn use_async_watch<S, F, Fut, R, E>(
        &self,
        source: S,
        func: F,
        options: AsyncWatchOptions,
    ) -> AsyncTask<WatchArgs<S::Value>, R, E>
    where
        S: WatchSource,
        F: Fn(S::Value, Option<S::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: ReactiveValue,
        E: ReactiveValue,
    {
        let provisional = self.is_provisional();
        let slot: AsyncSlot<WatchArgs<S::Value>, R, E> = self.use_slot(|| {
            Self::reject_lazy(options.lazy, "use_async_watch");
            if provisional {
                let task = AsyncTask::new(
                    move |(value, old): WatchArgs<S::Value>| func(value, old),
                    AsyncOptions::default().overlap(options.overlap),
                );
                return AsyncSlot::Idle(task);
            }
            let created = self.create_effect("use_async_watch", || {
                async_watch(source, func, options.lazy(false))
            });
            match created {
                Some(watched) => AsyncSlot::Watched(Arc::new(watched)),
                None => AsyncSlot::Stopped,
            }
        });

        match slot {
            AsyncSlot::Idle(task) => task,
            AsyncSlot::Watched(watched) => watched.task().clone(),
            AsyncSlot::Stopped => {
                let pending = |_: WatchArgs<S::Value>| std::future::pending();
                AsyncTask::new(pending, AsyncOptions::default())
            }
        }
    }

    /// Props made observable: created from `props` on the first pass and
    /// assigned with a diff on every later one. Returns the readonly view.
    pub fn use_reactive_rerender(&self, props: &Props) -> Result<ReactiveObject> {
        let bridged = self.use_slot(|| ReactiveProps::new(props))?;
        bridged.assign(props)?;
        Ok(bridged.view().clone())
    }
}

enum AsyncSlot<A, R, E> {
    Idle(AsyncTask<A, R, E>),
    Watched(Arc<AsyncWatch<A, R, E>>),
    Stopped,
}

impl<A, R, E> Clone for AsyncSlot<A, R, E> {
    fn clone(&self) -> Self {
        match self {
            Self::Idle(task) => Self::Idle(task.clone()),
            Self::Watched(watched) => Self::Watched(Arc::clone(watched)),
            Self::Stopped => Self::Stopped,
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("bridged", &self.inner.bridged)
            .field("slots", &self.slot_count())
            .field("provisional", &self.is_provisional())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Value;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn slots_survive_between_passes() {
        let hooks = Hooks::detached();

        hooks.begin_pass();
        let first = hooks.use_cell(|| 1);
        first.set(5);

        hooks.begin_pass();
        let second = hooks.use_cell(|| 1);
        assert_eq!(second.get(), 5);
        assert_eq!(hooks.slot_count(), 1);
    }

    #[test]
    fn changed_hook_order_recreates_the_slot() {
        let hooks = Hooks::detached();

        hooks.begin_pass();
        hooks.use_cell(|| 1);

        hooks.begin_pass();
        let text = hooks.use_cell(|| "text".to_string());
        assert_eq!(text.get(), "text");
        assert_eq!(hooks.slot_count(), 1);
    }

    #[test]
    fn detached_watch_reports_missing_bridge_and_stops_on_teardown() {
        let hooks = Hooks::detached();
        let calls = Arc::new(AtomicI32::new(0));

        hooks.begin_pass();
        let count = hooks.use_cell(|| 0);
        let calls_clone = calls.clone();
        let (handle, warnings) = diagnostics::capture(|| {
            hooks.use_watch(
                count.clone(),
                move |_: &i32, _: Option<&i32>| {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                },
                WatchOptions::default().lazy(true),
            )
        });

        assert_eq!(
            warnings,
            vec![
                Diagnostic::UnsupportedOption {
                    option: "lazy",
                    api: "use_watch"
                },
                Diagnostic::OutsideBridgeScope { hook: "use_watch" },
            ]
        );

        count.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        hooks.teardown();
        assert!(handle.is_some_and(|handle| !handle.is_active()));
        assert_eq!(hooks.slot_count(), 0);
    }

    #[test]
    fn custom_cell_is_built_once() {
        let hooks = Hooks::detached();
        let builds = Arc::new(AtomicI32::new(0));

        let build = |builds: Arc<AtomicI32>| {
            move |track: Track, trigger: Trigger| {
                builds.fetch_add(1, Ordering::SeqCst);
                let value = Arc::new(Mutex::new(0));
                let read = value.clone();
                (
                    move || {
                        track();
                        *read.lock()
                    },
                    move |next: i32| {
                        *value.lock() = next;
                        trigger();
                    },
                )
            }
        };

        hooks.begin_pass();
        let first = hooks.use_custom_cell(build(builds.clone()));
        first.set(9);

        hooks.begin_pass();
        let second = hooks.use_custom_cell(build(builds.clone()));
        assert_eq!(second.get(), 9);
        assert!(second.is_custom());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reactive_rerender_diffs_props() {
        let hooks = Hooks::detached();
        let props: Props = [("n".to_string(), Value::from(1))].into_iter().collect();

        hooks.begin_pass();
        let view = hooks.use_reactive_rerender(&props).expect("extensible");

        let next: Props = [("n".to_string(), Value::from(2))].into_iter().collect();
        hooks.begin_pass();
        let same_view = hooks.use_reactive_rerender(&next).expect("extensible");

        assert_eq!(view, same_view);
        assert_eq!(view.get("n"), Value::from(2));
    }
}
