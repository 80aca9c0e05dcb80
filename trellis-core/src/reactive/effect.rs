//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless it is lazy).
//!
//! 2. When any dependency changes, the effect is queued in the current
//!    trigger wave and runs once the wave closes, at most once per wave.
//!
//! 3. Before re-running, the effect runs its pending cleanups and clears its
//!    old dependencies, then tracks new ones during execution. A dependency
//!    edge exists only if the latest run read it.
//!
//! # Schedulers
//!
//! An effect with a scheduler does not re-run by itself. When it becomes
//! dirty the runtime calls the scheduler instead, which decides when to call
//! [`Effect::run`]. Watches and the render bridge are effects with
//! schedulers.
//!
//! # Cleanup
//!
//! Functions registered with [`on_effect_cleanup`] during a run (or returned
//! from an [`effect`] closure) run before the next run and when the effect is
//! stopped. A panicking cleanup propagates to whoever triggered the re-run or
//! the stop.
//!
//! # Threads
//!
//! Runs of one effect are serialized. A write from another thread while the
//! effect is running marks it dirty, and the effect runs again on its own
//! thread as soon as the current run returns. Writes made by the running
//! thread itself are ignored unless `allow_recurse` is set.
//!
//! # Lifetime
//!
//! The runtime keeps an active effect alive even if every handle is dropped,
//! like a listener attached to an event source. Stop it explicitly, or create
//! it inside an [`EffectScope`](super::scope::EffectScope) and stop the scope.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, ReentrantMutex};

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::scope::{EffectScope, Stoppable};
use super::subscriber::{DirtyState, Reactive, SubscriberId};
use crate::diagnostics::{self, Diagnostic};

/// A function run before the next execution of an effect, or when it stops.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Called instead of re-running an effect when it becomes dirty.
pub type Scheduler = Arc<dyn Fn() + Send + Sync>;

/// Called once when an effect is stopped.
pub type StopHook = Arc<dyn Fn() + Send + Sync>;

/// Options for [`Effect::with_options`] and [`effect`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,
    pub scheduler: Option<Scheduler>,
    pub on_stop: Option<StopHook>,
    /// Let writes made by the effect's own run queue it again.
    pub allow_recurse: bool,
}

impl EffectOptions {
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn scheduler(mut self, scheduler: impl Fn() + Send + Sync + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    pub fn on_stop(mut self, on_stop: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(on_stop));
        self
    }

    pub fn allow_recurse(mut self, allow_recurse: bool) -> Self {
        self.allow_recurse = allow_recurse;
        self
    }
}

/// What an effect closure may return: nothing, or a cleanup.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl<F: FnOnce() + Send + 'static> IntoCleanup for F {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(Box::new(self))
    }
}

impl<F: FnOnce() + Send + 'static> IntoCleanup for Option<F> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self.map(|f| Box::new(f) as Cleanup)
    }
}

struct EffectInner<T> {
    subscriber_id: SubscriberId,
    run: Box<dyn Fn() -> T + Send + Sync>,
    active: AtomicBool,
    /// Serializes runs across threads.
    run_lock: ReentrantMutex<()>,
    /// The thread currently running the effect.
    runner: Mutex<Option<ThreadId>>,
    /// Another thread notified the effect during a run.
    rerun: AtomicBool,
    state: Mutex<DirtyState>,
    cleanups: Mutex<Vec<Cleanup>>,
    upstream: Mutex<Vec<Weak<dyn Reactive>>>,
    run_count: AtomicUsize,
    scheduler: Option<Scheduler>,
    on_stop: Option<StopHook>,
    allow_recurse: bool,
}

/// Restores the runner, so that a panicking run does not leave the effect
/// deaf to notifications.
struct RunningGuard<'a> {
    runner: &'a Mutex<Option<ThreadId>>,
    previous: Option<ThreadId>,
}

impl<'a> RunningGuard<'a> {
    fn enter(runner: &'a Mutex<Option<ThreadId>>) -> Self {
        let previous = runner.lock().replace(thread::current().id());
        Self { runner, previous }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self.runner.lock() = self.previous;
    }
}

impl<T> EffectInner<T> {
    fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.lock());
        for cleanup in cleanups {
            cleanup();
        }
    }

    fn run(&self) -> Option<T> {
        if !self.active.load(Ordering::Acquire) {
            return None;
        }
        let _serial = self.run_lock.lock();
        // Stopped while waiting for another thread's run.
        if !self.active.load(Ordering::Acquire) {
            return None;
        }

        self.run_cleanups();
        *self.state.lock() = DirtyState::Clean;
        Runtime::clear_dependencies(self.subscriber_id);

        let running = RunningGuard::enter(&self.runner);
        let ctx = ReactiveContext::enter(self.subscriber_id);
        let value = (self.run)();
        let collected = ctx.finish();
        drop(running);

        *self.upstream.lock() = collected.upstream;
        self.cleanups.lock().extend(collected.cleanups);
        let count = self.run_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(id = self.subscriber_id.raw(), run = count, "effect ran");

        // Stopped from inside its own run: drop what the run just collected.
        if !self.active.load(Ordering::Acquire) {
            Runtime::clear_dependencies(self.subscriber_id);
            self.run_cleanups();
        } else if self.rerun.swap(false, Ordering::AcqRel) {
            tracing::trace!(id = self.subscriber_id.raw(), "effect changed during its run");
            Runtime::enqueue(self.subscriber_id);
        }
        Some(value)
    }

    /// Resolve a pending notification: a maybe-dirty effect refreshes the
    /// computed values it read and runs only if one of them changed.
    fn should_run(&self) -> bool {
        let state = *self.state.lock();
        match state {
            DirtyState::Clean => false,
            DirtyState::Dirty => true,
            DirtyState::MaybeDirty => {
                let upstream = self.upstream.lock().clone();
                for reactive in upstream.iter().filter_map(Weak::upgrade) {
                    reactive.refresh();
                    if *self.state.lock() == DirtyState::Dirty {
                        return true;
                    }
                }

                let mut state = self.state.lock();
                if *state == DirtyState::Dirty {
                    return true;
                }
                *state = DirtyState::Clean;
                false
            }
        }
    }

    fn stop(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        Runtime::unregister(self.subscriber_id);
        self.run_cleanups();
        if let Some(on_stop) = &self.on_stop {
            on_stop();
        }
        tracing::trace!(id = self.subscriber_id.raw(), "effect stopped");
    }
}

impl<T: Send + 'static> Reactive for EffectInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn notify(&self, level: DirtyState) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        {
            let runner = self.runner.lock();
            match *runner {
                Some(thread) if thread == thread::current().id() => {
                    if !self.allow_recurse {
                        return;
                    }
                }
                Some(_) => {
                    // Picked up by the running thread once its run returns.
                    let mut state = self.state.lock();
                    *state = (*state).max(level);
                    self.rerun.store(true, Ordering::Release);
                    return;
                }
                None => {}
            }
        }

        let was_clean = {
            let mut state = self.state.lock();
            let was_clean = *state == DirtyState::Clean;
            *state = (*state).max(level);
            was_clean
        };

        if was_clean {
            Runtime::enqueue(self.subscriber_id);
        }
    }

    fn schedule(&self) {
        if !self.active.load(Ordering::Acquire) || !self.should_run() {
            return;
        }

        match &self.scheduler {
            Some(scheduler) => scheduler(),
            None => {
                self.run();
            }
        }
    }

    fn refresh(&self) {}

    fn is_eager(&self) -> bool {
        true
    }
}

impl<T: Send + 'static> Stoppable for EffectInner<T> {
    fn stop(&self) {
        EffectInner::stop(self);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// `T` is the return value of the effect function, handed back by
/// [`Effect::run`].
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
/// use trellis_core::reactive::{Cell, Effect};
///
/// let count = Cell::new(0);
/// let seen = Arc::new(AtomicI32::new(-1));
///
/// let (count_clone, seen_clone) = (count.clone(), seen.clone());
/// let effect = Effect::new(move || {
///     seen_clone.store(count_clone.get(), Ordering::SeqCst);
/// });
///
/// count.set(5);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// effect.stop();
/// ```
pub struct Effect<T = ()> {
    inner: Arc<EffectInner<T>>,
}

/// A handle that does not keep an effect alive.
pub struct WeakEffect<T = ()> {
    inner: Weak<EffectInner<T>>,
}

impl<T: Send + 'static> Effect<T> {
    /// Create an effect and run it immediately.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_options(run, EffectOptions::default())
    }

    pub fn with_options<F>(run: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new_cyclic(run, move |_| options)
    }

    /// Create an effect whose options are built from a weak handle to the
    /// effect itself, typically a scheduler that calls back into it.
    pub fn new_cyclic<F, B>(run: F, build: B) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        B: FnOnce(WeakEffect<T>) -> EffectOptions,
    {
        let mut lazy = false;
        let inner = Arc::new_cyclic(|weak: &Weak<EffectInner<T>>| {
            let options = build(WeakEffect {
                inner: weak.clone(),
            });
            lazy = options.lazy;

            EffectInner {
                subscriber_id: SubscriberId::new(),
                run: Box::new(run),
                active: AtomicBool::new(true),
                run_lock: ReentrantMutex::new(()),
                runner: Mutex::new(None),
                rerun: AtomicBool::new(false),
                state: Mutex::new(DirtyState::Dirty),
                cleanups: Mutex::new(Vec::new()),
                upstream: Mutex::new(Vec::new()),
                run_count: AtomicUsize::new(0),
                scheduler: options.scheduler,
                on_stop: options.on_stop,
                allow_recurse: options.allow_recurse,
            }
        });

        Runtime::register(Arc::clone(&inner) as Arc<dyn Reactive>);
        EffectScope::record(Arc::clone(&inner) as Arc<dyn Stoppable>);

        let effect = Self { inner };
        if !lazy {
            effect.run();
        }
        effect
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Run the effect now, re-collecting its dependencies.
    ///
    /// Returns `None` once the effect is stopped.
    pub fn run(&self) -> Option<T> {
        self.inner.run()
    }

    /// Stop the effect: drop its dependencies, run pending cleanups and the
    /// `on_stop` hook. Stopping twice does nothing.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Whether a dependency changed since the last run.
    pub fn is_dirty(&self) -> bool {
        *self.inner.state.lock() != DirtyState::Clean
    }

    pub fn state(&self) -> DirtyState {
        *self.inner.state.lock()
    }

    /// Number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Number of keys the latest run depends on.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.subscriber_id)
    }

    pub fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.subscriber_id.raw())
            .field("active", &self.inner.active.load(Ordering::Acquire))
            .field("runs", &self.inner.run_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> WeakEffect<T> {
    pub fn upgrade(&self) -> Option<Effect<T>> {
        self.inner.upgrade().map(|inner| Effect { inner })
    }
}

impl<T> Clone for WeakEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Create an effect from a closure that returns nothing or a cleanup.
///
/// The returned cleanup runs before the next run and when the effect stops.
pub fn effect<F, C>(f: F, options: EffectOptions) -> Effect
where
    F: Fn() -> C + Send + Sync + 'static,
    C: IntoCleanup,
{
    Effect::with_options(
        move || {
            if let Some(cleanup) = f().into_cleanup() {
                on_effect_cleanup(cleanup);
            }
        },
        options,
    )
}

/// Register a cleanup for the effect that is currently running.
///
/// Outside a tracked run the cleanup is dropped without running.
pub fn on_effect_cleanup(cleanup: impl FnOnce() + Send + 'static) {
    if ReactiveContext::register_cleanup(Box::new(cleanup)).is_some() {
        diagnostics::emit(Diagnostic::NoActiveEffect {
            api: "on_effect_cleanup",
        });
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
