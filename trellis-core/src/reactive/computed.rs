//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computed Values Work
//!
//! 1. On first access, the getter runs inside a tracked run and the result
//!    is cached.
//!
//! 2. When accessed again, if no dependencies have changed, the cached value
//!    is returned.
//!
//! 3. When a dependency changes, the computed is marked dirty and its own
//!    readers are marked "maybe dirty".
//!
//! 4. A maybe-dirty reader first refreshes the computed values it read. Only
//!    a computed whose value actually changed (by
//!    [`ReactiveValue::same_value`]) escalates its readers to dirty, so an
//!    effect downstream of an unchanged computed does not run at all.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A cell changes
//! - 10 computed values depend on it
//! - Only the ones actually read will recompute
//! - Computed values that are never read stay dirty (no wasted work)
//!
//! # Thread Safety
//!
//! The cached value and dirty state sit behind `parking_lot` locks. Bringing
//! the value up to date is serialized by a separate lock: a thread that reads
//! while another thread is computing waits for that computation and returns
//! its result. Only a read from the computing thread itself (a getter that
//! reaches its own value) is a circular dependency.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, RwLock};

use super::context::ReactiveContext;
use super::runtime::{DepKey, Key, Runtime, TargetId};
use super::subscriber::{DirtyState, Reactive, SubscriberId};
use super::traverse::Seen;
use super::value::ReactiveValue;
use crate::error::{ReactiveError, Result};

type Getter<T> = Box<dyn Fn() -> T + Send + Sync>;
type Setter<T> = Box<dyn Fn(T) + Send + Sync>;

struct ComputedInner<T> {
    /// Identity as a reader of other state.
    subscriber_id: SubscriberId,
    /// Identity as state read by others.
    target: TargetId,
    getter: Getter<T>,
    setter: Option<Setter<T>>,
    /// The cached value (None if never computed).
    value: RwLock<Option<T>>,
    state: Mutex<DirtyState>,
    /// Held while the value is brought up to date.
    compute: Mutex<()>,
    /// The thread holding `compute`.
    owner: Mutex<Option<ThreadId>>,
    /// Computed values read by the last run, refreshed before deciding
    /// whether a maybe-dirty value has to recompute.
    upstream: Mutex<Vec<Weak<dyn Reactive>>>,
}

/// Clears the owner, and marks the value dirty again if the getter panicked.
struct ComputeGuard<'a, T> {
    inner: &'a ComputedInner<T>,
}

impl<T> Drop for ComputeGuard<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            *self.inner.state.lock() = DirtyState::Dirty;
        }
        *self.inner.owner.lock() = None;
    }
}

impl<T: ReactiveValue> ComputedInner<T> {
    fn circular(&self) -> ReactiveError {
        ReactiveError::CircularDependency {
            id: self.target.raw(),
        }
    }

    /// Whether the current thread is inside this value's update.
    fn computing_here(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    /// Bring the cached value up to date.
    ///
    /// Waits while another thread updates it. Readers of the value are
    /// notified after the lock is released.
    fn update(&self) -> Result<()> {
        if self.computing_here() {
            return Err(self.circular());
        }

        let changed = {
            let _serial = self.compute.lock();
            *self.owner.lock() = Some(thread::current().id());
            let _guard = ComputeGuard { inner: self };
            self.update_locked()
        };

        if changed {
            tracing::trace!(id = self.target.raw(), "computed value changed");
            Runtime::notify_keys([DepKey::value(self.target)], DirtyState::Dirty);
        }
        Ok(())
    }

    /// Returns whether the cached value changed.
    fn update_locked(&self) -> bool {
        let state = *self.state.lock();
        match state {
            DirtyState::Clean => false,
            DirtyState::Dirty => self.recompute(),
            DirtyState::MaybeDirty => {
                let upstream = self.upstream.lock().clone();
                for reactive in upstream.iter().filter_map(Weak::upgrade) {
                    reactive.refresh();
                    if *self.state.lock() == DirtyState::Dirty {
                        break;
                    }
                }

                let mut state = self.state.lock();
                if *state == DirtyState::Dirty {
                    drop(state);
                    self.recompute()
                } else {
                    *state = DirtyState::Clean;
                    false
                }
            }
        }
    }

    fn recompute(&self) -> bool {
        // Mark clean first: a dependency that changes while the getter runs
        // leaves the value dirty.
        *self.state.lock() = DirtyState::Clean;

        Runtime::clear_dependencies(self.subscriber_id);
        let ctx = ReactiveContext::enter(self.subscriber_id);
        let new_value = (self.getter)();
        let collected = ctx.finish();
        *self.upstream.lock() = collected.upstream;

        let mut slot = self.value.write();
        let changed = slot
            .as_ref()
            .is_some_and(|old| !old.same_value(&new_value));
        *slot = Some(new_value);
        changed
    }
}

impl<T: ReactiveValue> Reactive for ComputedInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn notify(&self, level: DirtyState) {
        let was_clean = {
            let mut state = self.state.lock();
            let was_clean = *state == DirtyState::Clean;
            *state = (*state).max(level);
            was_clean
        };

        if was_clean {
            Runtime::notify_keys([DepKey::value(self.target)], DirtyState::MaybeDirty);
        }
    }

    fn schedule(&self) {}

    fn refresh(&self) {
        if let Err(err) = self.update() {
            tracing::error!(id = self.target.raw(), %err, "refreshing computed value failed");
        }
    }

    fn is_eager(&self) -> bool {
        false
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Cell, Computed};
///
/// let count = Cell::new(2);
/// let count_clone = count.clone();
/// let doubled = Computed::new(move || count_clone.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T: ReactiveValue> Computed<T> {
    /// Create a readonly computed value.
    ///
    /// The getter is not run immediately. It runs on first access.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Box::new(getter), None)
    }

    /// Create a computed value whose `set` forwards to `setter`.
    pub fn writable<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self::build(Box::new(getter), Some(Box::new(setter)))
    }

    fn build(getter: Getter<T>, setter: Option<Setter<T>>) -> Self {
        let inner = Arc::new(ComputedInner {
            subscriber_id: SubscriberId::new(),
            target: TargetId::new(),
            getter,
            setter,
            value: RwLock::new(None),
            state: Mutex::new(DirtyState::Dirty),
            compute: Mutex::new(()),
            owner: Mutex::new(None),
            upstream: Mutex::new(Vec::new()),
        });

        let weak: Weak<dyn Reactive> = Arc::downgrade(&inner) as Weak<ComputedInner<T>>;
        Runtime::register_weak(weak, inner.subscriber_id);
        Self { inner }
    }

    /// Identity of this value as read by others.
    pub fn id(&self) -> TargetId {
        self.inner.target
    }

    /// Get the subscriber ID used for this value's own dependencies.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the value is read from inside its own getter. Use
    /// [`Computed::try_get`] to observe that case as an error.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value, or `CircularDependency` when called from
    /// inside its own getter.
    pub fn try_get(&self) -> Result<T> {
        if self.inner.computing_here() {
            return Err(self.inner.circular());
        }

        Runtime::track(self.inner.target, Key::Value);
        let weak: Weak<dyn Reactive> = Arc::downgrade(&self.inner) as Weak<ComputedInner<T>>;
        ReactiveContext::track_upstream(weak);

        self.inner.update()?;
        self.inner
            .value
            .read()
            .clone()
            .ok_or_else(|| self.inner.circular())
    }

    /// Write through the setter.
    pub fn set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactiveError::NotWritable),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        *self.inner.state.lock()
    }

    /// Whether the getter has run at least once.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Get the number of readers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(&DepKey::value(self.inner.target))
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ReactiveValue> ReactiveValue for Computed<T> {
    fn same_value(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn traverse(&self, seen: &mut Seen) {
        self.get().traverse(seen);
    }
}

impl<T: ReactiveValue + Debug> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.target.raw())
            .field("state", &self.state())
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
