//! Cell Implementation
//!
//! A Cell is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Cells Work
//!
//! 1. When a cell is read within a tracked run (computed/effect), the cell
//!    registers that run as a subscriber.
//!
//! 2. When a cell is assigned a value that differs from the current one (by
//!    [`ReactiveValue::same_value`]), all subscribers are notified
//!    synchronously, or through their scheduler.
//!
//! 3. Assigning an equal value does nothing.
//!
//! # Deep and Shallow Cells
//!
//! A deep cell (the default) converts raw containers to reactive views when
//! it stores them, so mutating a nested object re-runs whoever read it
//! through the cell. A shallow cell stores the value as given: only
//! reassignment is observable, and nested mutation must be announced with
//! [`Cell::mark_changed`].
//!
//! # Custom Cells
//!
//! [`Cell::custom`] hands the tracking and triggering to user code: the
//! factory receives a [`Track`] and a [`Trigger`] callback and returns the
//! getter and setter. This is how debounced or filtered cells are built.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::untracked;
use super::runtime::{DepKey, Key, Runtime, TargetId};
use super::traverse::Seen;
use super::value::ReactiveValue;

/// Records a read of a custom cell in the running computation.
pub type Track = Arc<dyn Fn() + Send + Sync>;

/// Notifies the readers of a custom cell.
pub type Trigger = Arc<dyn Fn() + Send + Sync>;

type Getter<T> = Box<dyn Fn() -> T + Send + Sync>;
type Setter<T> = Box<dyn Fn(T) + Send + Sync>;

enum Storage<T> {
    Plain { value: RwLock<T>, shallow: bool },
    Custom { get: Getter<T>, set: Setter<T> },
}

struct CellInner<T> {
    id: TargetId,
    storage: Storage<T>,
}

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Cell;
///
/// let count = Cell::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Cell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T: ReactiveValue> Cell<T> {
    /// Create a new deep cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_depth(value.to_reactive(), false)
    }

    /// Create a cell that only observes reassignment.
    pub fn shallow(value: T) -> Self {
        Self::with_depth(value, true)
    }

    fn with_depth(value: T, shallow: bool) -> Self {
        Self {
            inner: Arc::new(CellInner {
                id: TargetId::new(),
                storage: Storage::Plain {
                    value: RwLock::new(value),
                    shallow,
                },
            }),
        }
    }

    /// Create a cell whose reads and writes are implemented by `factory`.
    ///
    /// The getter should call `track` to become observable and the setter
    /// should call `trigger` when readers need to re-run. Values pass through
    /// unchanged: no deep conversion and no equality check.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use parking_lot::Mutex;
    /// use trellis_core::reactive::Cell;
    ///
    /// let cell = Cell::custom(|track, trigger| {
    ///     let value = Arc::new(Mutex::new(0));
    ///     let read = value.clone();
    ///     (
    ///         move || {
    ///             track();
    ///             *read.lock()
    ///         },
    ///         move |next| {
    ///             *value.lock() = next;
    ///             trigger();
    ///         },
    ///     )
    /// });
    ///
    /// cell.set(3);
    /// assert_eq!(cell.get(), 3);
    /// ```
    pub fn custom<F, G, S>(factory: F) -> Self
    where
        F: FnOnce(Track, Trigger) -> (G, S),
        G: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        let id = TargetId::new();
        let track: Track = Arc::new(move || Runtime::track(id, Key::Value));
        let trigger: Trigger = Arc::new(move || Runtime::trigger(id, Key::Value));
        let (get, set) = factory(track, trigger);
        Self {
            inner: Arc::new(CellInner {
                id,
                storage: Storage::Custom {
                    get: Box::new(get),
                    set: Box::new(set),
                },
            }),
        }
    }

    /// Get the cell's identity in the dependency graph.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    pub fn is_shallow(&self) -> bool {
        matches!(self.inner.storage, Storage::Plain { shallow: true, .. })
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.inner.storage, Storage::Custom { .. })
    }

    /// Get the current value.
    ///
    /// If called within a tracked run, this also registers the running
    /// computation as a subscriber.
    pub fn get(&self) -> T {
        match &self.inner.storage {
            Storage::Plain { value, .. } => {
                Runtime::track(self.inner.id, Key::Value);
                value.read().clone()
            }
            Storage::Custom { get, .. } => get(),
        }
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        match &self.inner.storage {
            Storage::Plain { value, .. } => value.read().clone(),
            Storage::Custom { get, .. } => untracked(get),
        }
    }

    /// Borrow the current value (tracked).
    ///
    /// The cell is locked while `f` runs; `f` must not write to this cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match &self.inner.storage {
            Storage::Plain { value, .. } => {
                Runtime::track(self.inner.id, Key::Value);
                f(&value.read())
            }
            Storage::Custom { get, .. } => f(&get()),
        }
    }

    /// Set a new value and notify subscribers if it changed.
    pub fn set(&self, value: T) {
        let (slot, shallow) = match &self.inner.storage {
            Storage::Plain { value, shallow } => (value, *shallow),
            Storage::Custom { set, .. } => {
                set(value);
                return;
            }
        };
        let value = if shallow { value } else { value.to_reactive() };

        {
            let mut guard = slot.write();
            if guard.same_value(&value) {
                return;
            }
            *guard = value;
        }

        Runtime::trigger(self.inner.id, Key::Value);
    }

    /// Update the value using a function.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let new_value = match &self.inner.storage {
            Storage::Plain { value, .. } => {
                let guard = value.read();
                f(&guard)
            }
            Storage::Custom { .. } => f(&self.get_untracked()),
        };
        self.set(new_value);
    }

    /// Notify subscribers without changing the value.
    ///
    /// Used after mutating the inside of a shallow cell's value.
    pub fn mark_changed(&self) {
        Runtime::trigger(self.inner.id, Key::Value);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(&DepKey::value(self.inner.id))
    }
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ReactiveValue + Default> Default for Cell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ReactiveValue> ReactiveValue for Cell<T> {
    fn same_value(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn traverse(&self, seen: &mut Seen) {
        self.get().traverse(seen);
    }
}

impl<T: ReactiveValue + Debug> Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.inner.id.raw())
            .field("value", &self.get_untracked())
            .field("shallow", &self.is_shallow())
            .field("custom", &self.is_custom())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
