//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, proxies,
//! computed values and effects. It owns the dependency graph and schedules
//! updates when tracked state changes.
//!
//! # How It Works
//!
//! 1. Every observable piece of state has a [`TargetId`]. A read of one of
//!    its keys inside a tracked run calls [`Runtime::track`], which records
//!    an edge between the [`DepKey`] and the running subscriber.
//!
//! 2. A write calls [`Runtime::trigger`] with the keys it changed. This opens
//!    a trigger wave. Every subscriber of those keys is notified:
//!    a. Computed values mark themselves dirty and pass `MaybeDirty` on to
//!       their own dependents.
//!    b. Effects queue themselves in the wave. The queue is a set, so an
//!       effect runs at most once per wave however many of its keys changed.
//!
//! 3. When the outermost wave closes, queued effects run in the order they
//!    were first notified. Writes performed by those effects join the
//!    running flush instead of starting a nested one.
//!
//! [`Runtime::batch`] holds a wave open across several writes.
//!
//! # Thread Safety
//!
//! The dependency maps are global `DashMap`s so that state can be shared
//! across threads. The wave queue is thread-local: effects run on the thread
//! that performed the write.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::IndexSet;

use super::context::ReactiveContext;
use super::subscriber::{DirtyState, Reactive, SubscriberId};

/// Identity of an observable target (a cell, a proxied container, or a
/// computed value seen from its readers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Allocate a fresh target identity.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

/// The part of a target that was read or written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// The whole value of a cell or computed.
    Value,
    /// A named property of an object.
    Prop(Arc<str>),
    /// An element of a list.
    Index(usize),
    /// The length of a list.
    Length,
    /// The key set of a container (iteration, `len`, membership of new keys).
    Iterate,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => f.write_str("value"),
            Self::Prop(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
            Self::Length => f.write_str("length"),
            Self::Iterate => f.write_str("<iterate>"),
        }
    }
}

/// A dependency edge endpoint: one key of one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepKey {
    pub target: TargetId,
    pub key: Key,
}

impl DepKey {
    pub fn new(target: TargetId, key: Key) -> Self {
        Self { target, key }
    }

    /// The whole-value key of a cell or computed.
    pub fn value(target: TargetId) -> Self {
        Self::new(target, Key::Value)
    }
}

/// How the registry holds on to a subscriber.
enum Registration {
    /// Effects stay alive until stopped, like listeners on an event source.
    Strong(Arc<dyn Reactive>),
    /// Computed values live as long as someone holds them.
    Weak(Weak<dyn Reactive>),
}

impl Registration {
    fn upgrade(&self) -> Option<Arc<dyn Reactive>> {
        match self {
            Self::Strong(reactive) => Some(Arc::clone(reactive)),
            Self::Weak(weak) => weak.upgrade(),
        }
    }
}

static REGISTRY: OnceLock<DashMap<SubscriberId, Registration>> = OnceLock::new();
static SUBSCRIBERS: OnceLock<DashMap<DepKey, IndexSet<SubscriberId>>> = OnceLock::new();
static DEPENDENCIES: OnceLock<DashMap<SubscriberId, IndexSet<DepKey>>> = OnceLock::new();

fn registry() -> &'static DashMap<SubscriberId, Registration> {
    REGISTRY.get_or_init(DashMap::new)
}

fn subscribers() -> &'static DashMap<DepKey, IndexSet<SubscriberId>> {
    SUBSCRIBERS.get_or_init(DashMap::new)
}

fn dependencies() -> &'static DashMap<SubscriberId, IndexSet<DepKey>> {
    DEPENDENCIES.get_or_init(DashMap::new)
}

/// Per-thread trigger wave.
#[derive(Default)]
struct Wave {
    depth: usize,
    flushing: bool,
    queue: IndexSet<SubscriberId>,
}

thread_local! {
    static WAVE: RefCell<Wave> = RefCell::new(Wave::default());
}

/// Closes a wave level on drop, flushing when it was the outermost one.
struct WaveGuard;

impl WaveGuard {
    fn open() -> Self {
        WAVE.with(|wave| wave.borrow_mut().depth += 1);
        WaveGuard
    }
}

impl Drop for WaveGuard {
    fn drop(&mut self) {
        let should_flush = WAVE.with(|wave| {
            let mut wave = wave.borrow_mut();
            wave.depth -= 1;
            wave.depth == 0 && !wave.flushing
        });

        if should_flush && !std::thread::panicking() {
            Runtime::flush();
        }
    }
}

/// Resets the flushing flag even if an effect panics.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        WAVE.with(|wave| wave.borrow_mut().flushing = false);
    }
}

/// The global reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register an eager subscriber. The runtime keeps it alive until
    /// [`Runtime::unregister`] is called.
    pub fn register(reactive: Arc<dyn Reactive>) {
        let id = reactive.subscriber_id();
        registry().insert(id, Registration::Strong(reactive));
    }

    /// Register a lazy subscriber without keeping it alive.
    pub fn register_weak(reactive: Weak<dyn Reactive>, id: SubscriberId) {
        registry().insert(id, Registration::Weak(reactive));
    }

    /// Forget a subscriber and all of its dependency edges.
    pub fn unregister(id: SubscriberId) {
        registry().remove(&id);
        Self::clear_dependencies(id);
        WAVE.with(|wave| {
            wave.borrow_mut().queue.shift_remove(&id);
        });
    }

    /// Whether the subscriber is still registered.
    pub fn is_registered(id: SubscriberId) -> bool {
        registry().contains_key(&id)
    }

    fn lookup(id: SubscriberId) -> Option<Arc<dyn Reactive>> {
        let reactive = registry().get(&id).and_then(|entry| entry.upgrade());
        if reactive.is_none() {
            // Dead weak entry; drop it so it stops receiving notifications.
            registry().remove_if(&id, |_, entry| entry.upgrade().is_none());
        }
        reactive
    }

    /// Record that the running subscriber read `key` of `target`.
    ///
    /// Does nothing outside a tracked run.
    pub fn track(target: TargetId, key: Key) {
        let Some(subscriber) = ReactiveContext::current_subscriber() else {
            return;
        };

        let dep = DepKey::new(target, key);
        subscribers()
            .entry(dep.clone())
            .or_default()
            .insert(subscriber);
        dependencies().entry(subscriber).or_default().insert(dep);
    }

    /// Remove all dependency edges of a subscriber.
    ///
    /// Called before re-running a computation so that it only depends on what
    /// the new run reads.
    pub fn clear_dependencies(subscriber: SubscriberId) {
        let Some((_, deps)) = dependencies().remove(&subscriber) else {
            return;
        };

        for dep in deps {
            if let Some(mut subs) = subscribers().get_mut(&dep) {
                subs.shift_remove(&subscriber);
            }
            subscribers().remove_if(&dep, |_, subs| subs.is_empty());
        }
    }

    /// Number of subscribers currently tracking a key.
    pub fn subscriber_count(dep: &DepKey) -> usize {
        subscribers().get(dep).map_or(0, |subs| subs.len())
    }

    /// Number of keys a subscriber currently depends on.
    pub fn dependency_count(subscriber: SubscriberId) -> usize {
        dependencies().get(&subscriber).map_or(0, |deps| deps.len())
    }

    /// Notify everything that depends on `key` of `target` that it changed.
    pub fn trigger(target: TargetId, key: Key) {
        Self::trigger_keys([DepKey::new(target, key)]);
    }

    /// Notify the dependents of several keys in a single wave.
    pub fn trigger_keys(keys: impl IntoIterator<Item = DepKey>) {
        Self::notify_keys(keys, DirtyState::Dirty);
    }

    /// Pass a dirty level on to the dependents of `keys`.
    pub(crate) fn notify_keys(keys: impl IntoIterator<Item = DepKey>, level: DirtyState) {
        let mut ids: IndexSet<SubscriberId> = IndexSet::new();
        for dep in keys {
            if let Some(subs) = subscribers().get(&dep) {
                ids.extend(subs.iter().copied());
            }
        }

        if ids.is_empty() {
            return;
        }

        tracing::trace!(count = ids.len(), ?level, "notifying subscribers");

        let _wave = WaveGuard::open();
        for id in ids {
            if let Some(reactive) = Self::lookup(id) {
                reactive.notify(level);
            }
        }
    }

    /// Queue an eager subscriber in the current wave.
    pub(crate) fn enqueue(id: SubscriberId) {
        let flush_now = WAVE.with(|wave| {
            let mut wave = wave.borrow_mut();
            wave.queue.insert(id);
            wave.depth == 0 && !wave.flushing
        });

        if flush_now {
            Self::flush();
        }
    }

    /// Run `f` with the trigger wave held open. Effects queued by writes
    /// inside `f` run once, after `f` returns.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        let _wave = WaveGuard::open();
        f()
    }

    fn flush() {
        let already_flushing = WAVE.with(|wave| {
            let mut wave = wave.borrow_mut();
            std::mem::replace(&mut wave.flushing, true)
        });
        if already_flushing {
            return;
        }
        let _guard = FlushGuard;

        loop {
            let next = WAVE.with(|wave| wave.borrow_mut().queue.shift_remove_index(0));
            let Some(id) = next else {
                break;
            };

            if let Some(reactive) = Self::lookup(id) {
                reactive.schedule();
            }
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a tracked run.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_tracking()
    }
}
