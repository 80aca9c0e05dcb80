//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: computed
//! values, effects, watches and bridged render functions. Subscribers are
//! addressed by [`SubscriberId`] in the dependency maps and reach the runtime
//! through the [`Reactive`] trait.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Each subscriber (computed value, effect, or other reactive computation)
/// gets a unique ID when created. This ID keys its dependency edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Staleness of a subscriber.
///
/// Ordered so that a notification can only raise the level: a subscriber
/// that is already `Dirty` stays `Dirty` when a weaker notification arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    /// Up to date with every dependency.
    Clean,

    /// An upstream computed value was invalidated. It has to be refreshed to
    /// find out whether this subscriber really needs to run.
    MaybeDirty,

    /// A direct dependency changed. The subscriber has to run.
    Dirty,
}

/// A computation the runtime can notify and schedule.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Record that a dependency changed.
    ///
    /// Lazy subscribers (computed values) mark themselves and propagate
    /// `MaybeDirty` downstream. Eager subscribers (effects) queue themselves
    /// in the current trigger wave.
    fn notify(&self, level: DirtyState);

    /// Run a queued eager subscriber. Called once per trigger wave.
    fn schedule(&self);

    /// Bring a lazy subscriber up to date. A no-op for effects.
    fn refresh(&self);

    /// Whether this subscriber runs eagerly (effect) or lazily (computed).
    fn is_eager(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn dirty_state_only_escalates() {
        assert!(DirtyState::Dirty > DirtyState::MaybeDirty);
        assert!(DirtyState::MaybeDirty > DirtyState::Clean);
        assert_eq!(DirtyState::Dirty.max(DirtyState::MaybeDirty), DirtyState::Dirty);
    }
}
