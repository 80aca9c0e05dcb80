//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a cell is read, the
//! current computation is registered as a dependent.
//!
//! # Implementation
//!
//! A thread-local stack records the executing computations. Entering a
//! tracked run pushes an entry, and the returned guard pops it again, even
//! when the computation panics. Nested runs (a computed value read inside an
//! effect) push on top of the outer entry, so inner reads are attributed to
//! the inner computation and the outer one resumes afterwards.
//!
//! Besides the subscriber ID, an entry collects what the run produced apart
//! from dependency edges: the upstream computed values it read and the
//! cleanup callbacks it registered.

use std::cell::RefCell;
use std::sync::Weak;

use smallvec::SmallVec;

use super::effect::Cleanup;
use super::subscriber::{Reactive, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The running computation. `None` for untracked sections.
    subscriber_id: Option<SubscriberId>,
    /// Computed values read during this run.
    upstream: SmallVec<[Weak<dyn Reactive>; 4]>,
    /// Cleanups registered during this run.
    cleanups: SmallVec<[Cleanup; 2]>,
}

/// What a tracked run left behind besides its dependency edges.
#[derive(Default)]
pub struct Collected {
    /// Computed values that were read, in read order.
    pub upstream: Vec<Weak<dyn Reactive>>,
    /// Cleanups registered through [`on_effect_cleanup`](super::effect::on_effect_cleanup).
    pub cleanups: Vec<Cleanup>,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    depth: usize,
    subscriber_id: Option<SubscriberId>,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any cell that is read registers the
    /// subscriber as a dependent.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    /// Enter a section in which reads are not tracked.
    pub fn enter_untracked() -> Self {
        Self::push(None)
    }

    fn push(subscriber_id: Option<SubscriberId>) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(ContextEntry {
                subscriber_id,
                upstream: SmallVec::new(),
                cleanups: SmallVec::new(),
            });
            stack.len() - 1
        });

        Self {
            depth,
            subscriber_id,
            finished: false,
        }
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber_id))
    }

    /// Record that the current computation read a computed value.
    pub fn track_upstream(upstream: Weak<dyn Reactive>) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.subscriber_id.is_some() {
                    entry.upstream.push(upstream);
                }
            }
        });
    }

    /// Attach a cleanup to the current computation.
    ///
    /// Returns the cleanup back when no tracked computation is running.
    pub fn register_cleanup(cleanup: Cleanup) -> Option<Cleanup> {
        CONTEXT_STACK.with(|stack| match stack.borrow_mut().last_mut() {
            Some(entry) if entry.subscriber_id.is_some() => {
                entry.cleanups.push(cleanup);
                None
            }
            _ => Some(cleanup),
        })
    }

    /// Pop the context and return what the run collected.
    pub fn finish(mut self) -> Collected {
        self.finished = true;
        self.pop().map_or_else(Collected::default, |entry| Collected {
            upstream: entry.upstream.into_vec(),
            cleanups: entry.cleanups.into_vec(),
        })
    }

    fn pop(&self) -> Option<ContextEntry> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.len() <= self.depth {
                return None;
            }
            // Entries above ours belong to guards that were leaked; drop them.
            stack.truncate(self.depth + 1);
            let popped = stack.pop();

            if let Some(entry) = &popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
            popped
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

/// Run `f` without tracking any reads it performs.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter_untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_subscriber() {
        let id = SubscriberId::new();

        assert!(!ReactiveContext::is_tracking());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_tracking());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_tracking());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn nested_contexts() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untracked_section_hides_outer_subscriber() {
        let id = SubscriberId::new();
        let _ctx = ReactiveContext::enter(id);

        untracked(|| {
            assert!(!ReactiveContext::is_tracking());
        });

        assert_eq!(ReactiveContext::current_subscriber(), Some(id));
    }

    #[test]
    fn finish_returns_registered_cleanups() {
        let ctx = ReactiveContext::enter(SubscriberId::new());
        assert!(ReactiveContext::register_cleanup(Box::new(|| {})).is_none());
        assert!(ReactiveContext::register_cleanup(Box::new(|| {})).is_none());

        let collected = ctx.finish();
        assert_eq!(collected.cleanups.len(), 2);
        assert!(!ReactiveContext::is_tracking());
    }

    #[test]
    fn cleanup_is_returned_without_context() {
        assert!(ReactiveContext::register_cleanup(Box::new(|| {})).is_some());
    }
}
