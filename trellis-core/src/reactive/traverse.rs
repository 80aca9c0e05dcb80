//! Deep traversal.
//!
//! A deep watch has to depend on every nested property of its source, not
//! only on the source's identity. Traversal reads the whole structure inside
//! the watch's tracked run, so each visited key registers a dependency edge.
//!
//! Reactive graphs can be cyclic (an object stored inside itself), so
//! traversal keeps the set of targets it has already entered.

use std::collections::HashSet;

use super::runtime::TargetId;
use super::value::ReactiveValue;

/// Targets already entered by a traversal.
#[derive(Debug, Default)]
pub struct Seen {
    targets: HashSet<TargetId>,
}

impl Seen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a target as entered. Returns `false` if it was already visited.
    pub fn enter(&mut self, target: TargetId) -> bool {
        self.targets.insert(target)
    }

    /// Forget a target once its subtree is done, so that shared (but not
    /// cyclic) structure is visited again from another path.
    pub fn leave(&mut self, target: TargetId) {
        self.targets.remove(&target);
    }

    pub fn contains(&self, target: TargetId) -> bool {
        self.targets.contains(&target)
    }
}

/// Read every nested part of `value` so the running computation depends on
/// all of it.
pub fn traverse<T: ReactiveValue>(value: &T) {
    value.traverse(&mut Seen::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::context::ReactiveContext;
    use crate::reactive::object::ReactiveObject;
    use crate::reactive::proxy::reactive;
    use crate::reactive::runtime::{DepKey, Key, Runtime};
    use crate::reactive::subscriber::SubscriberId;
    use crate::reactive::value::Value;

    #[test]
    fn seen_guards_reentry() {
        let mut seen = Seen::new();
        let id = TargetId::new();

        assert!(seen.enter(id));
        assert!(!seen.enter(id));
        assert!(seen.contains(id));
    }

    #[test]
    fn traversal_tracks_nested_keys_and_survives_cycles() {
        let inner = ReactiveObject::from_iter([("x", Value::from(1))]);
        let outer = ReactiveObject::from_iter([("inner", Value::Object(inner.clone()))]);
        // outer.inner.parent = outer
        inner
            .set("parent", Value::Object(outer.clone()))
            .expect("raw object is extensible");

        let view = reactive(&outer).expect("extensible");
        let subscriber = SubscriberId::new();
        {
            let _ctx = ReactiveContext::enter(subscriber);
            traverse(&Value::Object(view));
        }

        let nested = DepKey::new(inner.id(), Key::Prop("x".into()));
        assert_eq!(Runtime::subscriber_count(&nested), 1);
        Runtime::clear_dependencies(subscriber);
    }
}
