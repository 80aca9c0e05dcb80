//! Props bridging.
//!
//! The host hands a component a fresh props map on every render. To make the
//! props observable, the bridge keeps one shallow reactive object per
//! instance and assigns each new map into it with a diff: changed keys are
//! set, missing keys are deleted, equal values are left alone. Renders read
//! the props through a shallow readonly view of the same object.

use std::sync::Arc;

use crate::error::Result;
use crate::reactive::{
    shallow_reactive, shallow_readonly, untracked, Props, ReactiveObject, Runtime,
};

/// A props map made observable.
#[derive(Clone, Debug)]
pub struct ReactiveProps {
    target: ReactiveObject,
    view: ReactiveObject,
}

impl ReactiveProps {
    pub fn new(props: &Props) -> Result<Self> {
        let raw = ReactiveObject::new();
        let target = shallow_reactive(&raw)?;
        let view = shallow_readonly(&raw)?;

        let bridged = Self { target, view };
        untracked(|| bridged.assign(props))?;
        Ok(bridged)
    }

    /// Assign `props` into the bridged object in one batch.
    pub fn assign(&self, props: &Props) -> Result<()> {
        Runtime::batch(|| assign_diff(&self.target, props))
    }

    /// The readonly view handed to renders.
    pub fn view(&self) -> &ReactiveObject {
        &self.view
    }
}

/// Make `target` hold exactly the entries of `source`, touching only what
/// differs.
pub(crate) fn assign_diff(target: &ReactiveObject, source: &Props) -> Result<()> {
    for (key, value) in source {
        target.set(key, value.clone())?;
    }

    let stale: Vec<Arc<str>> = untracked(|| target.keys())
        .into_iter()
        .filter(|key| !source.contains_key(key.as_ref()))
        .collect();
    for key in stale {
        target.delete(&key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Value};
    use std::sync::atomic::{AtomicI32, Ordering};

    fn props(entries: &[(&str, Value)]) -> Props {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn assign_touches_only_changed_keys() {
        let bridged = ReactiveProps::new(&props(&[
            ("title", Value::from("a")),
            ("count", Value::from(1)),
        ]))
        .expect("extensible");

        let runs = Arc::new(AtomicI32::new(0));
        let (view, runs_clone) = (bridged.view().clone(), runs.clone());
        let effect = Effect::new(move || {
            view.get("title");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        bridged
            .assign(&props(&[("title", Value::from("a")), ("count", Value::from(2))]))
            .expect("writable");
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        bridged
            .assign(&props(&[("title", Value::from("b"))]))
            .expect("writable");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!bridged.view().has("count"));
        effect.stop();
    }

    #[test]
    fn reactive_props_are_passed_through() {
        let inner = crate::reactive::reactive(&ReactiveObject::new()).expect("extensible");
        let bridged = ReactiveProps::new(&props(&[("state", Value::from(inner.clone()))]))
            .expect("extensible");

        let seen = bridged.view().get("state");
        assert_eq!(seen.as_object(), Some(&inner));
    }

    #[test]
    fn view_is_readonly() {
        let bridged = ReactiveProps::new(&props(&[("n", Value::from(1))])).expect("extensible");
        let ((), warnings) = crate::diagnostics::capture(|| {
            bridged.view().set("n", 2).expect("readonly writes are not errors");
        });

        assert_eq!(warnings.len(), 1);
        assert_eq!(bridged.view().get("n"), Value::from(1));
    }
}
