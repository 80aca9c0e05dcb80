//! Reactive lists and sets.
//!
//! Lists track element reads by index and their length separately, so an
//! effect reading `list.get(0)` is not re-run by a push. Sets track
//! membership as a whole: any add, delete or clear notifies every reader.

use indexmap::IndexSet;
use serde_json::Value as Json;

use super::proxy::{Container, PropertyAccess, Proxy};
use super::runtime::Key;
use super::traverse::Seen;
use super::value::{ReactiveValue, Value};
use crate::error::{ReactiveError, Result};

pub type ListData = Vec<Value>;
pub type SetData = IndexSet<Value>;

/// A reactive, index-addressed list.
pub type ReactiveList = Proxy<ListData>;

/// A reactive set of values with insertion order.
pub type ReactiveSet = Proxy<SetData>;

impl Container for ListData {
    fn traverse(proxy: &Proxy<Self>, seen: &mut Seen) {
        for value in proxy.to_vec() {
            value.traverse(seen);
        }
    }
}

impl Container for SetData {
    fn traverse(proxy: &Proxy<Self>, seen: &mut Seen) {
        for value in proxy.values() {
            value.traverse(seen);
        }
    }
}

/// How far past the end a single `set` may grow a list.
pub const MAX_LIST_GAP: usize = 1 << 16;

/// Keys touched by a structural change starting at `from`.
fn shifted_keys(from: usize, until: usize) -> impl Iterator<Item = Key> {
    (from..until).map(Key::Index).chain([Key::Length])
}

impl Proxy<ListData> {
    /// Create an empty raw list.
    pub fn new() -> Self {
        Self::from_target(ListData::new())
    }

    /// Read the element at `index`. Out-of-range reads are `Undefined`.
    pub fn get(&self, index: usize) -> Value {
        self.track(Key::Index(index));
        let value = self.read(|data| data.get(index).cloned());
        value.map_or(Value::Undefined, |value| self.wrap(value))
    }

    /// Write the element at `index`. Writing past the end grows the list,
    /// filling the gap with `Undefined`; a gap wider than [`MAX_LIST_GAP`]
    /// is rejected with `IndexOutOfRange`.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        if !self.check_writable(index) {
            return Ok(());
        }
        let value = self.unwrap_incoming(value.into());

        let old_len = self.read(|data| data.len());
        if index >= old_len {
            if index - old_len > MAX_LIST_GAP {
                return Err(ReactiveError::IndexOutOfRange {
                    index,
                    len: old_len,
                });
            }
            self.ensure_extensible()?;
        }

        let changed = self.write(|data| {
            if index < data.len() {
                if data[index].same_value(&value) {
                    return false;
                }
                data[index] = value;
            } else {
                data.resize(index, Value::Undefined);
                data.push(value);
            }
            true
        });

        if !changed {
            return Ok(());
        }
        // The gap reads as `Undefined` before and after the write.
        if index < old_len {
            self.trigger([Key::Index(index)]);
        } else {
            self.trigger([Key::Index(index), Key::Length]);
        }
        Ok(())
    }

    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        if !self.check_writable("push") {
            return Ok(());
        }
        self.ensure_extensible()?;
        let value = self.unwrap_incoming(value.into());

        let index = self.write(|data| {
            data.push(value);
            data.len() - 1
        });
        self.trigger(shifted_keys(index, index + 1));
        Ok(())
    }

    pub fn pop(&self) -> Option<Value> {
        if !self.check_writable("pop") {
            return None;
        }
        let popped = self.write(|data| data.pop().map(|value| (data.len(), value)));
        popped.map(|(index, value)| {
            self.trigger(shifted_keys(index, index + 1));
            self.wrap(value)
        })
    }

    /// Insert at `index`, shifting later elements.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        if !self.check_writable(index) {
            return Ok(());
        }
        self.ensure_extensible()?;
        let value = self.unwrap_incoming(value.into());

        let len = self.write(|data| {
            let index = index.min(data.len());
            data.insert(index, value);
            data.len()
        });
        self.trigger(shifted_keys(index.min(len - 1), len));
        Ok(())
    }

    /// Remove the element at `index`, shifting later elements.
    pub fn remove(&self, index: usize) -> Option<Value> {
        if !self.check_writable(index) {
            return None;
        }
        let removed = self.write(|data| {
            (index < data.len()).then(|| {
                let old_len = data.len();
                (old_len, data.remove(index))
            })
        });
        removed.map(|(old_len, value)| {
            self.trigger(shifted_keys(index, old_len));
            self.wrap(value)
        })
    }

    /// Shorten the list to `len` elements.
    pub fn truncate(&self, len: usize) {
        if !self.check_writable("length") {
            return;
        }
        let old_len = self.write(|data| {
            let old_len = data.len();
            data.truncate(len);
            old_len
        });
        if old_len > len {
            self.trigger(shifted_keys(len, old_len));
        }
    }

    pub fn clear(&self) {
        self.truncate(0);
    }

    pub fn len(&self) -> usize {
        self.track(Key::Length);
        self.read(|data| data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the elements. Tracks the length and every index.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track(Key::Length);
        let values: Vec<Value> = self.read(|data| data.clone());
        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                self.track(Key::Index(index));
                self.wrap(value)
            })
            .collect()
    }

    /// Position of the first element equal to `value`.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        let needle = value.to_raw();
        self.track(Key::Length);
        let values: Vec<Value> = self.read(|data| data.clone());
        values.iter().enumerate().find_map(|(index, candidate)| {
            self.track(Key::Index(index));
            (candidate.to_raw() == needle).then_some(index)
        })
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.index_of(value).is_some()
    }

    pub(crate) fn snapshot_json(&self, seen: &mut Seen) -> Json {
        if !seen.enter(self.id()) {
            return Json::Null;
        }
        let values: Vec<Value> = self.read(|data| data.clone());
        let items = values.iter().map(|value| value.to_json_inner(seen)).collect();
        seen.leave(self.id());
        Json::Array(items)
    }
}

impl<V: Into<Value>> FromIterator<V> for Proxy<ListData> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_target(iter.into_iter().map(|value| value.into().to_raw()).collect())
    }
}

impl PropertyAccess for Proxy<ListData> {
    type Key = usize;

    fn get_key(&self, index: &usize) -> Value {
        self.get(*index)
    }

    fn set_key(&self, index: &usize, value: Value) -> Result<()> {
        self.set(*index, value)
    }

    fn has_key(&self, index: &usize) -> bool {
        self.track(Key::Index(*index));
        self.read(|data| *index < data.len())
    }

    /// Deleting an element leaves a hole: the slot becomes `Undefined` and
    /// the length is unchanged.
    fn delete_key(&self, index: &usize) -> Result<bool> {
        if !self.check_writable(index) {
            return Ok(false);
        }
        let existed = self.write(|data| match data.get_mut(*index) {
            Some(slot) => {
                *slot = Value::Undefined;
                true
            }
            None => false,
        });
        if existed {
            self.trigger([Key::Index(*index)]);
        }
        Ok(existed)
    }
}

impl Proxy<SetData> {
    /// Create an empty raw set.
    pub fn new() -> Self {
        Self::from_target(SetData::new())
    }

    /// Add a value. Returns whether it was newly inserted.
    pub fn add(&self, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        if !self.check_writable(&value) {
            return Ok(false);
        }
        let value = value.to_raw();

        if self.read(|data| data.contains(&value)) {
            return Ok(false);
        }
        self.ensure_extensible()?;

        let inserted = self.write(|data| data.insert(value));
        if inserted {
            self.trigger([Key::Iterate]);
        }
        Ok(inserted)
    }

    pub fn has(&self, value: &Value) -> bool {
        self.track(Key::Iterate);
        let value = value.to_raw();
        self.read(|data| data.contains(&value))
    }

    /// Remove a value. Returns whether it was present.
    pub fn delete(&self, value: &Value) -> Result<bool> {
        if !self.check_writable(value) {
            return Ok(false);
        }
        let value = value.to_raw();
        let removed = self.write(|data| data.shift_remove(&value));
        if removed {
            self.trigger([Key::Iterate]);
        }
        Ok(removed)
    }

    pub fn clear(&self) {
        if !self.check_writable("clear") {
            return;
        }
        let had_values = self.write(|data| {
            let had_values = !data.is_empty();
            data.clear();
            had_values
        });
        if had_values {
            self.trigger([Key::Iterate]);
        }
    }

    pub fn len(&self) -> usize {
        self.track(Key::Iterate);
        self.read(|data| data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members in insertion order.
    pub fn values(&self) -> Vec<Value> {
        self.track(Key::Iterate);
        let values: Vec<Value> = self.read(|data| data.iter().cloned().collect());
        values.into_iter().map(|value| self.wrap(value)).collect()
    }

    pub(crate) fn snapshot_json(&self, seen: &mut Seen) -> Json {
        if !seen.enter(self.id()) {
            return Json::Null;
        }
        let values: Vec<Value> = self.read(|data| data.iter().cloned().collect());
        let items = values.iter().map(|value| value.to_json_inner(seen)).collect();
        seen.leave(self.id());
        Json::Array(items)
    }
}

impl<V: Into<Value>> FromIterator<V> for Proxy<SetData> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_target(iter.into_iter().map(|value| value.into().to_raw()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::Effect;
    use crate::reactive::proxy::{reactive, readonly};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn list_index_reads_ignore_pushes() {
        let list = reactive(&ReactiveList::from_iter([1, 2])).expect("extensible");
        let runs = Arc::new(AtomicI32::new(0));

        let list_clone = list.clone();
        let runs_clone = runs.clone();
        let effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            list_clone.get(0);
        });

        list.push(3).expect("writable");
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        list.set(0, 10).expect("writable");
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        list.insert(0, 0).expect("writable");
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        effect.stop();
    }

    #[test]
    fn list_length_readers_see_structural_changes() {
        let list = reactive(&ReactiveList::new()).expect("extensible");
        let seen_len = Arc::new(AtomicI32::new(-1));

        let list_clone = list.clone();
        let seen_clone = seen_len.clone();
        let effect = Effect::new(move || {
            seen_clone.store(list_clone.len() as i32, Ordering::SeqCst);
        });
        assert_eq!(seen_len.load(Ordering::SeqCst), 0);

        list.push("a").expect("writable");
        list.push("b").expect("writable");
        assert_eq!(seen_len.load(Ordering::SeqCst), 2);

        assert_eq!(list.pop().and_then(|v| v.as_str().map(str::to_owned)), Some("b".into()));
        assert_eq!(seen_len.load(Ordering::SeqCst), 1);

        list.set(3, true).expect("writable");
        assert_eq!(seen_len.load(Ordering::SeqCst), 4);
        assert!(list.get(2).is_undefined());

        list.clear();
        assert_eq!(seen_len.load(Ordering::SeqCst), 0);
        effect.stop();
    }

    #[test]
    fn list_growth_is_bounded_and_skips_the_gap() {
        let list = reactive(&ReactiveList::new()).expect("extensible");
        let gap_runs = Arc::new(AtomicI32::new(0));

        let list_clone = list.clone();
        let runs_clone = gap_runs.clone();
        let effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            list_clone.get(1);
        });

        assert_eq!(
            list.set(usize::MAX, 1),
            Err(ReactiveError::IndexOutOfRange {
                index: usize::MAX,
                len: 0
            })
        );
        assert_eq!(list.len(), 0);

        list.set(3, 1).expect("writable");
        assert_eq!(list.len(), 4);
        assert_eq!(gap_runs.load(Ordering::SeqCst), 1);

        list.set(1, 2).expect("writable");
        assert_eq!(gap_runs.load(Ordering::SeqCst), 2);
        effect.stop();
    }

    #[test]
    fn list_delete_leaves_hole() {
        let list = ReactiveList::from_iter([1, 2, 3]);
        assert_eq!(list.delete_key(&1), Ok(true));
        assert_eq!(list.len(), 3);
        assert!(list.get(1).is_undefined());
        assert!(list.has_key(&2));
        assert!(!list.has_key(&3));
    }

    #[test]
    fn list_index_of_compares_raw_targets() {
        let item = crate::reactive::object::ReactiveObject::new();
        let list = reactive(&ReactiveList::from_iter([item.clone()])).expect("extensible");
        let view = Value::Object(reactive(&item).expect("extensible"));

        assert_eq!(list.index_of(&view), Some(0));
        assert!(!list.contains(&Value::from(1)));
    }

    #[test]
    fn set_membership_is_tracked() {
        let set = reactive(&ReactiveSet::new()).expect("extensible");
        let hits = Arc::new(AtomicI32::new(0));

        let set_clone = set.clone();
        let hits_clone = hits.clone();
        let effect = Effect::new(move || {
            if set_clone.has(&Value::from("x")) {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(set.add("x"), Ok(true));
        assert_eq!(set.add("x"), Ok(false));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert_eq!(set.delete(&Value::from("x")), Ok(true));
        set.add("x").expect("writable");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(set.len(), 1);
        effect.stop();
    }

    #[test]
    fn readonly_collections_reject_writes() {
        let raw = ReactiveSet::from_iter([1]);
        let view = readonly(&raw).expect("extensible");

        let (added, warnings) = crate::diagnostics::capture(|| view.add(2));
        assert_eq!(added, Ok(false));
        assert_eq!(warnings.len(), 1);
        assert_eq!(raw.len(), 1);

        let list = readonly(&ReactiveList::from_iter([1])).expect("extensible");
        let (popped, _) = crate::diagnostics::capture(|| list.pop());
        assert!(popped.is_none());
        assert_eq!(list.len(), 1);
    }
}
