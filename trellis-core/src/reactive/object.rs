//! Reactive objects: string-keyed property maps behind a [`Proxy`].
//!
//! Properties keep their insertion order. Reading a property tracks
//! `(object, key)`; listing keys tracks the object's key set, which is
//! triggered whenever a key is added or deleted.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use super::proxy::{Container, PropertyAccess, Proxy};
use super::runtime::Key;
use super::traverse::Seen;
use super::value::{ReactiveValue, Value};
use crate::error::Result;

/// Property storage of a reactive object.
pub type ObjectData = IndexMap<Arc<str>, Value>;

/// A string-keyed reactive object.
pub type ReactiveObject = Proxy<ObjectData>;

enum Change {
    Added,
    Updated,
    Unchanged,
}

impl Container for ObjectData {
    fn traverse(proxy: &Proxy<Self>, seen: &mut Seen) {
        for key in proxy.keys() {
            proxy.get(&key).traverse(seen);
        }
    }
}

impl Proxy<ObjectData> {
    /// Create an empty raw object.
    pub fn new() -> Self {
        Self::from_target(ObjectData::new())
    }

    /// Read a property.
    pub fn get(&self, key: &str) -> Value {
        self.track(Key::Prop(Arc::from(key)));
        let value = self.read(|data| data.get(key).cloned());
        value.map_or(Value::Undefined, |value| self.wrap(value))
    }

    /// Write a property, notifying readers only when the value changed.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        if !self.check_writable(key) {
            return Ok(());
        }
        let value = self.unwrap_incoming(value.into());

        let change = self.write(|data| match data.get_mut(key) {
            Some(slot) if slot.same_value(&value) => Ok(Change::Unchanged),
            Some(slot) => {
                *slot = value;
                Ok(Change::Updated)
            }
            None => {
                self.ensure_extensible()?;
                data.insert(Arc::from(key), value);
                Ok(Change::Added)
            }
        })?;

        let prop = Key::Prop(Arc::from(key));
        match change {
            Change::Added => self.trigger([prop, Key::Iterate]),
            Change::Updated => self.trigger([prop]),
            Change::Unchanged => {}
        }
        Ok(())
    }

    pub fn has(&self, key: &str) -> bool {
        self.track(Key::Prop(Arc::from(key)));
        self.read(|data| data.contains_key(key))
    }

    /// Remove a property. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        if !self.check_writable(key) {
            return Ok(false);
        }

        let existed = self.write(|data| data.shift_remove(key).is_some());
        if existed {
            self.trigger([Key::Prop(Arc::from(key)), Key::Iterate]);
        }
        Ok(existed)
    }

    /// Property names in insertion order.
    pub fn keys(&self) -> Vec<Arc<str>> {
        self.track(Key::Iterate);
        self.read(|data| data.keys().cloned().collect())
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Key/value pairs in insertion order. Every key is tracked.
    pub fn entries(&self) -> Vec<(Arc<str>, Value)> {
        self.track(Key::Iterate);
        let entries: Vec<(Arc<str>, Value)> = self.read(|data| {
            data.iter()
                .map(|(key, value)| (Arc::clone(key), value.clone()))
                .collect()
        });

        entries
            .into_iter()
            .map(|(key, value)| {
                self.track(Key::Prop(Arc::clone(&key)));
                let value = self.wrap(value);
                (key, value)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.track(Key::Iterate);
        self.read(|data| data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn snapshot_json(&self, seen: &mut Seen) -> Json {
        if !seen.enter(self.id()) {
            return Json::Null;
        }
        let entries: Vec<(Arc<str>, Value)> = self.read(|data| {
            data.iter()
                .map(|(key, value)| (Arc::clone(key), value.clone()))
                .collect()
        });

        let map: Map<String, Json> = entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_json_inner(seen)))
            .collect();
        seen.leave(self.id());
        Json::Object(map)
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> FromIterator<(K, V)> for Proxy<ObjectData> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_target(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into().to_raw()))
                .collect(),
        )
    }
}

impl PropertyAccess for Proxy<ObjectData> {
    type Key = str;

    fn get_key(&self, key: &str) -> Value {
        self.get(key)
    }

    fn set_key(&self, key: &str, value: Value) -> Result<()> {
        self.set(key, value)
    }

    fn has_key(&self, key: &str) -> bool {
        self.has(key)
    }

    fn delete_key(&self, key: &str) -> Result<bool> {
        self.delete(key)
    }
}
