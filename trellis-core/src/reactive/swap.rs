//! Swappable references.
//!
//! A [`SwapRef`] is one level of indirection over a [`ReactiveObject`]. Code
//! that needs to follow an object which may be replaced wholesale (a
//! reloaded resource, a reconnected client) holds the `SwapRef` and goes
//! through it on every access, instead of holding the object itself.
//!
//! Reads through the ref track both the handle and the property, so a reader
//! re-runs when the property changes on the current object and when the
//! object is replaced.

use super::cell::Cell;
use super::object::ReactiveObject;
use super::proxy::PropertyAccess;
use super::value::Value;
use crate::error::{ReactiveError, Result};

/// A cell holding a replaceable object handle.
#[derive(Clone, Debug)]
pub struct SwapRef {
    handle: Cell<ReactiveObject>,
}

fn check_extensible(obj: &ReactiveObject) -> Result<()> {
    if obj.is_extensible() {
        Ok(())
    } else {
        Err(ReactiveError::NonExtensibleTarget { id: obj.id().raw() })
    }
}

impl SwapRef {
    pub fn new(obj: ReactiveObject) -> Result<Self> {
        check_extensible(&obj)?;
        Ok(Self {
            handle: Cell::shallow(obj),
        })
    }

    /// The object currently behind the ref (tracked).
    pub fn current(&self) -> ReactiveObject {
        self.handle.get()
    }

    /// Swap in a new object and return the previous one. Readers of the ref
    /// are notified if the handle changed.
    pub fn replace(&self, obj: ReactiveObject) -> Result<ReactiveObject> {
        check_extensible(&obj)?;
        let previous = self.handle.get_untracked();
        self.handle.set(obj);
        tracing::trace!(from = previous.id().raw(), "swap ref replaced");
        Ok(previous)
    }
}

impl PropertyAccess for SwapRef {
    type Key = str;

    fn get_key(&self, key: &str) -> Value {
        self.current().get(key)
    }

    fn set_key(&self, key: &str, value: Value) -> Result<()> {
        self.current().set(key, value)
    }

    fn has_key(&self, key: &str) -> bool {
        self.current().has(key)
    }

    fn delete_key(&self, key: &str) -> Result<bool> {
        self.current().delete(key)
    }
}
