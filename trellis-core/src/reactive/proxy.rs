//! Proxy Objects
//!
//! A proxy is a view onto a shared container (the target). Reads through a
//! tracking view register `(target, key)` edges with the runtime, and writes
//! trigger the subscribers of the keys they change.
//!
//! Instead of intercepting arbitrary field access, every container type has
//! a dedicated wrapper ([`ReactiveObject`](super::object::ReactiveObject),
//! [`ReactiveList`](super::collections::ReactiveList),
//! [`ReactiveSet`](super::collections::ReactiveSet)) that exposes explicit
//! get/set/has/delete operations. They all share the [`Proxy`] machinery
//! defined here.
//!
//! # Views
//!
//! Several proxies can share one target. The [`ProxyKind`] of a proxy
//! decides how it behaves:
//!
//! | kind              | tracks reads | writable | nested containers |
//! |-------------------|--------------|----------|-------------------|
//! | `Raw`             | no           | yes      | as stored         |
//! | `Reactive`        | yes          | yes      | reactive views    |
//! | `ShallowReactive` | yes          | yes      | as stored         |
//! | `Readonly`        | yes          | no       | readonly views    |
//! | `ShallowReadonly` | yes          | no       | as stored         |
//!
//! Writing through a readonly view emits a
//! [`ReadonlyMutation`](crate::diagnostics::Diagnostic::ReadonlyMutation)
//! warning and leaves the target untouched.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::{DepKey, Key, Runtime, TargetId};
use super::traverse::Seen;
use super::value::{ReactiveValue, Value};
use crate::diagnostics::{self, Diagnostic};
use crate::error::{ReactiveError, Result};

/// How a proxy exposes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    /// Direct access, no tracking.
    Raw,
    /// Deep, mutable, tracked.
    Reactive,
    /// Tracked at the root level only.
    ShallowReactive,
    /// Deep, tracked, rejects writes.
    Readonly,
    /// Root-level readonly view.
    ShallowReadonly,
}

impl ProxyKind {
    pub fn tracks(self) -> bool {
        !matches!(self, Self::Raw)
    }

    pub fn is_readonly(self) -> bool {
        matches!(self, Self::Readonly | Self::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, Self::ShallowReactive | Self::ShallowReadonly)
    }

    pub fn is_deep(self) -> bool {
        matches!(self, Self::Reactive | Self::Readonly)
    }
}

/// A container that can sit behind a proxy.
pub trait Container: Default + Send + Sync + 'static {
    /// Read every key of the container through `proxy`, descending into
    /// nested values.
    fn traverse(proxy: &Proxy<Self>, seen: &mut Seen);
}

pub(crate) struct Target<S> {
    id: TargetId,
    data: RwLock<S>,
    extensible: AtomicBool,
    skip: AtomicBool,
}

/// A view of kind [`ProxyKind`] onto a shared container.
pub struct Proxy<S> {
    target: Arc<Target<S>>,
    kind: ProxyKind,
}

impl<S> Clone for Proxy<S> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
            kind: self.kind,
        }
    }
}

impl<S: Container> Default for Proxy<S> {
    fn default() -> Self {
        Self::from_target(S::default())
    }
}

impl<S: Container> Proxy<S> {
    /// Wrap `data` in a new target and return its raw view.
    pub fn from_target(data: S) -> Self {
        Self {
            target: Arc::new(Target {
                id: TargetId::new(),
                data: RwLock::new(data),
                extensible: AtomicBool::new(true),
                skip: AtomicBool::new(false),
            }),
            kind: ProxyKind::Raw,
        }
    }

    /// Identity of the shared target. Equal for every view of it.
    pub fn id(&self) -> TargetId {
        self.target.id
    }

    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    pub fn is_reactive(&self) -> bool {
        matches!(self.kind, ProxyKind::Reactive | ProxyKind::ShallowReactive)
    }

    pub fn is_readonly(&self) -> bool {
        self.kind.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.kind.is_shallow()
    }

    /// Whether reads through this view are tracked.
    pub fn is_proxy(&self) -> bool {
        self.kind.tracks()
    }

    /// The untracked view of the same target.
    pub fn to_raw(&self) -> Self {
        self.view(ProxyKind::Raw)
    }

    /// Exclude the target from reactivity: it is never wrapped in a view and
    /// deep traversal does not enter it.
    pub fn mark_raw(self) -> Self {
        self.target.skip.store(true, Ordering::Release);
        self
    }

    pub fn is_marked_raw(&self) -> bool {
        self.target.skip.load(Ordering::Acquire)
    }

    /// Forbid adding new keys to the target. Existing keys stay writable.
    pub fn prevent_extensions(&self) {
        self.target.extensible.store(false, Ordering::Release);
    }

    pub fn is_extensible(&self) -> bool {
        self.target.extensible.load(Ordering::Acquire)
    }

    pub(crate) fn view(&self, kind: ProxyKind) -> Self {
        Self {
            target: Arc::clone(&self.target),
            kind,
        }
    }

    /// Whether the target may be wrapped in a tracking view.
    fn observable(&self) -> bool {
        !self.is_marked_raw() && self.is_extensible()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.target.data.read())
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.target.data.write())
    }

    pub(crate) fn track(&self, key: Key) {
        if self.kind.tracks() {
            Runtime::track(self.target.id, key);
        }
    }

    pub(crate) fn trigger(&self, keys: impl IntoIterator<Item = Key>) {
        let target = self.target.id;
        Runtime::trigger_keys(keys.into_iter().map(|key| DepKey::new(target, key)));
    }

    /// Reject writes through readonly views.
    pub(crate) fn check_writable(&self, key: impl fmt::Display) -> bool {
        if self.kind.is_readonly() {
            diagnostics::emit(Diagnostic::ReadonlyMutation {
                key: key.to_string(),
            });
            return false;
        }
        true
    }

    pub(crate) fn ensure_extensible(&self) -> Result<()> {
        if self.is_extensible() {
            Ok(())
        } else {
            Err(ReactiveError::NonExtensibleTarget {
                id: self.target.id.raw(),
            })
        }
    }

    /// Present a stored value through this view: deep views wrap nested
    /// containers in the same kind of view.
    pub(crate) fn wrap(&self, value: Value) -> Value {
        if self.kind.is_deep() {
            value.into_view(self.kind)
        } else {
            value
        }
    }

    /// Prepare an incoming value for storage. Deep views store raw targets so
    /// that the container never holds a view of another container.
    pub(crate) fn unwrap_incoming(&self, value: Value) -> Value {
        if self.kind.is_shallow() {
            value
        } else {
            value.to_raw()
        }
    }

    /// This target seen through `kind`, unless it opted out of reactivity.
    pub(crate) fn child_view(&self, kind: ProxyKind) -> Self {
        if self.observable() {
            self.view(kind)
        } else {
            self.clone()
        }
    }

    fn checked_view(&self, kind: ProxyKind) -> Result<Self> {
        self.ensure_extensible()?;
        if self.is_marked_raw() {
            return Ok(self.clone());
        }
        Ok(self.view(kind))
    }
}

impl Value {
    /// The same value with container targets seen through `kind`.
    pub(crate) fn into_view(self, kind: ProxyKind) -> Value {
        match self {
            Value::Object(obj) => Value::Object(obj.child_view(kind)),
            Value::List(list) => Value::List(list.child_view(kind)),
            Value::Set(set) => Value::Set(set.child_view(kind)),
            other => other,
        }
    }
}

/// Deep, mutable, tracked view of `target`.
pub fn reactive<S: Container>(target: &Proxy<S>) -> Result<Proxy<S>> {
    target.checked_view(ProxyKind::Reactive)
}

/// Root-level tracked view: nested containers are returned as stored.
pub fn shallow_reactive<S: Container>(target: &Proxy<S>) -> Result<Proxy<S>> {
    target.checked_view(ProxyKind::ShallowReactive)
}

/// Deep readonly view. Reads are tracked, writes are rejected.
pub fn readonly<S: Container>(target: &Proxy<S>) -> Result<Proxy<S>> {
    target.checked_view(ProxyKind::Readonly)
}

/// Root-level readonly view.
pub fn shallow_readonly<S: Container>(target: &Proxy<S>) -> Result<Proxy<S>> {
    target.checked_view(ProxyKind::ShallowReadonly)
}

/// The raw view of `proxy`.
pub fn to_raw<S: Container>(proxy: &Proxy<S>) -> Proxy<S> {
    proxy.to_raw()
}

/// Exclude `target` from reactivity and return it.
pub fn mark_raw<S: Container>(target: Proxy<S>) -> Proxy<S> {
    target.mark_raw()
}

impl<S: Container> ReactiveValue for Proxy<S> {
    fn same_value(&self, other: &Self) -> bool {
        self == other
    }

    fn traverse(&self, seen: &mut Seen) {
        if self.is_marked_raw() || !seen.enter(self.id()) {
            return;
        }
        S::traverse(self, seen);
    }

    fn to_reactive(self) -> Self {
        if self.kind == ProxyKind::Raw {
            self.child_view(ProxyKind::Reactive)
        } else {
            self
        }
    }
}

/// Two proxies are equal when they are the same view of the same target.
impl<S> PartialEq for Proxy<S> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.target, &other.target) && self.kind == other.kind
    }
}

impl<S> Eq for Proxy<S> {}

impl<S> Hash for Proxy<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.id.hash(state);
        self.kind.hash(state);
    }
}

impl<S> fmt::Debug for Proxy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("target", &self.target.id.raw())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Explicit property access on a reactive container.
///
/// Every call on a tracking view goes through the dependency tracker: `get_key`
/// and `has_key` record a read of the key, `set_key` and `delete_key`
/// notify readers of the keys they change.
pub trait PropertyAccess {
    type Key: ?Sized;

    /// Read a property. Missing properties read as `Value::Undefined`.
    fn get_key(&self, key: &Self::Key) -> Value;

    /// Write a property. Adding a new key to a non-extensible target fails
    /// with [`ReactiveError::NonExtensibleTarget`].
    fn set_key(&self, key: &Self::Key, value: Value) -> Result<()>;

    fn has_key(&self, key: &Self::Key) -> bool;

    /// Remove a property. Returns whether it existed.
    fn delete_key(&self, key: &Self::Key) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::object::ReactiveObject;

    #[test]
    fn views_share_identity() {
        let raw = ReactiveObject::new();
        let view = reactive(&raw).expect("extensible");

        assert_eq!(view.id(), raw.id());
        assert_ne!(view, raw);
        assert_eq!(view.to_raw(), raw);
        assert!(view.is_reactive());
        assert!(!raw.is_proxy());
    }

    #[test]
    fn non_extensible_targets_are_rejected() {
        let raw = ReactiveObject::new();
        raw.prevent_extensions();

        assert_eq!(
            reactive(&raw),
            Err(ReactiveError::NonExtensibleTarget { id: raw.id().raw() })
        );
        assert!(readonly(&raw).is_err());
        assert!(shallow_reactive(&raw).is_err());
        assert!(shallow_readonly(&raw).is_err());
    }

    #[test]
    fn marked_raw_targets_are_not_wrapped() {
        let raw = mark_raw(ReactiveObject::new());
        let view = reactive(&raw).expect("extensible");

        assert_eq!(view.kind(), ProxyKind::Raw);
        assert!(raw.is_marked_raw());
    }

    #[test]
    fn kinds_describe_their_behavior() {
        assert!(ProxyKind::Readonly.is_readonly());
        assert!(ProxyKind::ShallowReadonly.is_shallow());
        assert!(ProxyKind::Reactive.is_deep());
        assert!(!ProxyKind::Raw.tracks());
    }
}
