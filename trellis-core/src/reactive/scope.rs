//! Effect Scopes
//!
//! A scope is an ownership group: every effect (and watch) created while a
//! scope is running is recorded in it, and stopping the scope stops them all
//! together, then its child scopes, then the callbacks registered with
//! [`on_scope_dispose`].
//!
//! The render bridge gives every component instance its own detached scope,
//! which is what ties a component's reactive state to the component's
//! lifetime.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::effect::Cleanup;
use crate::diagnostics::{self, Diagnostic};

/// Something a scope can stop.
pub trait Stoppable: Send + Sync {
    fn stop(&self);
}

struct ScopeInner {
    active: AtomicBool,
    effects: Mutex<Vec<Arc<dyn Stoppable>>>,
    children: Mutex<Vec<EffectScope>>,
    cleanups: Mutex<Vec<Cleanup>>,
    parent: Option<Weak<ScopeInner>>,
}

thread_local! {
    static SCOPE_STACK: RefCell<Vec<EffectScope>> = const { RefCell::new(Vec::new()) };
}

/// Pops the scope stack on drop.
struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// A group of effects that are stopped together.
#[derive(Clone)]
pub struct EffectScope {
    inner: Arc<ScopeInner>,
}

impl EffectScope {
    /// Create a scope owned by the currently running scope, if any. It is
    /// stopped together with its parent.
    pub fn new() -> Self {
        let parent = Self::current();
        let scope = Self::build(parent.as_ref().map(|p| Arc::downgrade(&p.inner)));
        if let Some(parent) = parent {
            parent.inner.children.lock().push(scope.clone());
        }
        scope
    }

    /// Create a scope with no parent. Only an explicit `stop` ends it.
    pub fn detached() -> Self {
        Self::build(None)
    }

    fn build(parent: Option<Weak<ScopeInner>>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                active: AtomicBool::new(true),
                effects: Mutex::new(Vec::new()),
                children: Mutex::new(Vec::new()),
                cleanups: Mutex::new(Vec::new()),
                parent,
            }),
        }
    }

    /// The innermost scope that is currently running on this thread.
    pub fn current() -> Option<EffectScope> {
        SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Run `f` with this scope as the current one, so that effects created
    /// by `f` are recorded here.
    ///
    /// Returns `None` without calling `f` if the scope was stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            tracing::warn!("cannot run an inactive effect scope");
            return None;
        }

        SCOPE_STACK.with(|stack| stack.borrow_mut().push(self.clone()));
        let _guard = ScopeGuard;
        Some(f())
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Number of effects recorded in this scope.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.lock().len()
    }

    /// Stop every recorded effect, then child scopes, then dispose callbacks.
    pub fn stop(&self) {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }

        let effects = std::mem::take(&mut *self.inner.effects.lock());
        let effect_count = effects.len();
        for effect in effects {
            effect.stop();
        }

        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in children {
            child.stop();
        }

        let cleanups = std::mem::take(&mut *self.inner.cleanups.lock());
        for cleanup in cleanups {
            cleanup();
        }

        if let Some(parent) = self.inner.parent.as_ref().and_then(Weak::upgrade) {
            parent
                .children
                .lock()
                .retain(|child| !Arc::ptr_eq(&child.inner, &self.inner));
        }

        tracing::debug!(effects = effect_count, "effect scope stopped");
    }

    /// Record a stoppable in the current scope. Without a running scope the
    /// stoppable is owned by its caller alone.
    pub(crate) fn record(effect: Arc<dyn Stoppable>) {
        if let Some(scope) = Self::current() {
            if scope.is_active() {
                scope.inner.effects.lock().push(effect);
            }
        }
    }

    fn add_cleanup(&self, cleanup: Cleanup) {
        self.inner.cleanups.lock().push(cleanup);
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("effects", &self.effect_count())
            .finish()
    }
}

/// Register `f` to run when the current scope stops.
///
/// Returns `false` and emits [`Diagnostic::NoActiveScope`] when no scope is
/// running; `f` is dropped in that case.
pub fn on_scope_dispose(f: impl FnOnce() + Send + 'static) -> bool {
    match EffectScope::current() {
        Some(scope) => {
            scope.add_cleanup(Box::new(f));
            true
        }
        None => {
            diagnostics::emit(Diagnostic::NoActiveScope);
            false
        }
    }
}
