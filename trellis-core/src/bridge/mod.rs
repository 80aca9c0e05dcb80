//! Render Bridge
//!
//! The bridge turns a render function with arbitrary reactive reads into a
//! unit the host can drive with its own re-render cycle.
//!
//! # How the Bridge Works
//!
//! 1. Each component instance owns an [`EffectScope`] and a lazy root
//!    [`Effect`] that calls the render function with the latest arguments.
//!
//! 2. On every host render pass, the bridge stores the new arguments first
//!    and then runs the root effect inside the scope. Whatever the render
//!    reads becomes the effect's dependency set; whatever effects or watches
//!    it creates belong to the scope.
//!
//! 3. When a dependency changes, the root effect's scheduler asks the host
//!    for a re-render instead of running the render function itself.
//!
//! 4. On unmount the scope is stopped, which tears down the root effect and
//!    everything the renders created.
//!
//! # Lifecycle
//!
//! The host drives each instance with two signals: a render pass
//! ([`BridgeInstance::render`]) and a commit ([`BridgeInstance::commit`]).
//!
//! ```text
//!                    render (production)          commit
//! Uninitialized ─────────────────────────▶ Rendered ──────▶ Committed
//!       │                                                      ▲
//!       │ render (development)                          commit │
//!       └─────────────────────────▶ Provisional ───────────────┘
//!
//! any state ── unmount ──▶ Discarded ── render ──▶ (as Uninitialized)
//! ```
//!
//! A development host may render an instance and then throw the pass away
//! without ever unmounting it. Until the first commit, every pass of a
//! development host is therefore provisional: it runs in a fresh scope that
//! is stopped as soon as the pass returns, its hook state is discarded, and
//! side-effecting hooks stay inert. The commit creates the real scope and
//! requests a re-render, which becomes the first tracked pass.

mod component;
mod hooks;
mod props;

pub use component::{make_reactive, ComponentInstance, ReactiveComponent};
pub use hooks::Hooks;
pub use props::ReactiveProps;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::BridgeConfig;
use crate::reactive::{Effect, EffectOptions, EffectScope};

/// The host side of a bridge.
pub trait Host: Send + Sync {
    /// Schedule a render pass of the instance.
    fn request_rerender(&self);
}

impl<F: Fn() + Send + Sync> Host for F {
    fn request_rerender(&self) {
        self()
    }
}

/// Where a bridge instance is in its host lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Never rendered, or re-entered after an unmount.
    Uninitialized,
    /// A development host rendered the instance but has not committed it.
    Provisional,
    /// Rendered with a live scope, not committed yet.
    Rendered,
    /// Mounted by the host.
    Committed,
    /// Unmounted; the scope is stopped.
    Discarded,
}

type RenderFn<A, R> = Arc<dyn Fn(&A, &Hooks) -> R + Send + Sync>;

/// A render function wrapped for use with a host. Instantiate it once per
/// component instance.
pub struct ReactiveBridge<A, R> {
    render: RenderFn<A, R>,
}

impl<A, R> Clone for ReactiveBridge<A, R> {
    fn clone(&self) -> Self {
        Self {
            render: Arc::clone(&self.render),
        }
    }
}

/// Wrap a render function taking arbitrary arguments.
pub fn make_reactive_hook<A, R, F>(render: F) -> ReactiveBridge<A, R>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(&A, &Hooks) -> R + Send + Sync + 'static,
{
    ReactiveBridge {
        render: Arc::new(render),
    }
}

impl<A, R> ReactiveBridge<A, R>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn instantiate(&self, host: Arc<dyn Host>, config: BridgeConfig) -> BridgeInstance<A, R> {
        BridgeInstance {
            render: Arc::clone(&self.render),
            host,
            config,
            args: Arc::new(Mutex::new(None)),
            hooks: Hooks::bridged(),
            updating_props: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(BridgeState {
                lifecycle: Lifecycle::Uninitialized,
                tracked: None,
            }),
        }
    }
}

/// The scope and root effect of an instance.
struct Tracked<R> {
    scope: EffectScope,
    effect: Effect<Option<R>>,
}

impl<R: Send + 'static> Tracked<R> {
    fn render(&self) -> Option<R> {
        self.scope.run(|| self.effect.run()).flatten().flatten()
    }
}

impl<R> Clone for Tracked<R> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            effect: self.effect.clone(),
        }
    }
}

struct BridgeState<R> {
    lifecycle: Lifecycle,
    tracked: Option<Tracked<R>>,
}

/// One component instance driven by a host.
pub struct BridgeInstance<A, R> {
    render: RenderFn<A, R>,
    host: Arc<dyn Host>,
    config: BridgeConfig,
    args: Arc<Mutex<Option<Arc<A>>>>,
    hooks: Hooks,
    updating_props: Arc<AtomicBool>,
    state: Mutex<BridgeState<R>>,
}

/// Suppresses the instance's own re-render requests while props are being
/// bridged.
pub(crate) struct UpdatingProps<'a> {
    flag: &'a AtomicBool,
}

impl Drop for UpdatingProps<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<A, R> BridgeInstance<A, R>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
{
    /// Create the scope and the lazy root effect.
    fn track(&self) -> Tracked<R> {
        let scope = EffectScope::detached();

        let render = Arc::clone(&self.render);
        let args = Arc::clone(&self.args);
        let hooks = self.hooks.clone();
        let host = Arc::clone(&self.host);
        let updating_props = Arc::clone(&self.updating_props);

        let options = EffectOptions::default().lazy(true).scheduler(move || {
            if updating_props.load(Ordering::Acquire) {
                tracing::trace!("re-render request suppressed while updating props");
                return;
            }
            host.request_rerender();
        });

        let effect = scope
            .run(|| {
                Effect::with_options(
                    move || {
                        let current = args.lock().clone();
                        current.map(|args| render(&*args, &hooks))
                    },
                    options,
                )
            })
            .unwrap_or_else(|| Effect::with_options(|| None, EffectOptions::default().lazy(true)));

        Tracked { scope, effect }
    }

    /// Run one host render pass with `args`.
    pub fn render(&self, args: A) -> R {
        let args = Arc::new(args);
        *self.args.lock() = Some(Arc::clone(&args));

        let lifecycle = self.lifecycle();
        let output = if self.config.mode.double_invokes() && lifecycle != Lifecycle::Committed {
            self.render_provisional()
        } else {
            let tracked = self.ensure_tracked();
            self.hooks.begin_bridged_pass(&tracked.scope, false);
            tracked.render()
        };

        // The scope was stopped from inside the render: answer untracked.
        output.unwrap_or_else(|| (self.render)(&*args, &self.hooks))
    }

    fn render_provisional(&self) -> Option<R> {
        let tracked = self.track();
        self.hooks.begin_bridged_pass(&tracked.scope, true);
        let output = tracked.render();

        tracked.scope.stop();
        self.hooks.reset();
        self.set_lifecycle(Lifecycle::Provisional);
        output
    }

    fn ensure_tracked(&self) -> Tracked<R> {
        let mut state = self.state.lock();
        if let Some(tracked) = state.tracked.as_ref().filter(|t| t.scope.is_active()) {
            return tracked.clone();
        }

        let tracked = self.track();
        state.tracked = Some(tracked.clone());
        if state.lifecycle != Lifecycle::Committed {
            state.lifecycle = Lifecycle::Rendered;
        }
        tracing::debug!(lifecycle = ?state.lifecycle, "bridge instance initialized");
        tracked
    }

    /// The host mounted the output of the latest render pass.
    ///
    /// An instance without a live scope (every pass so far was provisional)
    /// is initialized now and asks the host for a tracked re-render.
    pub fn commit(&self) {
        let needs_rerender = {
            let mut state = self.state.lock();
            if state.lifecycle == Lifecycle::Committed {
                return;
            }

            let live = state.tracked.as_ref().is_some_and(|t| t.scope.is_active());
            if !live {
                state.tracked = Some(self.track());
            }
            state.lifecycle = Lifecycle::Committed;
            tracing::debug!(rerender = !live, "bridge instance committed");
            !live
        };

        if needs_rerender {
            self.host.request_rerender();
        }
    }

    /// The host unmounted the instance: stop its scope and drop hook state.
    pub fn unmount(&self) {
        let tracked = {
            let mut state = self.state.lock();
            state.lifecycle = Lifecycle::Discarded;
            state.tracked.take()
        };

        if let Some(tracked) = tracked {
            tracked.scope.stop();
        }
        self.hooks.reset();
        tracing::debug!("bridge instance discarded");
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lock().lifecycle
    }

    /// The hook store passed to the render function.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn config(&self) -> BridgeConfig {
        self.config
    }

    /// Number of dependencies of the latest tracked render.
    pub fn dependency_count(&self) -> usize {
        self.state
            .lock()
            .tracked
            .as_ref()
            .map_or(0, |tracked| tracked.effect.dependency_count())
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
        let mut state = self.state.lock();
        if state.lifecycle != lifecycle {
            tracing::debug!(from = ?state.lifecycle, to = ?lifecycle, "bridge lifecycle changed");
            state.lifecycle = lifecycle;
        }
    }

    pub(crate) fn updating_props(&self) -> UpdatingProps<'_> {
        self.updating_props.store(true, Ordering::Release);
        UpdatingProps {
            flag: &self.updating_props,
        }
    }
}

impl<A, R> Drop for BridgeInstance<A, R> {
    fn drop(&mut self) {
        if let Some(tracked) = self.state.get_mut().tracked.take() {
            tracked.scope.stop();
        }
    }
}

impl<A, R> std::fmt::Debug for BridgeInstance<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeInstance")
            .field("lifecycle", &self.state.lock().lifecycle)
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish()
    }
}
