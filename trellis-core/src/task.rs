//! Async Tasks
//!
//! An [`AsyncTask`] runs an async function and publishes its progress
//! through three cells (`loading`, `error` and `result`), so that effects and
//! renders can react to it like to any other state.
//!
//! # Overlap
//!
//! Calls may overlap: a second `execute` can start before the first one
//! resolved. Every call gets a task id from a monotonically increasing
//! counter, and only the call holding the latest id may commit.
//!
//! - [`Overlap::Last`] (default): every call starts; the responses of calls
//!   that were superseded are dropped when they arrive.
//! - [`Overlap::First`]: a call made while a previous one is loading is
//!   ignored, so the first call is the one that commits.
//!
//! A stale response is never an error. A failed call stores its error in
//! the `error` cell and clears `result`; nothing is returned to the caller.
//!
//! # Runtime
//!
//! Tasks are spawned on the ambient tokio runtime. Executing outside of one
//! emits [`Diagnostic::NoAsyncRuntime`] and does nothing.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::diagnostics::{self, Diagnostic};
use crate::reactive::{
    untracked, watch, Cell, ReactiveValue, Runtime, WatchHandle, WatchOptions, WatchSource,
};

/// Which of several overlapping calls is allowed to commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overlap {
    /// Ignore calls made while a previous call is still loading.
    First,
    /// Let every call start; only the latest one commits.
    #[default]
    Last,
}

/// Options for [`AsyncTask::new`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncOptions {
    pub overlap: Overlap,
}

impl AsyncOptions {
    pub fn overlap(mut self, overlap: Overlap) -> Self {
        self.overlap = overlap;
        self
    }
}

/// Options for [`async_watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncWatchOptions {
    /// Execute once at creation. Defaults to `true`.
    pub immediate: bool,
    pub deep: bool,
    pub overlap: Overlap,
    /// Only meaningful to the hook variant, which warns and ignores it.
    pub lazy: bool,
}

impl Default for AsyncWatchOptions {
    fn default() -> Self {
        Self {
            immediate: true,
            deep: false,
            overlap: Overlap::default(),
            lazy: false,
        }
    }
}

impl AsyncWatchOptions {
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn overlap(mut self, overlap: Overlap) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }
}

type TaskFuture<R, E> = Pin<Box<dyn Future<Output = Result<R, E>> + Send>>;
type TaskFn<A, R, E> = Box<dyn Fn(A) -> TaskFuture<R, E> + Send + Sync>;

struct TaskInner<A, R, E> {
    func: TaskFn<A, R, E>,
    overlap: Overlap,
    latest: AtomicU64,
    loading: Cell<bool>,
    error: Cell<Option<E>>,
    result: Cell<Option<R>>,
}

impl<A, R: ReactiveValue, E: ReactiveValue> TaskInner<A, R, E> {
    fn commit(&self, id: u64, outcome: Result<R, E>) {
        if self.latest.load(Ordering::Acquire) != id {
            tracing::trace!(id, "stale async task response dropped");
            return;
        }

        Runtime::batch(|| {
            match outcome {
                Ok(result) => {
                    self.result.set(Some(result));
                    self.error.set(None);
                }
                Err(error) => {
                    self.result.set(None);
                    self.error.set(Some(error));
                }
            }
            self.loading.set(false);
        });
    }
}

/// An async function with reactive `loading`, `error` and `result` state.
pub struct AsyncTask<A, R, E> {
    inner: Arc<TaskInner<A, R, E>>,
}

impl<A, R, E> AsyncTask<A, R, E>
where
    A: Send + 'static,
    R: ReactiveValue,
    E: ReactiveValue,
{
    pub fn new<F, Fut>(func: F, options: AsyncOptions) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self {
            inner: Arc::new(TaskInner {
                func: Box::new(move |args| Box::pin(func(args))),
                overlap: options.overlap,
                latest: AtomicU64::new(0),
                loading: Cell::new(false),
                error: Cell::new(None),
                result: Cell::new(None),
            }),
        }
    }

    /// Start a call with `args`.
    ///
    /// Returns the handle of the spawned task, or `None` if the call was
    /// ignored (overlap `First` while loading, or no tokio runtime).
    pub fn execute(&self, args: A) -> Option<JoinHandle<()>> {
        let inner = &self.inner;
        if inner.overlap == Overlap::First && inner.loading.get_untracked() {
            tracing::trace!("async task already loading, call ignored");
            return None;
        }

        let Ok(handle) = Handle::try_current() else {
            diagnostics::emit(Diagnostic::NoAsyncRuntime);
            return None;
        };

        let id = inner.latest.fetch_add(1, Ordering::AcqRel) + 1;
        inner.loading.set(true);
        let future = untracked(|| (inner.func)(args));

        let inner = Arc::clone(inner);
        Some(handle.spawn(async move {
            let outcome = future.await;
            inner.commit(id, outcome);
        }))
    }

    /// Whether the latest call is still running.
    pub fn loading(&self) -> &Cell<bool> {
        &self.inner.loading
    }

    /// The error of the latest call, if it failed.
    pub fn error(&self) -> &Cell<Option<E>> {
        &self.inner.error
    }

    /// The result of the latest call, if it succeeded.
    pub fn result(&self) -> &Cell<Option<R>> {
        &self.inner.result
    }

    pub fn overlap(&self) -> Overlap {
        self.inner.overlap
    }
}

impl<A, R, E> Clone for AsyncTask<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, R: ReactiveValue + std::fmt::Debug, E: ReactiveValue + std::fmt::Debug> std::fmt::Debug
    for AsyncTask<A, R, E>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTask")
            .field("overlap", &self.inner.overlap)
            .field("loading", &self.inner.loading.get_untracked())
            .field("error", &self.inner.error.get_untracked())
            .field("result", &self.inner.result.get_untracked())
            .finish()
    }
}

/// An async task executed by a watch whenever its source changes.
pub struct AsyncWatch<A, R, E> {
    task: AsyncTask<A, R, E>,
    handle: WatchHandle,
}

impl<A, R, E> AsyncWatch<A, R, E>
where
    A: Send + 'static,
    R: ReactiveValue,
    E: ReactiveValue,
{
    pub fn task(&self) -> &AsyncTask<A, R, E> {
        &self.task
    }

    pub fn loading(&self) -> &Cell<bool> {
        self.task.loading()
    }

    pub fn error(&self) -> &Cell<Option<E>> {
        self.task.error()
    }

    pub fn result(&self) -> &Cell<Option<R>> {
        self.task.result()
    }

    /// Stop re-executing on change. A call in flight still commits.
    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

/// Arguments of an async watch call: the new source value and the previous
/// one (`None` on the first call).
pub type WatchArgs<T> = (T, Option<T>);

/// Execute `func` with the value of `source` now (unless `immediate` is
/// false) and again whenever the source changes.
pub fn async_watch<S, F, Fut, R, E>(
    source: S,
    func: F,
    options: AsyncWatchOptions,
) -> AsyncWatch<WatchArgs<S::Value>, R, E>
where
    S: WatchSource,
    F: Fn(S::Value, Option<S::Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: ReactiveValue,
    E: ReactiveValue,
{
    let task = AsyncTask::new(
        move |(value, old): WatchArgs<S::Value>| func(value, old),
        AsyncOptions::default().overlap(options.overlap),
    );

    let executor = task.clone();
    let handle = watch(
        source,
        move |value: &S::Value, old: Option<&S::Value>| {
            executor.execute((value.clone(), old.cloned()));
        },
        WatchOptions::default()
            .immediate(options.immediate)
            .deep(options.deep),
    );

    AsyncWatch { task, handle }
}
