//! Advisory Diagnostics
//!
//! Non-fatal warnings about questionable use of the reactive API. They never
//! change control flow: the operation that emitted the warning still falls
//! back to a well-defined behavior.
//!
//! Every diagnostic is logged through `tracing` at `warn` level under the
//! `trellis::diagnostics` target. Hosts and tests that want to inspect them
//! programmatically can wrap a block in [`capture`].

use std::cell::RefCell;
use std::fmt;

/// A single advisory warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A watch was given something that cannot be tracked. The watch falls
    /// back to a constant getter that never fires.
    InvalidWatchSource {
        /// Debug rendering of the rejected source.
        source: String,
    },

    /// An option was passed to an API that ignores it.
    UnsupportedOption {
        /// The option name, e.g. `lazy`.
        option: &'static str,
        /// The API that rejected it.
        api: &'static str,
    },

    /// A cleanup-registering hook ran without an enclosing bridge scope.
    /// Cleanup is tied to the host's plain unmount signal instead.
    OutsideBridgeScope {
        /// The hook that was called.
        hook: &'static str,
    },

    /// `on_scope_dispose` was called with no active effect scope.
    NoActiveScope,

    /// A cleanup was registered with no running effect. It is dropped
    /// without running.
    NoActiveEffect {
        /// The API that was called.
        api: &'static str,
    },

    /// A mutation was attempted through a readonly proxy.
    ReadonlyMutation {
        /// The property (or index) that was targeted.
        key: String,
    },

    /// An async task was executed outside of a tokio runtime.
    NoAsyncRuntime,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWatchSource { source } => write!(
                f,
                "invalid watch source {source}: a watch source must be a getter, a cell, \
                 a computed value, a reactive proxy, or a tuple/vec of these"
            ),
            Self::UnsupportedOption { option, api } => write!(
                f,
                "`{option}` is not supported by {api}: the effect must run once to collect \
                 its dependencies, the option is ignored"
            ),
            Self::OutsideBridgeScope { hook } => write!(
                f,
                "{hook} was called outside a reactive bridge; cleanup falls back to the host \
                 unmount signal and is not safe under double-invoked renders"
            ),
            Self::NoActiveScope => {
                write!(f, "on_scope_dispose called without an active effect scope")
            }
            Self::NoActiveEffect { api } => {
                write!(f, "{api} called without a running effect, ignored")
            }
            Self::ReadonlyMutation { key } => {
                write!(f, "set operation on key `{key}` failed: target is readonly")
            }
            Self::NoAsyncRuntime => {
                write!(f, "async task executed outside of a tokio runtime, ignored")
            }
        }
    }
}

thread_local! {
    static CAPTURED: RefCell<Option<Vec<Diagnostic>>> = const { RefCell::new(None) };
}

/// Emit a diagnostic.
pub fn emit(diagnostic: Diagnostic) {
    tracing::warn!(target: "trellis::diagnostics", "{diagnostic}");

    CAPTURED.with(|captured| {
        if let Some(buffer) = captured.borrow_mut().as_mut() {
            buffer.push(diagnostic);
        }
    });
}

/// Run `f` and return every diagnostic emitted on this thread while it ran.
///
/// Captures nest: an inner capture takes the diagnostics of its own block and
/// the outer capture resumes afterwards.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<Diagnostic>) {
    struct Restore(Option<Vec<Diagnostic>>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            CAPTURED.with(|captured| *captured.borrow_mut() = previous);
        }
    }

    let previous = CAPTURED.with(|captured| captured.borrow_mut().replace(Vec::new()));
    let _restore = Restore(previous);

    let result = f();
    let collected = CAPTURED.with(|captured| captured.borrow_mut().take().unwrap_or_default());
    (result, collected)
}
