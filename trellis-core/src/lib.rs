//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis UI toolkit.
//! It implements:
//!
//! - Reactive primitives (cells, computed values, effects, watches)
//! - Reactive proxies over objects, lists and sets
//! - Async tasks with reactive loading/error/result state
//! - The render bridge that connects reactive state to a host's re-render
//!   cycle
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `task`: Async tasks and async watches
//! - `bridge`: Host lifecycle, hooks and props bridging
//! - `config`: Host configuration
//! - `error` / `diagnostics`: Hard errors and advisory warnings
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use trellis_core::reactive::{Cell, Computed, Effect};
//!
//! // Create a cell
//! let count = Cell::new(0);
//!
//! // Create a derived value
//! let count_clone = count.clone();
//! let doubled = Computed::new(move || count_clone.get() * 2);
//!
//! // Create an effect
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let (count_clone, log_clone) = (count.clone(), log.clone());
//! let effect = Effect::new(move || {
//!     log_clone.lock().push((count_clone.get(), doubled.get()));
//! });
//!
//! // Update the cell
//! count.set(5);
//! // Effect automatically re-ran
//! assert_eq!(*log.lock(), vec![(0, 0), (5, 10)]);
//! effect.stop();
//! ```

pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod reactive;
pub mod task;

pub use bridge::{make_reactive, make_reactive_hook, Host, Hooks, Lifecycle};
pub use config::{BridgeConfig, HostMode};
pub use diagnostics::Diagnostic;
pub use error::{ReactiveError, Result};
pub use reactive::{
    effect, on_scope_dispose, watch, Cell, Computed, Effect, EffectOptions, EffectScope, Value,
    WatchOptions,
};
pub use task::{async_watch, AsyncOptions, AsyncTask, AsyncWatchOptions, Overlap, WatchArgs};
