//! Reactive components: bridges whose arguments are a props map.

use std::sync::Arc;

use parking_lot::Mutex;

use super::props::ReactiveProps;
use super::{make_reactive_hook, BridgeInstance, Hooks, Host, Lifecycle, ReactiveBridge};
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::reactive::{Props, ReactiveObject};

/// A render function over observable props.
pub struct ReactiveComponent<R> {
    bridge: ReactiveBridge<ReactiveObject, R>,
}

impl<R> Clone for ReactiveComponent<R> {
    fn clone(&self) -> Self {
        Self {
            bridge: self.bridge.clone(),
        }
    }
}

/// Wrap a render function that receives the props as a readonly reactive
/// object. Reading a prop inside the render subscribes the instance to it.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use trellis_core::bridge::{make_reactive, Host};
/// use trellis_core::config::BridgeConfig;
/// use trellis_core::reactive::{Props, Value};
///
/// let greeting = make_reactive(|props, _hooks| format!("hello {}", props.get("name")));
///
/// let requests = Arc::new(AtomicUsize::new(0));
/// let requests_clone = requests.clone();
/// let host: Arc<dyn Host> = Arc::new(move || {
///     requests_clone.fetch_add(1, Ordering::SeqCst);
/// });
/// let instance = greeting.instantiate(host, BridgeConfig::default());
///
/// let props: Props = [("name".to_string(), Value::from("world"))].into_iter().collect();
/// assert_eq!(instance.render(&props).unwrap(), "hello world");
/// instance.commit();
/// instance.unmount();
/// ```
pub fn make_reactive<R, F>(render: F) -> ReactiveComponent<R>
where
    R: Send + 'static,
    F: Fn(&ReactiveObject, &Hooks) -> R + Send + Sync + 'static,
{
    ReactiveComponent {
        bridge: make_reactive_hook(render),
    }
}

impl<R: Send + 'static> ReactiveComponent<R> {
    pub fn instantiate(&self, host: Arc<dyn Host>, config: BridgeConfig) -> ComponentInstance<R> {
        ComponentInstance {
            bridge: self.bridge.instantiate(host, config),
            props: Mutex::new(None),
        }
    }
}

/// One mounted (or mounting) component.
pub struct ComponentInstance<R> {
    bridge: BridgeInstance<ReactiveObject, R>,
    props: Mutex<Option<ReactiveProps>>,
}

impl<R: Send + 'static> ComponentInstance<R> {
    /// Run one host render pass with `props`.
    ///
    /// The props are assigned into the instance's reactive props first. The
    /// instance does not request a re-render for its own props update, since
    /// the host is rendering it already.
    pub fn render(&self, props: &Props) -> Result<R> {
        let view = {
            let _updating = self.bridge.updating_props();
            let mut bridged = self.props.lock();
            match bridged.as_ref() {
                Some(existing) => existing.assign(props)?,
                None => *bridged = Some(ReactiveProps::new(props)?),
            }
            bridged
                .as_ref()
                .map(|bridged| bridged.view().clone())
                .unwrap_or_default()
        };

        Ok(self.bridge.render(view))
    }

    pub fn commit(&self) {
        self.bridge.commit();
    }

    pub fn unmount(&self) {
        self.bridge.unmount();
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.bridge.lifecycle()
    }

    pub fn hooks(&self) -> &Hooks {
        self.bridge.hooks()
    }

    /// The readonly props view of the latest render.
    pub fn props(&self) -> Option<ReactiveObject> {
        self.props
            .lock()
            .as_ref()
            .map(|bridged| bridged.view().clone())
    }

    pub fn dependency_count(&self) -> usize {
        self.bridge.dependency_count()
    }
}

impl<R> std::fmt::Debug for ComponentInstance<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("bridge", &self.bridge)
            .finish()
    }
}
