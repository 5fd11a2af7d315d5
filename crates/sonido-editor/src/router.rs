//! Routes native events to the context of the instance that owns the window.
//!
//! The router is the only consumer of the windowing library's event queue:
//! [`WindowingSubsystemManager::poll_events`](crate::WindowingSubsystemManager::poll_events)
//! hands every event to [`EventCallbackRouter::dispatch`], which
//!
//! 1. resolves the owning instance from the window's association,
//! 2. activates that instance's render context on the calling thread,
//! 3. forwards the event to the matching [`input`](crate::input) entry point,
//! 4. drops the activation.
//!
//! Associations are registered when a window is created and cleared when it
//! is destroyed, so an event for a destroyed window finds nothing and is
//! dropped. The render thread attaches its context once it is ready for
//! input and detaches it before the context is torn down.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::context::{ContextHandle, RenderContextRegistry};
use crate::input;
use crate::lifecycle::InstanceId;
use crate::platform::{NativeEvent, NativeWindowId};
use crate::window::WindowShared;

/// Host callback run when a standalone window's close control is used.
pub type HostNotify = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
struct WindowBinding {
    shared: Arc<WindowShared>,
    input: Option<ContextHandle>,
    on_close: Option<HostNotify>,
}

/// Window → instance association and event dispatch.
pub struct EventCallbackRouter {
    contexts: Arc<RenderContextRegistry>,
    bindings: RwLock<HashMap<NativeWindowId, WindowBinding>>,
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

impl EventCallbackRouter {
    /// Create a router that activates contexts from `contexts`.
    pub fn new(contexts: Arc<RenderContextRegistry>) -> Self {
        Self {
            contexts,
            bindings: RwLock::new(HashMap::new()),
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Associate `window` with the instance owning `shared`.
    pub fn associate(
        &self,
        window: NativeWindowId,
        shared: Arc<WindowShared>,
        on_close: Option<HostNotify>,
    ) {
        let instance = shared.instance();
        let previous = self.bindings.write().insert(
            window,
            WindowBinding {
                shared,
                input: None,
                on_close,
            },
        );
        if previous.is_some() {
            tracing::warn!(%window, %instance, "window association replaced");
        }
    }

    /// Remove the association of `window`. Unknown windows are ignored.
    pub fn dissociate(&self, window: NativeWindowId) {
        self.bindings.write().remove(&window);
    }

    /// Attach the render context that receives input for `window`.
    ///
    /// Returns `false` if the window has no association.
    pub fn install_input(&self, window: NativeWindowId, context: ContextHandle) -> bool {
        match self.bindings.write().get_mut(&window) {
            Some(binding) => {
                binding.input = Some(context);
                true
            }
            None => false,
        }
    }

    /// Detach the input context of `window`. Later input is dropped.
    pub fn uninstall_input(&self, window: NativeWindowId) {
        if let Some(binding) = self.bindings.write().get_mut(&window) {
            binding.input = None;
        }
    }

    /// Instance owning `window`.
    pub fn owner(&self, window: NativeWindowId) -> Option<InstanceId> {
        self.bindings
            .read()
            .get(&window)
            .map(|binding| binding.shared.instance())
    }

    /// Context receiving input for `window`.
    pub fn input_context(&self, window: NativeWindowId) -> Option<ContextHandle> {
        self.bindings
            .read()
            .get(&window)
            .and_then(|binding| binding.input)
    }

    /// Number of associated windows.
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    /// Whether no window is associated.
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Events delivered to a context or acted on.
    pub fn forwarded_events(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Events dropped (unknown window, no input context, context gone).
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Route one event. Returns whether it was delivered.
    pub fn dispatch(&self, window: NativeWindowId, event: NativeEvent) -> bool {
        // Clone out of the lock; activation may block on the render thread.
        let binding = self.bindings.read().get(&window).cloned();
        let Some(binding) = binding else {
            tracing::trace!(%window, ?event, "event for unassociated window dropped");
            return self.drop_event();
        };
        let instance = binding.shared.instance();

        if event == NativeEvent::CloseRequested {
            if !binding.shared.is_standalone() {
                tracing::debug!(%window, %instance, "close request on embedded window ignored");
                return self.drop_event();
            }
            tracing::info!(%window, %instance, "close requested from window");
            binding.shared.request_close();
            if let Some(notify) = &binding.on_close {
                notify();
            }
            return self.deliver();
        }

        let Some(context) = binding.input else {
            tracing::trace!(%window, %instance, "no input context installed, event dropped");
            return self.drop_event();
        };

        let activation = match self.contexts.activate(context) {
            Ok(activation) => activation,
            Err(err) => {
                tracing::warn!(%window, %instance, error = %err, "input dropped");
                return self.drop_event();
            }
        };
        let result = input::forward(&event);
        drop(activation);

        match result {
            Ok(_) => self.deliver(),
            Err(err) => {
                tracing::warn!(%window, %instance, error = %err, "input dropped");
                self.drop_event()
            }
        }
    }

    fn deliver(&self) -> bool {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn drop_event(&self) -> bool {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RenderContextRegistry;
    use keyboard_types::{Key, Modifiers};
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        contexts: Arc<RenderContextRegistry>,
        router: EventCallbackRouter,
    }

    fn fixture() -> Fixture {
        let contexts = Arc::new(RenderContextRegistry::new());
        let router = EventCallbackRouter::new(Arc::clone(&contexts));
        Fixture { contexts, router }
    }

    fn shared(standalone: bool) -> Arc<WindowShared> {
        Arc::new(WindowShared::new(InstanceId::next(), standalone, 1.0, 800, 600))
    }

    fn key_press() -> NativeEvent {
        NativeEvent::Key {
            key: Key::Character("k".into()),
            scancode: Some(37),
            pressed: true,
            repeat: false,
            modifiers: Modifiers::empty(),
        }
    }

    #[test]
    fn input_reaches_only_the_owning_context() {
        let f = fixture();
        let (wa, wb) = (NativeWindowId(1), NativeWindowId(2));
        let (ca, cb) = (f.contexts.create_context(1.0), f.contexts.create_context(1.0));
        f.router.associate(wa, shared(false), None);
        f.router.associate(wb, shared(false), None);
        f.router.install_input(wa, ca);
        f.router.install_input(wb, cb);

        assert!(f.router.dispatch(wa, key_press()));
        assert!(f.router.dispatch(wa, NativeEvent::Char('k')));

        assert_eq!(f.contexts.get(ca).unwrap().events_received(), 2);
        assert_eq!(f.contexts.get(cb).unwrap().events_received(), 0);
        assert_eq!(RenderContextRegistry::current(), None);
    }

    #[test]
    fn unknown_window_is_dropped() {
        let f = fixture();
        assert!(!f.router.dispatch(NativeWindowId(9), NativeEvent::Char('x')));
        assert_eq!(f.router.dropped_events(), 1);
    }

    #[test]
    fn input_without_context_is_dropped() {
        let f = fixture();
        let window = NativeWindowId(1);
        f.router.associate(window, shared(false), None);
        assert!(!f.router.dispatch(window, NativeEvent::Focus(true)));

        let context = f.contexts.create_context(1.0);
        f.router.install_input(window, context);
        assert!(f.router.dispatch(window, NativeEvent::Focus(true)));
        f.router.uninstall_input(window);
        assert!(!f.router.dispatch(window, NativeEvent::Focus(false)));
        assert_eq!(f.router.dropped_events(), 2);
    }

    #[test]
    fn standalone_close_requests_close_and_notifies_host() {
        let f = fixture();
        let window = NativeWindowId(1);
        let state = shared(true);
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        f.router.associate(
            window,
            Arc::clone(&state),
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        assert!(f.router.dispatch(window, NativeEvent::CloseRequested));
        assert!(state.close_requested());
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn embedded_close_request_is_ignored() {
        let f = fixture();
        let window = NativeWindowId(1);
        let state = shared(false);
        f.router.associate(window, Arc::clone(&state), None);
        assert!(!f.router.dispatch(window, NativeEvent::CloseRequested));
        assert!(!state.close_requested());
    }

    #[test]
    fn dissociate_clears_owner() {
        let f = fixture();
        let window = NativeWindowId(3);
        let state = shared(false);
        let instance = state.instance();
        f.router.associate(window, state, None);
        assert_eq!(f.router.owner(window), Some(instance));
        f.router.dissociate(window);
        assert_eq!(f.router.owner(window), None);
        assert!(f.router.is_empty());
    }

    #[test]
    fn destroyed_context_drops_input() {
        let f = fixture();
        let window = NativeWindowId(1);
        let context = f.contexts.create_context(1.0);
        f.router.associate(window, shared(false), None);
        f.router.install_input(window, context);
        let activation = f.contexts.activate(context).unwrap();
        f.contexts.destroy_context(activation);
        assert!(!f.router.dispatch(window, NativeEvent::Char('z')));
    }
}
