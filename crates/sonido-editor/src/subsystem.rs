//! Process-wide, reference-counted windowing subsystem.
//!
//! Every editor instance holds a [`SubsystemLease`] from `open` until its
//! window is destroyed. The first lease initializes the windowing library
//! (after installing its error callback) and the last one terminates it:
//!
//! ```text
//! refs: 0 ──acquire──► 1 ──acquire──► 2 ──release──► 1 ──release──► 0
//!          init()                                          terminate()
//! ```
//!
//! The manager also owns the two objects every instance of the subsystem
//! shares: the [`RenderContextRegistry`] and the [`EventCallbackRouter`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::context::RenderContextRegistry;
use crate::error::EditorError;
use crate::platform::Platform;
use crate::router::EventCallbackRouter;

#[derive(Default)]
struct RefState {
    refs: usize,
    main_thread: Option<ThreadId>,
}

/// Reference-counted owner of one windowing library.
pub struct WindowingSubsystemManager<P: Platform> {
    platform: Arc<P>,
    state: Mutex<RefState>,
    contexts: Arc<RenderContextRegistry>,
    router: Arc<EventCallbackRouter>,
    platform_errors: Arc<AtomicU64>,
}

impl<P: Platform> WindowingSubsystemManager<P> {
    /// Wrap an uninitialized platform.
    pub fn new(platform: P) -> Self {
        let contexts = Arc::new(RenderContextRegistry::new());
        Self {
            platform: Arc::new(platform),
            state: Mutex::new(RefState::default()),
            router: Arc::new(EventCallbackRouter::new(Arc::clone(&contexts))),
            contexts,
            platform_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Take one reference, initializing the platform on the 0 → 1 transition.
    ///
    /// On failure the count is unchanged and the platform stays uninitialized.
    pub fn acquire(self: &Arc<Self>) -> Result<SubsystemLease<P>, EditorError> {
        let mut state = self.state.lock();
        if state.refs == 0 {
            let errors = Arc::clone(&self.platform_errors);
            self.platform
                .set_error_callback(Box::new(move |code, description| {
                    errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(code, description, "windowing library error");
                }));
            self.platform.init().map_err(EditorError::SubsystemInit)?;
            state.main_thread = Some(thread::current().id());
            tracing::info!("windowing subsystem initialized");
        }
        state.refs += 1;
        tracing::debug!(refs = state.refs, "subsystem acquired");
        Ok(SubsystemLease {
            manager: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut state = self.state.lock();
        let Some(refs) = state.refs.checked_sub(1) else {
            tracing::warn!("subsystem released more often than acquired");
            return;
        };
        state.refs = refs;
        tracing::debug!(refs, "subsystem released");
        if refs == 0 {
            self.platform.terminate();
            state.main_thread = None;
            tracing::info!("windowing subsystem terminated");
        }
    }

    /// Live references.
    pub fn ref_count(&self) -> usize {
        self.state.lock().refs
    }

    /// Whether the platform is initialized.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().refs > 0
    }

    /// Pump window-system events and route each one.
    ///
    /// Only legal on the thread that initialized the subsystem. Returns the
    /// number of events polled; `Ok(0)` when nothing is initialized.
    pub fn poll_events(&self) -> Result<usize, EditorError> {
        {
            let state = self.state.lock();
            match state.main_thread {
                None => return Ok(0),
                Some(main) if main != thread::current().id() => {
                    return Err(EditorError::WrongThread);
                }
                Some(_) => {}
            }
        }
        let mut polled = 0;
        self.platform.poll_events(&mut |window, event| {
            polled += 1;
            self.router.dispatch(window, event);
        });
        Ok(polled)
    }

    /// The windowing library.
    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    /// Render contexts of every instance.
    pub fn contexts(&self) -> &Arc<RenderContextRegistry> {
        &self.contexts
    }

    /// Event router of every window.
    pub fn router(&self) -> &Arc<EventCallbackRouter> {
        &self.router
    }

    /// Errors reported through the windowing library's error callback.
    pub fn platform_errors(&self) -> u64 {
        self.platform_errors.load(Ordering::Relaxed)
    }
}

/// One reference on the subsystem, released on drop.
#[must_use = "dropping the lease releases the subsystem immediately"]
pub struct SubsystemLease<P: Platform> {
    manager: Arc<WindowingSubsystemManager<P>>,
}

impl<P: Platform> SubsystemLease<P> {
    /// The manager this lease belongs to.
    pub fn manager(&self) -> &Arc<WindowingSubsystemManager<P>> {
        &self.manager
    }

    /// Release the reference now.
    pub fn release(self) {
        drop(self);
    }
}

impl<P: Platform> Drop for SubsystemLease<P> {
    fn drop(&mut self) {
        self.manager.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::HeadlessPlatform;
    use crate::platform::{NativeEvent, ParentHandle, WindowSpec};

    fn manager() -> Arc<WindowingSubsystemManager<HeadlessPlatform>> {
        Arc::new(WindowingSubsystemManager::new(HeadlessPlatform::new()))
    }

    #[test]
    fn first_acquire_initializes_last_release_terminates() {
        let manager = manager();
        let a = manager.acquire().unwrap();
        let b = manager.acquire().unwrap();
        assert_eq!(manager.ref_count(), 2);
        assert_eq!(manager.platform().init_calls(), 1);

        a.release();
        assert_eq!(manager.ref_count(), 1);
        assert!(manager.platform().is_initialized());

        drop(b);
        assert_eq!(manager.ref_count(), 0);
        assert!(!manager.platform().is_initialized());
        assert_eq!(manager.platform().terminate_calls(), 1);
    }

    #[test]
    fn failed_init_leaves_count_at_zero() {
        let manager = manager();
        manager.platform().fail_init(true);
        let err = manager.acquire().err().unwrap();
        assert!(matches!(err, EditorError::SubsystemInit(_)));
        assert_eq!(manager.ref_count(), 0);
        assert_eq!(manager.platform_errors(), 1);

        manager.platform().fail_init(false);
        let _lease = manager.acquire().unwrap();
        assert_eq!(manager.ref_count(), 1);
    }

    #[test]
    fn reinitializes_after_full_release() {
        let manager = manager();
        drop(manager.acquire().unwrap());
        drop(manager.acquire().unwrap());
        assert_eq!(manager.platform().init_calls(), 2);
        assert_eq!(manager.platform().terminate_calls(), 2);
    }

    #[test]
    fn concurrent_acquire_release_balances() {
        let manager = manager();
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let lease = manager.acquire().unwrap();
                        assert!(manager.ref_count() >= 1);
                        drop(lease);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(manager.ref_count(), 0);
        assert_eq!(
            manager.platform().init_calls(),
            manager.platform().terminate_calls()
        );
    }

    #[test]
    fn poll_events_off_main_thread_is_rejected() {
        let manager = manager();
        let _lease = manager.acquire().unwrap();
        let id = manager
            .platform()
            .create_window(&WindowSpec::embedded("x", ParentHandle(1), 10, 10))
            .unwrap();
        manager.platform().inject(id, NativeEvent::Focus(true));

        let remote = Arc::clone(&manager);
        let result = thread::spawn(move || remote.poll_events()).join().unwrap();
        assert!(matches!(result, Err(EditorError::WrongThread)));

        assert_eq!(manager.poll_events().unwrap(), 1);
    }

    #[test]
    fn poll_without_subsystem_is_noop() {
        assert_eq!(manager().poll_events().unwrap(), 0);
    }
}
