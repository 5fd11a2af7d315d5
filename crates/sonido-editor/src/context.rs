//! Render contexts and per-thread context activation.
//!
//! Immediate-mode GUI libraries keep "the current context" as ambient
//! state. With several editor instances in one process, and two threads per
//! instance (host main thread for input, render thread for frames), one
//! ambient pointer is wrong for everybody. This module keeps a current
//! context per thread instead and makes selecting it an explicit call:
//!
//! ```text
//! render thread                      main thread (event dispatch)
//! ─────────────                      ────────────────────────────
//! let a = registry.activate(h)?;     let a = registry.activate(h)?;  ◄─ blocks
//! run UI, tessellate                  │                                 while the
//! drop(a) ───────────────────────────►│ acquires                        render thread
//!                                     push input event                  holds h
//!                                     drop(a)
//! ```
//!
//! - [`Activation`] is an RAII guard and `!Send`: the context is current on
//!   exactly the thread that activated it, for exactly as long as the guard
//!   lives. Each thread keeps a stack of live activations; dropping a
//!   guard removes its own entry, and the current context is the top of
//!   the stack, so guards may drop in any order.
//! - A context is never active on two threads at once. Activating a
//!   context held by another thread blocks until that thread releases it;
//!   activating it again on the same thread nests.
//! - Rendering-library state (the `egui::Context`, pending input) is only
//!   reachable through an `Activation` or through the calling thread's
//!   current context.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::Instant;

use egui::{Pos2, RawInput, Rect, Vec2, ViewportId};
use parking_lot::{Condvar, Mutex, RwLock};
use thiserror::Error;

/// Opaque handle to a [`RenderContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextHandle(u64);

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Errors from context selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The handle does not name a live context (never created, or destroyed).
    #[error("unknown render context {0}")]
    Unknown(ContextHandle),

    /// A rendering-library call was made with no current context on this thread.
    #[error("no render context is active on this thread")]
    NotActive,
}

thread_local! {
    /// Live activations of this thread, innermost last.
    static ACTIVE: RefCell<Vec<Arc<RenderContext>>> = const { RefCell::new(Vec::new()) };
}

// ── Render context ───────────────────────────────────────────────────────────

#[derive(Default)]
struct Owner {
    thread: Option<ThreadId>,
    depth: usize,
}

/// Input accumulated between frames.
pub(crate) struct InputState {
    pub(crate) raw: RawInput,
    /// Last pointer position in logical pixels.
    pub(crate) pointer: Pos2,
    /// Physical pixels per logical pixel, for cursor coordinates.
    pub(crate) scale: f32,
}

/// One rendering-library context: an `egui::Context`, its pending input and
/// ownership bookkeeping.
pub struct RenderContext {
    handle: ContextHandle,
    egui: egui::Context,
    input: Mutex<InputState>,
    owner: Mutex<Owner>,
    released: Condvar,
    alive: AtomicBool,
    start: Instant,
    events_received: AtomicU64,
    frames_built: AtomicU64,
}

impl RenderContext {
    fn new(handle: ContextHandle, scale: f32) -> Self {
        Self {
            handle,
            egui: egui::Context::default(),
            input: Mutex::new(InputState {
                raw: RawInput::default(),
                pointer: Pos2::ZERO,
                scale,
            }),
            owner: Mutex::new(Owner::default()),
            released: Condvar::new(),
            alive: AtomicBool::new(true),
            start: Instant::now(),
            events_received: AtomicU64::new(0),
            frames_built: AtomicU64::new(0),
        }
    }

    /// Handle of this context.
    pub fn handle(&self) -> ContextHandle {
        self.handle
    }

    /// Input events forwarded into this context so far.
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Acquire)
    }

    /// Frames laid out with this context so far.
    pub fn frames_built(&self) -> u64 {
        self.frames_built.load(Ordering::Acquire)
    }

    /// Whether the context has not been destroyed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Run `f` on the pending input. Counts every event `f` appends.
    pub(crate) fn with_input<R>(&self, f: impl FnOnce(&mut InputState) -> R) -> R {
        let mut input = self.input.lock();
        let before = input.raw.events.len();
        let result = f(&mut input);
        let added = input.raw.events.len().saturating_sub(before);
        self.events_received
            .fetch_add(added as u64, Ordering::AcqRel);
        result
    }

    fn acquire(&self, me: ThreadId) -> Result<(), ContextError> {
        let mut owner = self.owner.lock();
        loop {
            if !self.is_alive() {
                return Err(ContextError::Unknown(self.handle));
            }
            match owner.thread {
                None => {
                    owner.thread = Some(me);
                    owner.depth = 1;
                    return Ok(());
                }
                Some(thread) if thread == me => {
                    owner.depth += 1;
                    return Ok(());
                }
                Some(_) => self.released.wait(&mut owner),
            }
        }
    }

    fn release(&self) {
        let mut owner = self.owner.lock();
        owner.depth = owner.depth.saturating_sub(1);
        if owner.depth == 0 {
            owner.thread = None;
            self.released.notify_all();
        }
    }
}

// ── Activation guard ─────────────────────────────────────────────────────────

/// Proof that a context is current on the calling thread.
///
/// Not `Send`: a context activated on one thread cannot be used from another.
pub struct Activation {
    context: Arc<RenderContext>,
    _not_send: PhantomData<*const ()>,
}

impl Activation {
    /// Handle of the active context.
    pub fn handle(&self) -> ContextHandle {
        self.context.handle
    }

    /// The active context's `egui::Context`.
    pub fn egui(&self) -> &egui::Context {
        &self.context.egui
    }

    /// The active context.
    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    /// Take the input gathered since the last frame, prepared for a frame of
    /// `logical_size` at `pixels_per_point`.
    pub fn take_input(&self, logical_size: (u32, u32), pixels_per_point: f32) -> RawInput {
        let mut input = self.context.input.lock();
        input.scale = pixels_per_point;
        let mut raw = input.raw.take();
        let (w, h) = logical_size;
        raw.screen_rect = Some(Rect::from_min_size(
            Pos2::ZERO,
            Vec2::new(w as f32, h as f32),
        ));
        raw.viewports
            .entry(ViewportId::ROOT)
            .or_default()
            .native_pixels_per_point = Some(pixels_per_point);
        raw.time = Some(self.context.start.elapsed().as_secs_f64());
        raw
    }

    /// Count one completed frame.
    pub fn record_frame(&self) {
        self.context.frames_built.fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(index) = active
                .iter()
                .rposition(|context| Arc::ptr_eq(context, &self.context))
            {
                active.remove(index);
            }
        });
        self.context.release();
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Owns every render context of one windowing subsystem.
#[derive(Default)]
pub struct RenderContextRegistry {
    contexts: RwLock<HashMap<ContextHandle, Arc<RenderContext>>>,
    next: AtomicU64,
}

impl RenderContextRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new context. It is not made current.
    pub fn create_context(&self, scale: f32) -> ContextHandle {
        let handle = ContextHandle(self.next.fetch_add(1, Ordering::AcqRel) + 1);
        self.contexts
            .write()
            .insert(handle, Arc::new(RenderContext::new(handle, scale)));
        tracing::debug!(context = %handle, "render context created");
        handle
    }

    /// Make `handle` the calling thread's current context until the guard drops.
    ///
    /// Blocks while another thread holds the context.
    pub fn activate(&self, handle: ContextHandle) -> Result<Activation, ContextError> {
        let context = self
            .get(handle)
            .ok_or(ContextError::Unknown(handle))?;
        context.acquire(thread::current().id())?;
        ACTIVE.with(|active| active.borrow_mut().push(Arc::clone(&context)));
        Ok(Activation {
            context,
            _not_send: PhantomData,
        })
    }

    /// Destroy the context held by `activation`.
    ///
    /// Consuming the guard proves the context is active on the calling
    /// thread. Threads blocked in [`activate`](Self::activate) on it wake up
    /// with [`ContextError::Unknown`].
    pub fn destroy_context(&self, activation: Activation) {
        let handle = activation.handle();
        self.contexts.write().remove(&handle);
        activation.context.alive.store(false, Ordering::Release);
        drop(activation);
        tracing::debug!(context = %handle, "render context destroyed");
    }

    /// Handle of the calling thread's current context.
    pub fn current() -> Option<ContextHandle> {
        ACTIVE.with(|active| active.borrow().last().map(|context| context.handle))
    }

    /// Run `f` on the calling thread's current context.
    pub fn with_current<R>(f: impl FnOnce(&RenderContext) -> R) -> Result<R, ContextError> {
        let context = ACTIVE.with(|active| active.borrow().last().cloned());
        match context {
            Some(context) => Ok(f(&context)),
            None => Err(ContextError::NotActive),
        }
    }

    /// Look up a live context.
    pub fn get(&self, handle: ContextHandle) -> Option<Arc<RenderContext>> {
        self.contexts.read().get(&handle).cloned()
    }

    /// Whether `handle` names a live context.
    pub fn contains(&self, handle: ContextHandle) -> bool {
        self.contexts.read().contains_key(&handle)
    }

    /// Number of live contexts.
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    /// Whether no context is live.
    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn create_does_not_activate() {
        let registry = RenderContextRegistry::new();
        let handle = registry.create_context(1.0);
        assert!(registry.contains(handle));
        assert_eq!(RenderContextRegistry::current(), None);
    }

    #[test]
    fn activation_scopes_current_context() {
        let registry = RenderContextRegistry::new();
        let a = registry.create_context(1.0);
        let b = registry.create_context(1.0);

        let outer = registry.activate(a).unwrap();
        assert_eq!(RenderContextRegistry::current(), Some(a));
        {
            let _inner = registry.activate(b).unwrap();
            assert_eq!(RenderContextRegistry::current(), Some(b));
        }
        assert_eq!(RenderContextRegistry::current(), Some(a));
        drop(outer);
        assert_eq!(RenderContextRegistry::current(), None);
    }

    #[test]
    fn out_of_order_drop_never_revives_a_released_context() {
        let registry = RenderContextRegistry::new();
        let a = registry.create_context(1.0);
        let b = registry.create_context(1.0);

        let outer = registry.activate(a).unwrap();
        let inner = registry.activate(b).unwrap();
        drop(outer);
        assert_eq!(RenderContextRegistry::current(), Some(b));
        drop(inner);
        assert_eq!(RenderContextRegistry::current(), None);

        // `a` was released, so another thread can take it right away.
        let registry = Arc::new(registry);
        let taken = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.activate(a).map(|guard| guard.handle()))
        };
        assert_eq!(taken.join().unwrap(), Ok(a));
    }

    #[test]
    fn same_thread_activation_nests() {
        let registry = RenderContextRegistry::new();
        let a = registry.create_context(1.0);
        let first = registry.activate(a).unwrap();
        let second = registry.activate(a).unwrap();
        drop(second);
        assert_eq!(RenderContextRegistry::current(), Some(a));
        drop(first);
        assert_eq!(RenderContextRegistry::current(), None);
    }

    #[test]
    fn other_thread_waits_for_release() {
        let registry = Arc::new(RenderContextRegistry::new());
        let handle = registry.create_context(1.0);
        let guard = registry.activate(handle).unwrap();

        let (tx, rx) = mpsc::channel();
        let worker = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let activation = registry.activate(handle).unwrap();
                tx.send(RenderContextRegistry::current()).unwrap();
                drop(activation);
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(guard);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Some(handle)
        );
        worker.join().unwrap();
        assert_eq!(RenderContextRegistry::current(), None);
    }

    #[test]
    fn current_context_is_per_thread() {
        let registry = RenderContextRegistry::new();
        let handle = registry.create_context(1.0);
        let _guard = registry.activate(handle).unwrap();
        let seen = thread::spawn(RenderContextRegistry::current).join().unwrap();
        assert_eq!(seen, None);
    }

    #[test]
    fn destroy_wakes_waiters_with_unknown() {
        let registry = Arc::new(RenderContextRegistry::new());
        let handle = registry.create_context(1.0);
        let guard = registry.activate(handle).unwrap();

        let waiter = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.activate(handle).err())
        };
        thread::sleep(Duration::from_millis(20));
        registry.destroy_context(guard);

        assert_eq!(waiter.join().unwrap(), Some(ContextError::Unknown(handle)));
        assert!(registry.is_empty());
        assert_eq!(RenderContextRegistry::current(), None);
    }

    #[test]
    fn with_current_requires_activation() {
        let registry = RenderContextRegistry::new();
        let handle = registry.create_context(1.0);
        assert_eq!(
            RenderContextRegistry::with_current(|ctx| ctx.handle()),
            Err(ContextError::NotActive)
        );
        let _guard = registry.activate(handle).unwrap();
        assert_eq!(
            RenderContextRegistry::with_current(|ctx| ctx.handle()),
            Ok(handle)
        );
    }

    #[test]
    fn unknown_handle_is_rejected() {
        let registry = RenderContextRegistry::new();
        let other = RenderContextRegistry::new();
        let handle = other.create_context(1.0);
        let _ = registry.create_context(1.0);
        let stray = ContextHandle(99);
        assert!(matches!(
            registry.activate(stray),
            Err(ContextError::Unknown(h)) if h == stray
        ));
        assert!(other.contains(handle));
    }

    #[test]
    fn take_input_sets_screen_and_scale() {
        let registry = RenderContextRegistry::new();
        let handle = registry.create_context(2.0);
        let guard = registry.activate(handle).unwrap();
        guard.context().with_input(|input| {
            input.raw.events.push(egui::Event::PointerGone);
        });

        let raw = guard.take_input((1024, 768), 2.0);
        assert_eq!(
            raw.screen_rect,
            Some(Rect::from_min_size(Pos2::ZERO, Vec2::new(1024.0, 768.0)))
        );
        assert_eq!(
            raw.viewports[&ViewportId::ROOT].native_pixels_per_point,
            Some(2.0)
        );
        assert_eq!(raw.events.len(), 1);
        assert_eq!(guard.context().events_received(), 1);
        assert!(guard.take_input((1024, 768), 2.0).events.is_empty());
    }
}
