//! Editor instance lifecycle driven by the host's UI callbacks.
//!
//! # State machine
//!
//! ```text
//!            open()                 window + render thread ready
//! Created ──────────► Opening ─────────────────────────────────► Open
//!    ▲                   │ any failure                            │ close(), standalone close
//!    │                   ▼                                        ▼ control, or drop
//!    └── (reopen) ─── Closed ◄──── destroy window, release ◄── Closing
//!                                  subsystem, after join
//! ```
//!
//! All methods are called on the host's main thread. `close` blocks until
//! the render thread has returned and never fails; a second `close` finds
//! no window and does nothing.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::backend::{BackendError, GraphicsBackend};
use crate::config::EditorConfig;
use crate::context::ContextHandle;
use crate::error::EditorError;
use crate::platform::{NativeWindowId, ParentHandle, Platform};
use crate::render_thread::{BuildFn, RenderJob, RenderThreadController, ThreadState, UiFn};
use crate::router::HostNotify;
use crate::subsystem::{SubsystemLease, WindowingSubsystemManager};
use crate::window::InstanceWindow;

/// Pseudo-parameter index carrying the editor width.
pub const PARAM_WIDTH: u32 = 0;

/// Pseudo-parameter index carrying the editor height.
pub const PARAM_HEIGHT: u32 = 1;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an editor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "editor#{}", self.0)
    }
}

/// Lifecycle state of an [`EditorInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    /// Constructed, never opened.
    Created,
    /// `open` in progress.
    Opening,
    /// Window up, render thread running (or stopped after a frame error).
    Open,
    /// `close` in progress.
    Closing,
    /// Torn down. May be opened again.
    Closed,
}

/// One plugin editor: a native window, its render thread and its context.
pub struct EditorInstance<P, B>
where
    P: Platform,
    B: GraphicsBackend<Surface = P::Surface>,
{
    id: InstanceId,
    subsystem: Arc<WindowingSubsystemManager<P>>,
    config: EditorConfig,
    parent: Option<ParentHandle>,
    state: InstanceState,
    lease: Option<SubsystemLease<P>>,
    window: Option<InstanceWindow<P>>,
    thread: RenderThreadController,
    ui: Arc<Mutex<UiFn>>,
    build: Option<BuildFn>,
    on_close: Option<HostNotify>,
    last_error: Option<EditorError>,
    visible: bool,
    transient_parent: Option<usize>,
    _backend: PhantomData<fn() -> B>,
}

impl<P, B> EditorInstance<P, B>
where
    P: Platform,
    B: GraphicsBackend<Surface = P::Surface>,
{
    /// Create an instance. Nothing native happens until [`open`](Self::open).
    ///
    /// `parent` is the host's window; `None` opens a standalone window.
    pub fn new(
        subsystem: Arc<WindowingSubsystemManager<P>>,
        config: EditorConfig,
        parent: Option<ParentHandle>,
    ) -> Self {
        let id = InstanceId::next();
        let ui: UiFn = Box::new(|_ctx: &egui::Context| {});
        Self {
            id,
            subsystem,
            config,
            parent,
            state: InstanceState::Created,
            lease: None,
            window: None,
            thread: RenderThreadController::new(id),
            ui: Arc::new(Mutex::new(ui)),
            build: None,
            on_close: None,
            last_error: None,
            visible: false,
            transient_parent: None,
            _backend: PhantomData,
        }
    }

    /// Set the per-frame UI content.
    pub fn with_ui(self, ui: impl FnMut(&egui::Context) + Send + 'static) -> Self {
        *self.ui.lock() = Box::new(ui);
        self
    }

    /// Set one-time setup run whenever a render context is created.
    pub fn with_build(mut self, build: impl Fn(&egui::Context) + Send + Sync + 'static) -> Self {
        self.build = Some(Arc::new(build));
        self
    }

    /// Callback for the standalone window's close control (the host's hide request).
    pub fn on_close_request(mut self, notify: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(notify));
        self
    }

    // ── Host callbacks ──────────────────────────────────────────────────────

    /// Open the editor: acquire the subsystem, create the window, start the
    /// render thread and wait for it to finish setup.
    ///
    /// On failure everything acquired so far is released, the instance ends
    /// `Closed` and the error is reported and returned.
    pub fn open(&mut self) -> Result<(), EditorError> {
        match self.state {
            InstanceState::Created | InstanceState::Closed => {}
            state => {
                tracing::debug!(instance = %self.id, ?state, "open ignored");
                return Ok(());
            }
        }

        self.set_state(InstanceState::Opening);
        self.last_error = None;
        match self.try_open() {
            Ok(()) => {
                self.set_state(InstanceState::Open);
                Ok(())
            }
            Err(err) => {
                err.report(self.id);
                self.teardown();
                self.last_error = Some(err.clone());
                self.set_state(InstanceState::Closed);
                Err(err)
            }
        }
    }

    fn try_open(&mut self) -> Result<(), EditorError> {
        self.config.validate()?;
        self.lease = Some(self.subsystem.acquire()?);

        let window =
            InstanceWindow::create(self.subsystem.platform(), self.id, &self.config, self.parent)?;
        let window_id = window.id();
        let shared = Arc::clone(window.shared());
        self.subsystem
            .router()
            .associate(window_id, Arc::clone(&shared), self.on_close.clone());
        let surface = window.surface();
        self.window = Some(window);

        let surface = surface.ok_or(EditorError::ContextOrBackendInit(
            BackendError::SurfaceUnavailable(window_id),
        ))?;

        self.thread = RenderThreadController::new(self.id);
        self.thread.start::<B>(RenderJob {
            window: window_id,
            surface,
            shared,
            contexts: Arc::clone(self.subsystem.contexts()),
            router: Arc::clone(self.subsystem.router()),
            config: self.config.clone(),
            build: self.build.clone(),
            ui: Arc::clone(&self.ui),
        })?;

        match self.thread.wait_started() {
            ThreadState::Running => Ok(()),
            _ => Err(match self.thread.join() {
                Some(Err(err)) => err,
                _ => EditorError::ContextOrBackendInit(BackendError::SurfaceUnavailable(window_id)),
            }),
        }
    }

    /// Close the editor. Blocks until the render thread has exited.
    ///
    /// A no-op when no window exists (never opened, or already closed).
    pub fn close(&mut self) {
        if self.window.is_none() && self.lease.is_none() {
            tracing::trace!(instance = %self.id, state = ?self.state, "close ignored");
            return;
        }
        self.set_state(InstanceState::Closing);
        self.teardown();
        self.set_state(InstanceState::Closed);
    }

    /// Request close, join, destroy the window, release the subsystem.
    /// Every step tolerates the resource already being gone.
    fn teardown(&mut self) {
        if let Some(window) = &self.window {
            window.request_close();
        }
        if let Some(Err(err)) = self.thread.join() {
            if self.last_error.is_none() {
                self.last_error = Some(err);
            }
        }
        if let Some(mut window) = self.window.take() {
            self.subsystem.router().dissociate(window.id());
            window.destroy();
        }
        drop(self.lease.take());
    }

    /// Out-of-band parameter update. Only the size pseudo-parameters act.
    pub fn parameter_changed(&mut self, index: u32, value: f32) {
        let (width, height) = self.size();
        match index {
            PARAM_WIDTH => self.size_changed(round_pixels(value), height),
            PARAM_HEIGHT => self.size_changed(width, round_pixels(value)),
            _ => tracing::debug!(instance = %self.id, index, value, "parameter ignored by editor"),
        }
    }

    /// Resize the window and the logical display size, clamped to the
    /// configured bounds. Remembered for the next open when closed.
    pub fn size_changed(&mut self, width: u32, height: u32) {
        let (width, height) = self.config.clamp_size(width, height);
        self.config.width = width;
        self.config.height = height;
        if let Some(window) = &self.window {
            window.resize(width, height);
            tracing::debug!(instance = %self.id, width, height, "editor resized");
        }
    }

    /// Periodic host call: pump window-system events, collect a render
    /// thread that ended on its own and finish a standalone close.
    /// Never draws.
    pub fn idle(&mut self) {
        if self.state != InstanceState::Open {
            return;
        }

        let close_requested = self
            .window
            .as_ref()
            .is_some_and(|window| window.shared().close_requested());
        if !close_requested {
            if let Err(err) = self.subsystem.poll_events() {
                err.report(self.id);
            }
        }

        if self.thread.is_spawned() && self.thread.state() == ThreadState::Stopped {
            if let Some(Err(err)) = self.thread.join() {
                self.last_error = Some(err);
            }
        }

        let standalone_close = self.window.as_ref().is_some_and(|window| {
            window.shared().is_standalone() && window.shared().close_requested()
        });
        if standalone_close {
            tracing::info!(instance = %self.id, "closing after window close control");
            self.close();
        }
    }

    /// Host gave the editor keyboard focus.
    pub fn focus(&mut self) {
        tracing::debug!(instance = %self.id, "focus");
    }

    /// Host changed the editor title.
    pub fn title_changed(&mut self, title: &str) {
        self.config.title = title.to_owned();
        tracing::debug!(instance = %self.id, title, "title changed");
    }

    /// Host showed or hid the editor.
    pub fn visibility_changed(&mut self, visible: bool) {
        self.visible = visible;
        tracing::debug!(instance = %self.id, visible, "visibility changed");
    }

    /// Host changed the transient parent window.
    pub fn transient_parent_window_changed(&mut self, handle: usize) {
        self.transient_parent = Some(handle);
        tracing::debug!(instance = %self.id, handle, "transient parent changed");
    }

    // ── Observers ───────────────────────────────────────────────────────────

    /// Instance identity.
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Lifecycle state.
    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Render thread state.
    pub fn thread_state(&self) -> ThreadState {
        self.thread.state()
    }

    /// Native window while open.
    pub fn window_id(&self) -> Option<NativeWindowId> {
        self.window.as_ref().map(InstanceWindow::id)
    }

    /// Render context while the render thread runs.
    pub fn context(&self) -> Option<ContextHandle> {
        self.thread.context()
    }

    /// Logical size: the window's while open, otherwise the configured one.
    pub fn size(&self) -> (u32, u32) {
        match &self.window {
            Some(window) => window.shared().size(),
            None => self.config.initial_size(),
        }
    }

    /// Configuration, including title and size updates from the host.
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Most recent failure of open or of the render thread.
    pub fn last_error(&self) -> Option<&EditorError> {
        self.last_error.as_ref()
    }

    /// Last visibility reported by the host.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Last transient parent reported by the host.
    pub fn transient_parent(&self) -> Option<usize> {
        self.transient_parent
    }

    /// Whether the window's close flag is set.
    pub fn close_requested(&self) -> bool {
        self.window
            .as_ref()
            .is_some_and(|window| window.shared().close_requested())
    }

    fn set_state(&mut self, next: InstanceState) {
        if self.state != next {
            tracing::info!(instance = %self.id, from = ?self.state, to = ?next, "editor state");
            self.state = next;
        }
    }
}

impl<P, B> Drop for EditorInstance<P, B>
where
    P: Platform,
    B: GraphicsBackend<Surface = P::Surface>,
{
    fn drop(&mut self) {
        self.close();
    }
}

/// Round a pseudo-parameter value to whole pixels. Negative and NaN give 0.
fn round_pixels(value: f32) -> u32 {
    (value + 0.5) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::{HeadlessBackend, HeadlessPlatform};

    type Editor = EditorInstance<HeadlessPlatform, HeadlessBackend>;

    fn subsystem() -> Arc<WindowingSubsystemManager<HeadlessPlatform>> {
        Arc::new(WindowingSubsystemManager::new(HeadlessPlatform::new()))
    }

    fn config() -> EditorConfig {
        EditorConfig::default().with_max_fps(Some(500))
    }

    #[test]
    fn instance_ids_are_unique() {
        assert_ne!(InstanceId::next(), InstanceId::next());
    }

    #[test]
    fn open_and_close() {
        let subsystem = subsystem();
        let mut editor = Editor::new(Arc::clone(&subsystem), config(), Some(ParentHandle(9)));
        assert_eq!(editor.state(), InstanceState::Created);

        editor.open().unwrap();
        assert_eq!(editor.state(), InstanceState::Open);
        assert_eq!(editor.thread_state(), ThreadState::Running);
        assert!(editor.context().is_some());
        assert_eq!(subsystem.ref_count(), 1);

        editor.close();
        assert_eq!(editor.state(), InstanceState::Closed);
        assert_eq!(editor.thread_state(), ThreadState::Stopped);
        assert_eq!(editor.window_id(), None);
        assert_eq!(subsystem.ref_count(), 0);
    }

    #[test]
    fn close_before_open_is_noop() {
        let subsystem = subsystem();
        let mut editor = Editor::new(Arc::clone(&subsystem), config(), None);
        editor.close();
        assert_eq!(editor.state(), InstanceState::Created);
        assert_eq!(subsystem.ref_count(), 0);
    }

    #[test]
    fn size_parameters_round_and_clamp() {
        let subsystem = subsystem();
        let mut editor = Editor::new(Arc::clone(&subsystem), config(), Some(ParentHandle(9)));
        editor.open().unwrap();

        editor.parameter_changed(PARAM_WIDTH, 1023.6);
        assert_eq!(editor.size(), (1024, 600));
        editor.parameter_changed(PARAM_HEIGHT, 767.4);
        assert_eq!(editor.size(), (1024, 767));
        editor.parameter_changed(PARAM_WIDTH, -50.0);
        assert_eq!(editor.size(), (320, 767));
        editor.parameter_changed(7, 5000.0);
        assert_eq!(editor.size(), (320, 767));

        let window = editor.window_id().unwrap();
        assert_eq!(subsystem.platform().window_size(window), Some((320, 767)));
        editor.close();
    }

    #[test]
    fn size_before_open_is_remembered() {
        let subsystem = subsystem();
        let mut editor = Editor::new(Arc::clone(&subsystem), config(), Some(ParentHandle(9)));
        editor.size_changed(640, 480);
        editor.open().unwrap();
        let window = editor.window_id().unwrap();
        assert_eq!(subsystem.platform().window_size(window), Some((640, 480)));
    }

    #[test]
    fn informational_hooks_are_bookkeeping_only() {
        let subsystem = subsystem();
        let mut editor = Editor::new(Arc::clone(&subsystem), config(), Some(ParentHandle(9)));
        editor.focus();
        editor.title_changed("Sonido Chorus");
        editor.visibility_changed(true);
        editor.transient_parent_window_changed(0xbeef);
        assert_eq!(editor.config().title, "Sonido Chorus");
        assert!(editor.is_visible());
        assert_eq!(editor.transient_parent(), Some(0xbeef));
        assert_eq!(editor.state(), InstanceState::Created);
        assert_eq!(subsystem.ref_count(), 0);
    }

    #[test]
    fn reopen_after_close() {
        let subsystem = subsystem();
        let mut editor = Editor::new(Arc::clone(&subsystem), config(), Some(ParentHandle(9)));
        editor.open().unwrap();
        editor.close();
        editor.open().unwrap();
        assert_eq!(editor.state(), InstanceState::Open);
        assert_eq!(subsystem.ref_count(), 1);
        drop(editor);
        assert_eq!(subsystem.ref_count(), 0);
    }

    #[test]
    fn build_and_ui_survive_reopen() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let builds = Arc::new(AtomicUsize::new(0));
        let frames = Arc::new(AtomicUsize::new(0));
        let subsystem = subsystem();
        let mut editor = {
            let builds = Arc::clone(&builds);
            let frames = Arc::clone(&frames);
            Editor::new(Arc::clone(&subsystem), config(), Some(ParentHandle(9)))
                .with_build(move |_ctx| {
                    builds.fetch_add(1, Ordering::SeqCst);
                })
                .with_ui(move |_ctx| {
                    frames.fetch_add(1, Ordering::SeqCst);
                })
        };

        editor.open().unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        editor.close();
        let drawn = frames.load(Ordering::SeqCst);

        editor.open().unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while frames.load(Ordering::SeqCst) == drawn && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(frames.load(Ordering::SeqCst) > drawn);
        editor.close();
    }

    #[test]
    fn round_pixels_truncates_after_half() {
        assert_eq!(round_pixels(799.5), 800);
        assert_eq!(round_pixels(799.49), 799);
        assert_eq!(round_pixels(-3.0), 0);
        assert_eq!(round_pixels(f32::NAN), 0);
    }
}
