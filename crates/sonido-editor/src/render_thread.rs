//! Dedicated render thread for one editor instance.
//!
//! # State machine
//!
//! ```text
//! Idle ──start()──► Starting ──context + backend + input ready──► Running
//!                      │                                            │
//!                      │ init failure                close requested │ or frame error
//!                      ▼                                            ▼
//!                   Stopped ◄──── backend shutdown, destroy ◄──── Stopping
//!                                 context, thread returns
//! ```
//!
//! The thread body owns the graphics backend and the render context from
//! creation to destruction; nothing else ever creates, draws with or
//! destroys them. Shutdown is cooperative: the loop checks the window's
//! close-requested flag at the top of every frame and there is no
//! mid-frame cancellation. [`RenderThreadController::join`] blocks with no
//! timeout until the thread has returned.
//!
//! Each frame:
//!
//! 1. Lock the window's frame lock and read the logical size
//! 2. Activate the context, take pending input, run the UI closure
//! 3. Tessellate egui shapes into GPU primitives, release the activation
//! 4. Paint and swap via the [`GraphicsBackend`]
//! 5. Release the frame lock and pace to `max_fps` if configured

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::backend::{BackendOptions, FramePacket, GraphicsBackend};
use crate::config::EditorConfig;
use crate::context::{ContextHandle, RenderContextRegistry};
use crate::error::EditorError;
use crate::lifecycle::InstanceId;
use crate::platform::NativeWindowId;
use crate::router::EventCallbackRouter;
use crate::window::WindowShared;

/// Per-frame UI closure. Receives the instance's egui context.
pub type UiFn = Box<dyn FnMut(&egui::Context) + Send>;

/// One-time setup run on every newly created context (fonts, style).
pub type BuildFn = Arc<dyn Fn(&egui::Context) + Send + Sync>;

/// Render thread state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Not started.
    Idle,
    /// Spawned, setting up context and backend.
    Starting,
    /// In the draw loop.
    Running,
    /// Loop exited, tearing down.
    Stopping,
    /// Thread body returned (or never ran).
    Stopped,
}

struct StateCell {
    state: Mutex<ThreadState>,
    changed: Condvar,
}

impl StateCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(ThreadState::Idle),
            changed: Condvar::new(),
        }
    }

    fn get(&self) -> ThreadState {
        *self.state.lock()
    }

    fn set(&self, next: ThreadState) {
        *self.state.lock() = next;
        self.changed.notify_all();
    }

    fn wait_while(&self, mut pending: impl FnMut(ThreadState) -> bool) -> ThreadState {
        let mut state = self.state.lock();
        while pending(*state) {
            self.changed.wait(&mut state);
        }
        *state
    }

    fn wait_while_for(
        &self,
        mut pending: impl FnMut(ThreadState) -> bool,
        timeout: Duration,
    ) -> ThreadState {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while pending(*state) {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        *state
    }
}

/// Everything the thread body takes ownership of.
pub struct RenderJob<S> {
    /// Window being drawn into.
    pub window: NativeWindowId,
    /// Surface the backend binds to.
    pub surface: S,
    /// Close flag, size and frame lock.
    pub shared: Arc<WindowShared>,
    /// Registry the context is created in.
    pub contexts: Arc<RenderContextRegistry>,
    /// Router the context is attached to for input.
    pub router: Arc<EventCallbackRouter>,
    /// Clear color, vsync and frame cap.
    pub config: EditorConfig,
    /// Context setup.
    pub build: Option<BuildFn>,
    /// Frame content.
    pub ui: Arc<Mutex<UiFn>>,
}

/// Owner of one instance's render thread.
pub struct RenderThreadController {
    instance: InstanceId,
    state: Arc<StateCell>,
    context: Arc<Mutex<Option<ContextHandle>>>,
    shared: Option<Arc<WindowShared>>,
    handle: Option<JoinHandle<Result<(), EditorError>>>,
}

impl RenderThreadController {
    /// Controller in the `Idle` state.
    pub fn new(instance: InstanceId) -> Self {
        Self {
            instance,
            state: Arc::new(StateCell::new()),
            context: Arc::new(Mutex::new(None)),
            shared: None,
            handle: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ThreadState {
        self.state.get()
    }

    /// Context owned by the thread while it is `Running`.
    pub fn context(&self) -> Option<ContextHandle> {
        *self.context.lock()
    }

    /// Spawn the render thread. Only valid from `Idle`.
    pub fn start<B: GraphicsBackend>(
        &mut self,
        job: RenderJob<B::Surface>,
    ) -> Result<(), EditorError> {
        if self.state() != ThreadState::Idle {
            tracing::warn!(instance = %self.instance, state = ?self.state(), "render thread already started");
            return Ok(());
        }
        self.state.set(ThreadState::Starting);
        self.shared = Some(Arc::clone(&job.shared));

        let instance = self.instance;
        let state = Arc::clone(&self.state);
        let slot = Arc::clone(&self.context);
        let spawned = thread::Builder::new()
            .name(format!("sonido-editor-{}", instance.get()))
            .spawn(move || run::<B>(instance, job, &state, &slot));

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.state.set(ThreadState::Stopped);
                Err(EditorError::from(err))
            }
        }
    }

    /// Block until the thread has finished setup. Returns `Running` or `Stopped`.
    pub fn wait_started(&self) -> ThreadState {
        self.state.wait_while(|state| state == ThreadState::Starting)
    }

    /// Block until `reached` holds or `timeout` elapses. Returns the last state seen.
    pub fn wait_for(
        &self,
        mut reached: impl FnMut(ThreadState) -> bool,
        timeout: Duration,
    ) -> ThreadState {
        self.state.wait_while_for(|state| !reached(state), timeout)
    }

    /// Whether a thread is spawned and not yet joined.
    pub fn is_spawned(&self) -> bool {
        self.handle.is_some()
    }

    /// Wait for the thread to return. `None` if no thread is spawned.
    ///
    /// Does not request a close; callers set the window's flag first.
    pub fn join(&mut self) -> Option<Result<(), EditorError>> {
        let handle = self.handle.take()?;
        let result = handle.join().unwrap_or(Err(EditorError::ThreadPanicked));
        if self.state() != ThreadState::Stopped {
            self.state.set(ThreadState::Stopped);
        }
        self.shared = None;
        Some(result)
    }
}

impl Drop for RenderThreadController {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        if let Some(shared) = &self.shared {
            shared.request_close();
        }
        let _ = self.join();
    }
}

// ── Thread body ──────────────────────────────────────────────────────────────

fn run<B: GraphicsBackend>(
    instance: InstanceId,
    job: RenderJob<B::Surface>,
    state: &StateCell,
    slot: &Mutex<Option<ContextHandle>>,
) -> Result<(), EditorError> {
    let RenderJob {
        window,
        surface,
        shared,
        contexts,
        router,
        config,
        build,
        ui,
    } = job;

    let handle = contexts.create_context(shared.scale() as f32);
    let activation = match contexts.activate(handle) {
        Ok(activation) => activation,
        Err(err) => {
            state.set(ThreadState::Stopped);
            return Err(fail(instance, err.into()));
        }
    };
    activation.egui().set_visuals(egui::Visuals::dark());
    if let Some(build) = &build {
        build(activation.egui());
    }

    let options = BackendOptions { vsync: config.vsync };
    let mut backend = match B::init(surface, &options) {
        Ok(backend) => backend,
        Err(err) => {
            contexts.destroy_context(activation);
            state.set(ThreadState::Stopped);
            return Err(fail(instance, EditorError::ContextOrBackendInit(err)));
        }
    };
    drop(activation);

    *slot.lock() = Some(handle);
    router.install_input(window, handle);
    state.set(ThreadState::Running);
    tracing::info!(%instance, %window, context = %handle, "render thread running");

    let clear_color = config.premultiplied_clear_color();
    let mut pacer = FramePacer::new(config.frame_interval());
    let mut result = Ok(());
    while !shared.close_requested() {
        pacer.begin();
        let mut frame_ui = ui.lock();
        if let Err(err) = draw_frame(
            &contexts,
            handle,
            &shared,
            &mut backend,
            &mut **frame_ui,
            clear_color,
        ) {
            result = Err(fail(instance, err));
            break;
        }
        drop(frame_ui);
        pacer.wait();
    }

    state.set(ThreadState::Stopping);
    router.uninstall_input(window);
    match contexts.activate(handle) {
        Ok(activation) => {
            backend.shutdown();
            contexts.destroy_context(activation);
        }
        Err(err) => {
            tracing::warn!(%instance, error = %err, "context gone before teardown");
            backend.shutdown();
        }
    }
    *slot.lock() = None;
    state.set(ThreadState::Stopped);
    tracing::info!(%instance, %window, "render thread stopped");
    result
}

fn fail(instance: InstanceId, err: EditorError) -> EditorError {
    err.report(instance);
    err
}

fn draw_frame<B: GraphicsBackend>(
    contexts: &RenderContextRegistry,
    handle: ContextHandle,
    shared: &WindowShared,
    backend: &mut B,
    ui: &mut (dyn FnMut(&egui::Context) + Send),
    clear_color: [f32; 4],
) -> Result<(), EditorError> {
    let _frame = shared.lock_frame();
    let logical_size = shared.size();
    let pixels_per_point = shared.scale() as f32;

    let packet = {
        let activation = contexts.activate(handle)?;
        let raw = activation.take_input(logical_size, pixels_per_point);
        let output = activation.egui().run(raw, |ctx| ui(ctx));
        let primitives = activation
            .egui()
            .tessellate(output.shapes, output.pixels_per_point);
        activation.record_frame();
        FramePacket {
            logical_size,
            pixels_per_point: output.pixels_per_point,
            clear_color,
            primitives,
            textures_delta: output.textures_delta,
        }
    };

    backend.render(&packet).map_err(EditorError::RenderLoop)?;
    backend.swap_buffers().map_err(EditorError::RenderLoop)
}

/// Sleeps out the remainder of the frame interval, if one is configured.
struct FramePacer {
    interval: Option<Duration>,
    started: Instant,
}

impl FramePacer {
    fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            started: Instant::now(),
        }
    }

    fn begin(&mut self) {
        self.started = Instant::now();
    }

    fn wait(&self) {
        if let Some(interval) = self.interval {
            let elapsed = self.started.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
    }
}
