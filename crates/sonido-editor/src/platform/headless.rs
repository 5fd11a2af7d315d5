//! In-memory [`Platform`] and [`GraphicsBackend`].
//!
//! Behaves like a windowing library with a single event queue and no
//! display: windows are records, events are injected by the caller and
//! delivered on the next `poll_events`, and every frame the backend swaps is
//! recorded together with the thread that drew it and the native window
//! size at swap time. Failure switches cover every error path of the
//! lifecycle (init, window creation, backend init, mid-session frames).
//!
//! ```rust
//! use sonido_editor::platform::headless::HeadlessPlatform;
//! use sonido_editor::{NativeEvent, Platform, WindowSpec};
//!
//! let platform = HeadlessPlatform::new();
//! platform.init().unwrap();
//! let id = platform.create_window(&WindowSpec::standalone("demo", 320, 240)).unwrap();
//! platform.inject(id, NativeEvent::Char('a'));
//!
//! let mut seen = Vec::new();
//! platform.poll_events(&mut |window, event| seen.push((window, event)));
//! assert_eq!(seen, vec![(id, NativeEvent::Char('a'))]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::{
    ErrorCallback, NativeEvent, NativeWindowId, ParentHandle, Platform, PlatformError, WindowSpec,
    codes,
};
use crate::backend::{BackendError, BackendOptions, FramePacket, GraphicsBackend};
use crate::window::AtomicSize;

/// Number of most recent frames kept per window.
const FRAME_HISTORY: usize = 256;

// ── Platform ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct State {
    initialized: bool,
    init_calls: u32,
    terminate_calls: u32,
    fail_init: Option<PlatformError>,
    fail_next_window: Option<PlatformError>,
    fail_next_backend: bool,
    windows: HashMap<NativeWindowId, Arc<HeadlessWindow>>,
    events: VecDeque<(NativeWindowId, NativeEvent)>,
    next_id: u64,
    error_callback: Option<Arc<ErrorCallback>>,
}

/// Windowing library stand-in with no display server.
#[derive(Default)]
pub struct HeadlessPlatform {
    state: Mutex<State>,
}

impl HeadlessPlatform {
    /// Create an uninitialized platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for `window`, delivered on the next poll.
    pub fn inject(&self, window: NativeWindowId, event: NativeEvent) {
        self.state.lock().events.push_back((window, event));
    }

    /// Make every following `init` fail, or succeed again with `false`.
    pub fn fail_init(&self, fail: bool) {
        self.state.lock().fail_init =
            fail.then(|| PlatformError::new(codes::PLATFORM_ERROR, "no display server"));
    }

    /// Make the next `create_window` fail.
    pub fn fail_next_window(&self) {
        self.state.lock().fail_next_window =
            Some(PlatformError::new(codes::PLATFORM_ERROR, "window creation refused"));
    }

    /// Make the backend of the next created window fail to initialize.
    pub fn fail_next_backend(&self) {
        self.state.lock().fail_next_backend = true;
    }

    /// A live window.
    pub fn window(&self, id: NativeWindowId) -> Option<Arc<HeadlessWindow>> {
        self.state.lock().windows.get(&id).cloned()
    }

    /// Number of live windows.
    pub fn window_count(&self) -> usize {
        self.state.lock().windows.len()
    }

    /// Whether `init` has run without a matching `terminate`.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Successful `init` calls so far.
    pub fn init_calls(&self) -> u32 {
        self.state.lock().init_calls
    }

    /// `terminate` calls so far.
    pub fn terminate_calls(&self) -> u32 {
        self.state.lock().terminate_calls
    }

    /// Report `err` through the installed callback, outside the state lock.
    fn raise(&self, err: PlatformError) -> PlatformError {
        let callback = self.state.lock().error_callback.clone();
        if let Some(callback) = callback {
            (callback.as_ref())(err.code, &err.message);
        }
        err
    }
}

impl Platform for HeadlessPlatform {
    type Surface = HeadlessSurface;

    fn set_error_callback(&self, callback: ErrorCallback) {
        self.state.lock().error_callback = Some(Arc::new(callback));
    }

    fn init(&self) -> Result<(), PlatformError> {
        let failure = {
            let mut state = self.state.lock();
            match state.fail_init.clone() {
                Some(err) => Some(err),
                None => {
                    state.initialized = true;
                    state.init_calls += 1;
                    None
                }
            }
        };
        match failure {
            Some(err) => Err(self.raise(err)),
            None => Ok(()),
        }
    }

    fn terminate(&self) {
        let mut state = self.state.lock();
        state.initialized = false;
        state.terminate_calls += 1;
        for (_, window) in state.windows.drain() {
            window.destroyed.store(true, Ordering::Release);
        }
        state.events.clear();
    }

    fn create_window(&self, spec: &WindowSpec) -> Result<NativeWindowId, PlatformError> {
        let outcome = {
            let mut state = self.state.lock();
            if !state.initialized {
                Err(PlatformError::new(
                    codes::NOT_INITIALIZED,
                    "windowing library is not initialized",
                ))
            } else if spec.parent == Some(ParentHandle(0)) {
                Err(PlatformError::new(codes::INVALID_VALUE, "invalid parent window handle"))
            } else if let Some(err) = state.fail_next_window.take() {
                Err(err)
            } else {
                state.next_id += 1;
                let id = NativeWindowId(state.next_id);
                let window = HeadlessWindow::new(id, spec.clone());
                if std::mem::take(&mut state.fail_next_backend) {
                    window.fail_backend_init();
                }
                state.windows.insert(id, Arc::new(window));
                Ok(id)
            }
        };
        outcome.map_err(|err| self.raise(err))
    }

    fn set_window_pos(&self, id: NativeWindowId, x: i32, y: i32) {
        if let Some(window) = self.window(id) {
            *window.position.lock() = (x, y);
        }
    }

    fn set_window_size(&self, id: NativeWindowId, width: u32, height: u32) {
        if let Some(window) = self.window(id) {
            window.size.store(width, height);
        }
    }

    fn window_size(&self, id: NativeWindowId) -> Option<(u32, u32)> {
        self.window(id).map(|window| window.size())
    }

    fn surface(&self, id: NativeWindowId) -> Option<HeadlessSurface> {
        self.window(id).map(|window| HeadlessSurface { window })
    }

    fn destroy_window(&self, id: NativeWindowId) {
        if let Some(window) = self.state.lock().windows.remove(&id) {
            window.destroyed.store(true, Ordering::Release);
        }
    }

    fn poll_events(&self, sink: &mut dyn FnMut(NativeWindowId, NativeEvent)) {
        let events: Vec<_> = self.state.lock().events.drain(..).collect();
        for (window, event) in events {
            sink(window, event);
        }
    }
}

// ── Windows ──────────────────────────────────────────────────────────────────

/// One frame as seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    /// Logical size the UI was laid out at.
    pub logical_size: (u32, u32),
    /// Physical size the painter targeted.
    pub physical_size: (u32, u32),
    /// Native window size when the buffers were swapped.
    pub native_size: (u32, u32),
    /// Thread that painted and swapped the frame.
    pub thread: ThreadId,
    /// Number of clipped primitives painted.
    pub primitives: usize,
}

/// A window record.
pub struct HeadlessWindow {
    id: NativeWindowId,
    spec: WindowSpec,
    position: Mutex<(i32, i32)>,
    size: AtomicSize,
    destroyed: AtomicBool,
    frames: Mutex<VecDeque<FrameRecord>>,
    frames_total: AtomicU64,
    fail_backend_init: AtomicBool,
    fail_after_frames: AtomicU64,
    backend_thread: Mutex<Option<ThreadId>>,
    backend_shutdown: AtomicBool,
}

impl HeadlessWindow {
    fn new(id: NativeWindowId, spec: WindowSpec) -> Self {
        Self {
            id,
            size: AtomicSize::new(spec.width, spec.height),
            spec,
            position: Mutex::new((i32::MIN, i32::MIN)),
            destroyed: AtomicBool::new(false),
            frames: Mutex::new(VecDeque::with_capacity(FRAME_HISTORY)),
            frames_total: AtomicU64::new(0),
            fail_backend_init: AtomicBool::new(false),
            fail_after_frames: AtomicU64::new(u64::MAX),
            backend_thread: Mutex::new(None),
            backend_shutdown: AtomicBool::new(false),
        }
    }

    /// Window id.
    pub fn id(&self) -> NativeWindowId {
        self.id
    }

    /// Creation parameters.
    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Last position set. `(i32::MIN, i32::MIN)` until the first move.
    pub fn position(&self) -> (i32, i32) {
        *self.position.lock()
    }

    /// Native size in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        self.size.load()
    }

    /// Whether the window has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Make the next backend created for this window fail.
    pub fn fail_backend_init(&self) {
        self.fail_backend_init.store(true, Ordering::Release);
    }

    /// Make the swap after `frames` successful frames fail.
    pub fn fail_after_frames(&self, frames: u64) {
        self.fail_after_frames.store(frames, Ordering::Release);
    }

    /// Total frames swapped.
    pub fn frame_count(&self) -> u64 {
        self.frames_total.load(Ordering::Acquire)
    }

    /// Most recently swapped frames, oldest first.
    pub fn frames(&self) -> Vec<FrameRecord> {
        self.frames.lock().iter().cloned().collect()
    }

    /// Most recently swapped frame.
    pub fn last_frame(&self) -> Option<FrameRecord> {
        self.frames.lock().back().cloned()
    }

    /// Thread the backend was created on.
    pub fn backend_thread(&self) -> Option<ThreadId> {
        *self.backend_thread.lock()
    }

    /// Whether the backend was shut down.
    pub fn backend_shut_down(&self) -> bool {
        self.backend_shutdown.load(Ordering::Acquire)
    }

    fn record(&self, frame: FrameRecord) {
        let mut frames = self.frames.lock();
        if frames.len() == FRAME_HISTORY {
            frames.pop_front();
        }
        frames.push_back(frame);
        self.frames_total.fetch_add(1, Ordering::AcqRel);
    }
}

/// Render surface handed to the render thread.
pub struct HeadlessSurface {
    window: Arc<HeadlessWindow>,
}

// ── Backend ──────────────────────────────────────────────────────────────────

/// Graphics backend that records frames instead of drawing them.
pub struct HeadlessBackend {
    window: Arc<HeadlessWindow>,
    options: BackendOptions,
    pending: Option<(FramePacket, ThreadId)>,
}

impl HeadlessBackend {
    /// Options the backend was created with.
    pub fn options(&self) -> BackendOptions {
        self.options
    }
}

impl GraphicsBackend for HeadlessBackend {
    type Surface = HeadlessSurface;

    fn init(surface: HeadlessSurface, options: &BackendOptions) -> Result<Self, BackendError> {
        let window = surface.window;
        if window.is_destroyed() {
            return Err(BackendError::SurfaceUnavailable(window.id));
        }
        if window.fail_backend_init.swap(false, Ordering::AcqRel) {
            return Err(BackendError::Context("no matching pixel format".into()));
        }
        *window.backend_thread.lock() = Some(thread::current().id());
        Ok(Self {
            window,
            options: *options,
            pending: None,
        })
    }

    fn render(&mut self, frame: &FramePacket) -> Result<(), BackendError> {
        if self.window.is_destroyed() {
            return Err(BackendError::SurfaceUnavailable(self.window.id));
        }
        let packet = FramePacket {
            logical_size: frame.logical_size,
            pixels_per_point: frame.pixels_per_point,
            clear_color: frame.clear_color,
            primitives: frame.primitives.clone(),
            textures_delta: egui::TexturesDelta::default(),
        };
        self.pending = Some((packet, thread::current().id()));
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), BackendError> {
        let Some((packet, thread)) = self.pending.take() else {
            return Ok(());
        };
        if self.window.frame_count() >= self.window.fail_after_frames.load(Ordering::Acquire) {
            return Err(BackendError::Swap("surface lost".into()));
        }
        self.window.record(FrameRecord {
            logical_size: packet.logical_size,
            physical_size: packet.physical_size(),
            native_size: self.window.size(),
            thread,
            primitives: packet.primitives.len(),
        });
        Ok(())
    }

    fn shutdown(self) {
        self.window.backend_shutdown.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn create_window_requires_init() {
        let platform = HeadlessPlatform::new();
        let err = platform
            .create_window(&WindowSpec::standalone("x", 10, 10))
            .unwrap_err();
        assert_eq!(err.code, codes::NOT_INITIALIZED);
    }

    #[test]
    fn failures_reach_error_callback() {
        let platform = HeadlessPlatform::new();
        let reported = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reported);
        platform.set_error_callback(Box::new(move |code, _| {
            assert_eq!(code, codes::INVALID_VALUE);
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        platform.init().unwrap();
        let result = platform.create_window(&WindowSpec::embedded("x", ParentHandle(0), 10, 10));
        assert!(result.is_err());
        assert_eq!(reported.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn terminate_destroys_open_windows() {
        let platform = HeadlessPlatform::new();
        platform.init().unwrap();
        let id = platform
            .create_window(&WindowSpec::standalone("x", 10, 10))
            .unwrap();
        let window = platform.window(id).unwrap();
        platform.terminate();
        assert!(window.is_destroyed());
        assert_eq!(platform.window_count(), 0);
        assert!(!platform.is_initialized());
    }

    #[test]
    fn backend_records_native_size_at_swap() {
        let platform = HeadlessPlatform::new();
        platform.init().unwrap();
        let id = platform
            .create_window(&WindowSpec::standalone("x", 200, 100))
            .unwrap();
        let mut backend =
            HeadlessBackend::init(platform.surface(id).unwrap(), &BackendOptions::default())
                .unwrap();
        let packet = FramePacket {
            logical_size: (200, 100),
            pixels_per_point: 1.0,
            clear_color: [0.0; 4],
            primitives: Vec::new(),
            textures_delta: egui::TexturesDelta::default(),
        };
        backend.render(&packet).unwrap();
        backend.swap_buffers().unwrap();

        let frame = platform.window(id).unwrap().last_frame().unwrap();
        assert_eq!(frame.native_size, (200, 100));
        assert_eq!(frame.physical_size, frame.native_size);
        assert_eq!(frame.thread, thread::current().id());
    }

    #[test]
    fn scripted_swap_failure() {
        let platform = HeadlessPlatform::new();
        platform.init().unwrap();
        let id = platform
            .create_window(&WindowSpec::standalone("x", 10, 10))
            .unwrap();
        let window = platform.window(id).unwrap();
        window.fail_after_frames(1);
        let mut backend =
            HeadlessBackend::init(platform.surface(id).unwrap(), &BackendOptions::default())
                .unwrap();
        let packet = FramePacket {
            logical_size: (10, 10),
            pixels_per_point: 1.0,
            clear_color: [0.0; 4],
            primitives: Vec::new(),
            textures_delta: egui::TexturesDelta::default(),
        };
        backend.render(&packet).unwrap();
        backend.swap_buffers().unwrap();
        backend.render(&packet).unwrap();
        assert!(matches!(backend.swap_buffers(), Err(BackendError::Swap(_))));
        backend.shutdown();
        assert!(window.backend_shut_down());
    }
}
