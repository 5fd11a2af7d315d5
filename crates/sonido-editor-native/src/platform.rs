//! [`Platform`] on winit.
//!
//! winit owns exactly one event loop per process and refuses to build a
//! second one, while the editor subsystem initializes and terminates the
//! windowing library every time its reference count crosses zero. The loop
//! is therefore built once per thread and parked in a thread-local on
//! `terminate`; the next `init` on the same thread takes it back.
//!
//! The host never hands its main loop to us. Events are pulled with
//! [`pump_app_events`] and a zero timeout from the host's `idle` call,
//! collected, and only delivered to the sink after every borrow of the
//! platform state has ended, so a sink that re-enters the platform (a host
//! close callback destroying a window) is fine.
//!
//! [`pump_app_events`]: winit::platform::pump_events::EventLoopExtPumpEvents::pump_app_events

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use sonido_editor::platform::{ErrorCallback, codes};
use sonido_editor::{NativeEvent, NativeWindowId, Platform, PlatformError, WindowSpec};
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::error::EventLoopError;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::events::EventTranslator;
use crate::parent::raw_parent;

thread_local! {
    static PARKED_LOOP: RefCell<Option<EventLoop<()>>> = const { RefCell::new(None) };
}

/// Handles a render thread needs to create a GL surface on a window.
///
/// Only valid while the window exists. The editor destroys a window after
/// joining its render thread, so a surface never outlives its window.
pub struct NativeSurface {
    /// Window the handles belong to.
    pub id: NativeWindowId,
    /// Display connection of the window.
    pub display: RawDisplayHandle,
    /// The window itself.
    pub window: RawWindowHandle,
    /// Client-area size in physical pixels when the surface was taken.
    pub size: (u32, u32),
}

#[allow(unsafe_code)]
// SAFETY: the raw handles are plain identifiers (X11 ids, HWND, NSView
// pointers). The render thread only passes them to the GL display and
// surface constructors while the owning window is alive, which the editor
// guarantees by joining the render thread before destroying the window.
unsafe impl Send for NativeSurface {}

struct NativeWindow {
    window: Window,
    translator: EventTranslator,
}

#[derive(Default)]
struct State {
    event_loop: Option<EventLoop<()>>,
    windows: HashMap<NativeWindowId, NativeWindow>,
    ids: HashMap<WindowId, NativeWindowId>,
    next_id: u64,
}

/// winit-backed windowing library. Lives on the host's main thread.
#[derive(Default)]
pub struct NativePlatform {
    state: RefCell<State>,
    error_callback: RefCell<Option<ErrorCallback>>,
}

impl NativePlatform {
    /// Create an uninitialized platform.
    pub fn new() -> Self {
        Self::default()
    }

    fn report(&self, code: i32, message: impl Into<String>) -> PlatformError {
        let error = PlatformError::new(code, message);
        if let Some(callback) = self.error_callback.borrow().as_ref() {
            callback(error.code, &error.message);
        }
        error
    }

    fn with_window<R>(&self, id: NativeWindowId, f: impl FnOnce(&Window) -> R) -> Option<R> {
        let state = self.state.borrow();
        state.windows.get(&id).map(|entry| f(&entry.window))
    }
}

fn build_event_loop() -> Result<EventLoop<()>, EventLoopError> {
    let mut builder = EventLoop::builder();
    #[cfg(all(
        unix,
        not(any(target_os = "macos", target_os = "ios", target_os = "android"))
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        // Host parent windows on Linux are X11 windows.
        builder.with_x11().with_any_thread(true);
    }
    #[cfg(target_os = "windows")]
    {
        use winit::platform::windows::EventLoopBuilderExtWindows;
        builder.with_any_thread(true);
    }
    builder.build()
}

impl Platform for NativePlatform {
    type Surface = NativeSurface;

    fn set_error_callback(&self, callback: ErrorCallback) {
        *self.error_callback.borrow_mut() = Some(callback);
    }

    fn init(&self) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        if state.event_loop.is_some() {
            return Ok(());
        }
        let event_loop = match PARKED_LOOP.with(|parked| parked.borrow_mut().take()) {
            Some(event_loop) => event_loop,
            None => build_event_loop().map_err(|err| {
                self.report(codes::PLATFORM_ERROR, format!("event loop: {err}"))
            })?,
        };
        state.event_loop = Some(event_loop);
        tracing::debug!("winit event loop ready");
        Ok(())
    }

    fn terminate(&self) {
        let mut state = self.state.borrow_mut();
        state.ids.clear();
        let windows = state.windows.len();
        state.windows.clear();
        if windows > 0 {
            tracing::warn!(windows, "terminate destroyed windows still open");
        }
        if let Some(event_loop) = state.event_loop.take() {
            PARKED_LOOP.with(|parked| *parked.borrow_mut() = Some(event_loop));
        }
    }

    fn create_window(&self, spec: &WindowSpec) -> Result<NativeWindowId, PlatformError> {
        let mut attributes = Window::default_attributes()
            .with_title(spec.title.as_str())
            .with_inner_size(PhysicalSize::new(spec.width, spec.height))
            .with_decorations(spec.decorated)
            .with_resizable(spec.resizable);

        if let Some(parent) = spec.parent {
            let Some(raw) = raw_parent(parent) else {
                return Err(self.report(
                    codes::INVALID_VALUE,
                    format!("invalid parent handle {:#x}", parent.0),
                ));
            };
            #[allow(unsafe_code)]
            // SAFETY: the host guarantees its parent window outlives the
            // editor window, which is destroyed in `close` at the latest.
            let embedded = unsafe { attributes.with_parent_window(Some(raw)) };
            attributes = embedded;
        }

        let mut state = self.state.borrow_mut();
        let Some(event_loop) = state.event_loop.as_ref() else {
            drop(state);
            return Err(self.report(codes::NOT_INITIALIZED, "windowing library not initialized"));
        };
        #[allow(deprecated)]
        let created = event_loop.create_window(attributes);
        let window = match created {
            Ok(window) => window,
            Err(err) => {
                drop(state);
                return Err(self.report(codes::PLATFORM_ERROR, format!("create window: {err}")));
            }
        };

        state.next_id += 1;
        let id = NativeWindowId(state.next_id);
        state.ids.insert(window.id(), id);
        state.windows.insert(
            id,
            NativeWindow {
                window,
                translator: EventTranslator::default(),
            },
        );
        tracing::debug!(window = %id, embedded = spec.is_embedded(), "native window created");
        Ok(id)
    }

    fn set_window_pos(&self, id: NativeWindowId, x: i32, y: i32) {
        self.with_window(id, |window| {
            window.set_outer_position(PhysicalPosition::new(x, y));
        });
    }

    fn set_window_size(&self, id: NativeWindowId, width: u32, height: u32) {
        self.with_window(id, |window| {
            // Applied asynchronously on some platforms; the return value is
            // only the immediate size where the OS resizes synchronously.
            let _ = window.request_inner_size(PhysicalSize::new(width, height));
        });
    }

    fn window_size(&self, id: NativeWindowId) -> Option<(u32, u32)> {
        self.with_window(id, |window| {
            let size = window.inner_size();
            (size.width, size.height)
        })
    }

    fn surface(&self, id: NativeWindowId) -> Option<NativeSurface> {
        let result = self.with_window(id, |window| {
            let display = window.display_handle().map(|handle| handle.as_raw());
            let raw = window.window_handle().map(|handle| handle.as_raw());
            let size = window.inner_size();
            match (display, raw) {
                (Ok(display), Ok(raw)) => Ok(NativeSurface {
                    id,
                    display,
                    window: raw,
                    size: (size.width, size.height),
                }),
                (Err(err), _) | (_, Err(err)) => Err(err),
            }
        })?;
        match result {
            Ok(surface) => Some(surface),
            Err(err) => {
                self.report(codes::PLATFORM_ERROR, format!("window handles: {err}"));
                None
            }
        }
    }

    fn destroy_window(&self, id: NativeWindowId) {
        let removed = {
            let mut state = self.state.borrow_mut();
            let removed = state.windows.remove(&id);
            if let Some(entry) = &removed {
                state.ids.remove(&entry.window.id());
            }
            removed
        };
        if removed.is_some() {
            tracing::debug!(window = %id, "native window destroyed");
        }
    }

    fn poll_events(&self, sink: &mut dyn FnMut(NativeWindowId, NativeEvent)) {
        let mut pending = Vec::new();
        let status = {
            let mut state = self.state.borrow_mut();
            let State {
                event_loop,
                windows,
                ids,
                ..
            } = &mut *state;
            let Some(event_loop) = event_loop.as_mut() else {
                return;
            };
            let mut pump = Pump {
                windows,
                ids,
                pending: &mut pending,
            };
            event_loop.pump_app_events(Some(Duration::ZERO), &mut pump)
        };
        if let PumpStatus::Exit(code) = status {
            self.report(codes::PLATFORM_ERROR, format!("event loop exited with {code}"));
        }
        for (id, event) in pending {
            sink(id, event);
        }
    }
}

/// Event handler for one pump: translates and buffers window events.
struct Pump<'a> {
    windows: &'a mut HashMap<NativeWindowId, NativeWindow>,
    ids: &'a HashMap<WindowId, NativeWindowId>,
    pending: &'a mut Vec<(NativeWindowId, NativeEvent)>,
}

impl ApplicationHandler for Pump<'_> {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(&id) = self.ids.get(&window_id) else {
            return;
        };
        let Some(entry) = self.windows.get_mut(&id) else {
            return;
        };
        let pending = &mut *self.pending;
        entry
            .translator
            .translate(event, |native| pending.push((id, native)));
    }
}
