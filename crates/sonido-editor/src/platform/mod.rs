//! Windowing library abstraction.
//!
//! [`Platform`] is the seam between the editor and a native windowing
//! library. It mirrors the small surface an embedded plugin editor needs:
//! process-wide init and terminate, child window creation under a host
//! parent, size and position control, and a main-thread event pump that
//! reports every event tagged with the window it belongs to.
//!
//! Implementations are process-global in spirit: one `Platform` value is
//! shared by every editor instance through
//! [`WindowingSubsystemManager`](crate::WindowingSubsystemManager), which
//! owns the reference count that gates `init` and `terminate`.
//!
//! Two implementations exist: [`headless::HeadlessPlatform`] (in memory,
//! used by tests and CI) and `NativePlatform` in `sonido-editor-native`.

pub mod headless;

use std::fmt;

use keyboard_types::{Key, Modifiers};
use thiserror::Error;

/// Opaque identifier of a native window, unique for the platform's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeWindowId(pub u64);

impl fmt::Display for NativeWindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// Host-provided parent window handle (HWND, X11 window, NSView pointer).
///
/// Only passed through to the windowing library, never dereferenced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParentHandle(pub usize);

/// Parameters for [`Platform::create_window`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    /// Window title.
    pub title: String,
    /// Initial width in physical pixels.
    pub width: u32,
    /// Initial height in physical pixels.
    pub height: u32,
    /// Host parent; `None` creates a top-level (standalone) window.
    pub parent: Option<ParentHandle>,
    /// Draw OS decorations (title bar, borders).
    pub decorated: bool,
    /// Let the user resize the window.
    pub resizable: bool,
}

impl WindowSpec {
    /// Undecorated, fixed-size child window of `parent`.
    pub fn embedded(title: impl Into<String>, parent: ParentHandle, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            parent: Some(parent),
            decorated: false,
            resizable: false,
        }
    }

    /// Decorated, resizable top-level window.
    pub fn standalone(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            parent: None,
            decorated: true,
            resizable: true,
        }
    }

    /// Whether the window is parented into a host window.
    pub fn is_embedded(&self) -> bool {
        self.parent.is_some()
    }
}

/// Mouse button reported by the windowing library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Primary button.
    Left,
    /// Secondary button.
    Right,
    /// Wheel button.
    Middle,
    /// Any extra button, by native index.
    Other(u16),
}

/// A native input or window event, already attributed to one window.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    /// A character was typed.
    Char(char),
    /// The cursor entered (`true`) or left (`false`) the window.
    CursorEnter(bool),
    /// A mouse button changed state.
    MouseButton {
        /// Which button.
        button: MouseButton,
        /// `true` on press, `false` on release.
        pressed: bool,
        /// Modifier keys held at the time.
        modifiers: Modifiers,
    },
    /// Scroll wheel motion, in lines.
    Scroll {
        /// Horizontal lines.
        x: f32,
        /// Vertical lines.
        y: f32,
    },
    /// A key changed state.
    Key {
        /// Logical key.
        key: Key,
        /// Platform scancode, when known.
        scancode: Option<u32>,
        /// `true` on press, `false` on release.
        pressed: bool,
        /// OS key repeat.
        repeat: bool,
        /// Modifier keys held at the time.
        modifiers: Modifiers,
    },
    /// Cursor position in physical pixels, relative to the window origin.
    CursorPos {
        /// Horizontal position.
        x: f64,
        /// Vertical position.
        y: f64,
    },
    /// The window gained (`true`) or lost (`false`) keyboard focus.
    Focus(bool),
    /// The user asked to close the window (standalone windows only).
    CloseRequested,
}

/// Error codes shared by platform implementations.
pub mod codes {
    /// The library was used before `init`.
    pub const NOT_INITIALIZED: i32 = 0x0001_0001;
    /// An argument (e.g. the parent handle) was rejected.
    pub const INVALID_VALUE: i32 = 0x0001_0004;
    /// The OS or display server refused the request.
    pub const PLATFORM_ERROR: i32 = 0x0001_0008;
}

/// Failure reported by the windowing library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code:#x})")]
pub struct PlatformError {
    /// Library-specific error code (see [`codes`]).
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl PlatformError {
    /// Create an error from a code and description.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Callback receiving every error the windowing library reports, including
/// ones raised inside calls that also return a `Result`.
pub type ErrorCallback = Box<dyn Fn(i32, &str) + Send + Sync>;

/// A native windowing library.
///
/// Every method except [`surface`](Self::surface) is called only from the
/// thread that initialized the subsystem. Implementations need not be
/// `Send` or `Sync`; the editor never moves them between threads.
pub trait Platform: 'static {
    /// What a render thread needs to attach a graphics context to a window.
    type Surface: Send + 'static;

    /// Install the error callback. Called before [`init`](Self::init).
    fn set_error_callback(&self, callback: ErrorCallback);

    /// Initialize the library.
    fn init(&self) -> Result<(), PlatformError>;

    /// Release every library resource. Windows still open are destroyed.
    fn terminate(&self);

    /// Create a window. Size is in physical pixels.
    fn create_window(&self, spec: &WindowSpec) -> Result<NativeWindowId, PlatformError>;

    /// Move a window, relative to its parent when embedded.
    fn set_window_pos(&self, id: NativeWindowId, x: i32, y: i32);

    /// Resize a window's client area, in physical pixels.
    fn set_window_size(&self, id: NativeWindowId, width: u32, height: u32);

    /// Current client-area size in physical pixels, `None` if the window is gone.
    fn window_size(&self, id: NativeWindowId) -> Option<(u32, u32)>;

    /// A render surface for the window, handed to the render thread.
    fn surface(&self, id: NativeWindowId) -> Option<Self::Surface>;

    /// Destroy a window. Unknown ids are ignored.
    fn destroy_window(&self, id: NativeWindowId);

    /// Drain pending events, invoking `sink` once per event.
    fn poll_events(&self, sink: &mut dyn FnMut(NativeWindowId, NativeEvent));
}
