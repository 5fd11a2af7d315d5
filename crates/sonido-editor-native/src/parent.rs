//! Host parent handles as raw window handles.
//!
//! Plugin hosts pass the parent as a bare integer: an X11 window id on
//! Linux, an `HWND` on Windows, an `NSView*` on macOS. winit wants a
//! [`RawWindowHandle`] for [`with_parent_window`].
//!
//! [`with_parent_window`]: winit::window::WindowAttributes::with_parent_window

use raw_window_handle::RawWindowHandle;
use sonido_editor::ParentHandle;

/// Convert a host parent handle for the current OS.
///
/// Returns `None` for a zero handle, which no host passes for a live window.
#[cfg(all(
    unix,
    not(any(target_os = "macos", target_os = "ios", target_os = "android"))
))]
pub fn raw_parent(parent: ParentHandle) -> Option<RawWindowHandle> {
    use raw_window_handle::XlibWindowHandle;

    if parent.0 == 0 {
        return None;
    }
    let window = std::ffi::c_ulong::try_from(parent.0).ok()?;
    Some(RawWindowHandle::Xlib(XlibWindowHandle::new(window)))
}

/// Convert a host parent handle for the current OS.
///
/// Returns `None` for a zero handle, which no host passes for a live window.
#[cfg(target_os = "windows")]
pub fn raw_parent(parent: ParentHandle) -> Option<RawWindowHandle> {
    use raw_window_handle::Win32WindowHandle;
    use std::num::NonZeroIsize;

    let hwnd = NonZeroIsize::new(isize::try_from(parent.0).ok()?)?;
    Some(RawWindowHandle::Win32(Win32WindowHandle::new(hwnd)))
}

/// Convert a host parent handle for the current OS.
///
/// Returns `None` for a zero handle, which no host passes for a live window.
#[cfg(target_os = "macos")]
pub fn raw_parent(parent: ParentHandle) -> Option<RawWindowHandle> {
    use raw_window_handle::AppKitWindowHandle;
    use std::ffi::c_void;
    use std::ptr::NonNull;

    let ns_view = NonNull::new(parent.0 as *mut c_void)?;
    Some(RawWindowHandle::AppKit(AppKitWindowHandle::new(ns_view)))
}
