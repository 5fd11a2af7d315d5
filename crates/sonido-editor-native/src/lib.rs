//! Native windows for sonido editors: winit + glutin + egui_glow.
//!
//! Plugs the two seams of `sonido-editor` into real OS windows:
//!
//! ```text
//! NativePlatform (host main thread)        GlowBackend (render thread)
//! ──────────────────────────────────       ───────────────────────────
//! winit EventLoop, parked across            glutin Display / Config
//!   terminate → init cycles                 Surface<WindowSurface>
//! Window per editor, embedded with          PossiblyCurrentContext
//!   with_parent_window                      egui_glow::Painter
//! pump_app_events(0) from host idle
//!   → EventTranslator → NativeEvent
//! ```
//!
//! All instances created on one host thread share one
//! [`WindowingSubsystemManager`] through [`shared_subsystem`].
//!
//! This crate needs `unsafe` for raw window handles and GL loading and is
//! kept out of the workspace `default-members`.

pub mod events;
pub mod glow_backend;
pub mod parent;
pub mod platform;

use std::sync::Arc;

use sonido_editor::{EditorConfig, EditorInstance, ParentHandle, WindowingSubsystemManager};

pub use glow_backend::GlowBackend;
pub use platform::{NativePlatform, NativeSurface};

/// An editor instance on native windows.
pub type NativeEditor = EditorInstance<NativePlatform, GlowBackend>;

thread_local! {
    static SUBSYSTEM: Arc<WindowingSubsystemManager<NativePlatform>> =
        Arc::new(WindowingSubsystemManager::new(NativePlatform::new()));
}

/// The windowing subsystem of the calling (host main) thread.
pub fn shared_subsystem() -> Arc<WindowingSubsystemManager<NativePlatform>> {
    SUBSYSTEM.with(Arc::clone)
}

/// Create an editor on the calling thread's shared subsystem.
///
/// `parent` is the host window to embed into; `None` opens a standalone
/// top-level window.
pub fn native_editor(config: EditorConfig, parent: Option<ParentHandle>) -> NativeEditor {
    NativeEditor::new(shared_subsystem(), config, parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_is_shared_per_thread() {
        let a = shared_subsystem();
        let b = shared_subsystem();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.ref_count(), 0);
    }

    #[test]
    fn new_editor_does_not_touch_the_platform() {
        let editor = native_editor(EditorConfig::default(), None);
        assert_eq!(editor.state(), sonido_editor::InstanceState::Created);
        assert!(!shared_subsystem().is_initialized());
    }
}
