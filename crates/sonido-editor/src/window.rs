//! Per-instance native window and the state it shares with its render thread.
//!
//! The main thread owns the [`InstanceWindow`]; the render thread only ever
//! sees the [`WindowShared`] half:
//!
//! ```text
//! main thread                    WindowShared                 render thread
//! ───────────                    ────────────                 ─────────────
//! request_close() ──► close_requested: AtomicBool ──► loop condition
//! resize(w, h) ─────► frame_lock ─┐
//!                     size: AtomicSize ─────────────► frame's logical size
//! ```
//!
//! `resize` takes the frame lock while it changes the native size and the
//! logical size, and the render thread holds the same lock from the moment
//! it reads the logical size until its buffer swap returns. A frame
//! therefore never swaps into a native window whose size differs from the
//! size it was laid out at.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::config::EditorConfig;
use crate::error::EditorError;
use crate::lifecycle::InstanceId;
use crate::platform::{NativeWindowId, ParentHandle, Platform, WindowSpec};

// ── Atomic size ──────────────────────────────────────────────────────────────

/// A `(width, height)` pair readable and writable from any thread.
///
/// Both halves live in one `AtomicU64` (width high, height low) so a reader
/// never sees the width of one resize with the height of another.
pub struct AtomicSize(AtomicU64);

impl AtomicSize {
    /// Cell holding `width` × `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self(AtomicU64::new(encode(width, height)))
    }

    /// Replace the size.
    pub fn store(&self, width: u32, height: u32) {
        self.0.store(encode(width, height), Ordering::Release);
    }

    /// Current size.
    pub fn load(&self) -> (u32, u32) {
        let bits = self.0.load(Ordering::Acquire);
        ((bits >> 32) as u32, bits as u32)
    }
}

fn encode(width: u32, height: u32) -> u64 {
    (u64::from(width) << 32) | u64::from(height)
}

// ── Shared window state ──────────────────────────────────────────────────────

/// Window state readable from the render thread.
pub struct WindowShared {
    instance: InstanceId,
    standalone: bool,
    scale: f64,
    close_requested: AtomicBool,
    size: AtomicSize,
    frame_lock: Mutex<()>,
}

impl WindowShared {
    /// Create shared state for a window of the given logical size.
    pub fn new(instance: InstanceId, standalone: bool, scale: f64, width: u32, height: u32) -> Self {
        Self {
            instance,
            standalone,
            scale,
            close_requested: AtomicBool::new(false),
            size: AtomicSize::new(width, height),
            frame_lock: Mutex::new(()),
        }
    }

    /// Owning instance. Used for routing, never to extend its lifetime.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Whether the window is a top-level window with its own close control.
    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    /// Physical pixels per logical pixel.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Ask the render loop to exit after its current frame.
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::Release);
    }

    /// Whether a close has been requested.
    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    /// Current logical size.
    pub fn size(&self) -> (u32, u32) {
        self.size.load()
    }

    /// Hold off size changes until the guard drops.
    pub fn lock_frame(&self) -> MutexGuard<'_, ()> {
        self.frame_lock.lock()
    }
}

/// Scale a logical size to physical pixels.
pub fn physical_size(width: u32, height: u32, scale: f64) -> (u32, u32) {
    (
        (f64::from(width) * scale).round() as u32,
        (f64::from(height) * scale).round() as u32,
    )
}

// ── Instance window ──────────────────────────────────────────────────────────

/// One native window, embedded under a host parent or standalone.
///
/// Must be destroyed only after its render thread has exited. Destruction
/// is idempotent and also runs on drop.
pub struct InstanceWindow<P: Platform> {
    platform: Arc<P>,
    id: NativeWindowId,
    shared: Arc<WindowShared>,
    destroyed: bool,
}

impl<P: Platform> InstanceWindow<P> {
    /// Create the native window for `instance`.
    ///
    /// With a parent the window is undecorated, fixed-size and moved to
    /// (0, 0) inside the parent; some platforms misplace child windows
    /// otherwise. Without one it is a decorated, resizable top-level window.
    pub fn create(
        platform: &Arc<P>,
        instance: InstanceId,
        config: &EditorConfig,
        parent: Option<ParentHandle>,
    ) -> Result<Self, EditorError> {
        let (width, height) = config.initial_size();
        let (pw, ph) = physical_size(width, height, config.scale);
        let spec = match parent {
            Some(parent) => WindowSpec::embedded(config.title.clone(), parent, pw, ph),
            None => WindowSpec::standalone(config.title.clone(), pw, ph),
        };

        let id = platform
            .create_window(&spec)
            .map_err(EditorError::WindowCreation)?;
        if spec.is_embedded() {
            platform.set_window_pos(id, 0, 0);
        }

        tracing::debug!(
            %instance,
            window = %id,
            width,
            height,
            embedded = spec.is_embedded(),
            "native window created"
        );

        Ok(Self {
            platform: Arc::clone(platform),
            id,
            shared: Arc::new(WindowShared::new(
                instance,
                !spec.is_embedded(),
                config.scale,
                width,
                height,
            )),
            destroyed: false,
        })
    }

    /// Native window id.
    pub fn id(&self) -> NativeWindowId {
        self.id
    }

    /// State shared with the render thread and the event router.
    pub fn shared(&self) -> &Arc<WindowShared> {
        &self.shared
    }

    /// Render surface for the render thread's graphics backend.
    pub fn surface(&self) -> Option<P::Surface> {
        if self.destroyed {
            return None;
        }
        self.platform.surface(self.id)
    }

    /// Resize the native window and the logical display size together.
    pub fn resize(&self, width: u32, height: u32) {
        if self.destroyed {
            return;
        }
        let _frame = self.shared.lock_frame();
        let (pw, ph) = physical_size(width, height, self.shared.scale());
        self.platform.set_window_size(self.id, pw, ph);
        self.shared.size.store(width, height);
    }

    /// Set the close-requested flag. The render loop exits cooperatively.
    pub fn request_close(&self) {
        self.shared.request_close();
    }

    /// Whether [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Release the native window. A second call is a no-op.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.platform.destroy_window(self.id);
        tracing::debug!(instance = %self.shared.instance(), window = %self.id, "native window destroyed");
    }
}

impl<P: Platform> Drop for InstanceWindow<P> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::HeadlessPlatform;
    use crate::platform::Platform as _;

    fn platform() -> Arc<HeadlessPlatform> {
        let platform = Arc::new(HeadlessPlatform::new());
        platform.init().unwrap();
        platform
    }

    #[test]
    fn atomic_size_keeps_both_halves() {
        let size = AtomicSize::new(800, 600);
        assert_eq!(size.load(), (800, 600));
        size.store(u32::MAX, 1);
        assert_eq!(size.load(), (u32::MAX, 1));
    }

    #[test]
    fn embedded_window_is_placed_at_origin() {
        let platform = platform();
        let window = InstanceWindow::create(
            &platform,
            InstanceId::next(),
            &EditorConfig::default(),
            Some(ParentHandle(0x50)),
        )
        .unwrap();

        let native = platform.window(window.id()).unwrap();
        assert_eq!(native.position(), (0, 0));
        assert!(!native.spec().decorated);
        assert!(!native.spec().resizable);
        assert_eq!(native.spec().parent, Some(ParentHandle(0x50)));
        assert!(!window.shared().is_standalone());
    }

    #[test]
    fn standalone_window_is_decorated() {
        let platform = platform();
        let config = EditorConfig::default().with_size(640, 480);
        let window = InstanceWindow::create(&platform, InstanceId::next(), &config, None).unwrap();
        let native = platform.window(window.id()).unwrap();
        assert!(native.spec().decorated);
        assert!(native.spec().resizable);
        assert_eq!(platform.window_size(window.id()), Some((640, 480)));
        assert!(window.shared().is_standalone());
    }

    #[test]
    fn invalid_parent_fails_creation() {
        let platform = platform();
        let result = InstanceWindow::create(
            &platform,
            InstanceId::next(),
            &EditorConfig::default(),
            Some(ParentHandle(0)),
        );
        assert!(matches!(result, Err(EditorError::WindowCreation(_))));
        assert_eq!(platform.window_count(), 0);
    }

    #[test]
    fn resize_updates_native_and_logical_size() {
        let platform = platform();
        let mut config = EditorConfig::default();
        config.scale = 2.0;
        let window =
            InstanceWindow::create(&platform, InstanceId::next(), &config, Some(ParentHandle(1)))
                .unwrap();
        assert_eq!(platform.window_size(window.id()), Some((1600, 1200)));

        window.resize(1024, 768);
        assert_eq!(window.shared().size(), (1024, 768));
        assert_eq!(platform.window_size(window.id()), Some((2048, 1536)));
    }

    #[test]
    fn destroy_is_idempotent() {
        let platform = platform();
        let mut window = InstanceWindow::create(
            &platform,
            InstanceId::next(),
            &EditorConfig::default(),
            Some(ParentHandle(1)),
        )
        .unwrap();
        window.destroy();
        window.destroy();
        assert!(window.is_destroyed());
        assert!(window.surface().is_none());
        assert_eq!(platform.window_count(), 0);
        drop(window);
        assert_eq!(platform.window_count(), 0);
    }

    #[test]
    fn request_close_is_visible_through_shared_state() {
        let platform = platform();
        let window = InstanceWindow::create(
            &platform,
            InstanceId::next(),
            &EditorConfig::default(),
            Some(ParentHandle(1)),
        )
        .unwrap();
        let shared = Arc::clone(window.shared());
        assert!(!shared.close_requested());
        window.request_close();
        assert!(shared.close_requested());
    }
}
