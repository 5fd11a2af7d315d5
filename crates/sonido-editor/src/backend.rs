//! Graphics backend seam.
//!
//! A [`GraphicsBackend`] owns everything GPU-side for one editor window: the
//! native graphics context, the painter and its textures. It is created,
//! used and shut down on the window's render thread only, so it never needs
//! to be `Send`.
//!
//! Per frame the render thread hands it a [`FramePacket`] (already
//! tessellated egui output) followed by a buffer swap:
//!
//! ```text
//! egui::Context::run ─► tessellate ─► FramePacket ─► render() ─► swap_buffers()
//! ```

use thiserror::Error;

use crate::platform::NativeWindowId;

/// One tessellated egui frame, ready to paint.
pub struct FramePacket {
    /// Window size in logical pixels at the time the UI was laid out.
    pub logical_size: (u32, u32),
    /// Physical pixels per logical pixel.
    pub pixels_per_point: f32,
    /// Premultiplied RGBA clear color.
    pub clear_color: [f32; 4],
    /// Paint primitives produced by `egui::Context::tessellate`.
    pub primitives: Vec<egui::ClippedPrimitive>,
    /// Texture uploads and frees for this frame.
    pub textures_delta: egui::TexturesDelta,
}

impl FramePacket {
    /// Viewport size in physical pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        let (w, h) = self.logical_size;
        let ppp = self.pixels_per_point;
        (
            (w as f32 * ppp).round() as u32,
            (h as f32 * ppp).round() as u32,
        )
    }
}

/// Options applied when the backend is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
    /// Wait for vertical sync on every swap (swap interval 1).
    pub vsync: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self { vsync: true }
    }
}

/// Errors raised by a graphics backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The window has no usable render surface (destroyed or never created).
    #[error("no render surface for {0}")]
    SurfaceUnavailable(NativeWindowId),

    /// The native graphics context could not be created or made current.
    #[error("graphics context error: {0}")]
    Context(String),

    /// The painter (shaders, buffers) could not be created.
    #[error("painter error: {0}")]
    Painter(String),

    /// Presenting the frame failed.
    #[error("buffer swap failed: {0}")]
    Swap(String),
}

/// GPU side of an editor window.
pub trait GraphicsBackend: Sized + 'static {
    /// Surface type produced by the matching [`Platform`](crate::Platform).
    type Surface: Send + 'static;

    /// Create the graphics context on the calling thread and make it current.
    fn init(surface: Self::Surface, options: &BackendOptions) -> Result<Self, BackendError>;

    /// Clear and paint one frame.
    fn render(&mut self, frame: &FramePacket) -> Result<(), BackendError>;

    /// Present the painted frame.
    fn swap_buffers(&mut self) -> Result<(), BackendError>;

    /// Release GPU resources. Called on the render thread before the
    /// window is destroyed.
    fn shutdown(self);
}
