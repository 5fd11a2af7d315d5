//! OpenGL [`GraphicsBackend`]: glutin context + `egui_glow` painter.
//!
//! Everything here is created on the render thread from the raw handles in
//! a [`NativeSurface`] and stays on that thread until `shutdown`:
//!
//! ```text
//! Display::new ─► find_configs ─► create_context ─► create_window_surface
//!      ─► make_current ─► set_swap_interval ─► glow::Context ─► Painter
//! ```

use std::num::NonZeroU32;
use std::sync::Arc;

use glow::HasContext;
use glutin::config::{Config, ConfigTemplateBuilder};
use glutin::context::{ContextApi, ContextAttributesBuilder, PossiblyCurrentContext};
use glutin::display::{Display, DisplayApiPreference};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use raw_window_handle::RawWindowHandle;
use sonido_editor::{BackendError, BackendOptions, FramePacket, GraphicsBackend, NativeWindowId};

use crate::platform::NativeSurface;

/// GPU side of one native editor window.
pub struct GlowBackend {
    window: NativeWindowId,
    gl: Arc<glow::Context>,
    painter: egui_glow::Painter,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    size: (u32, u32),
}

fn context_error(err: glutin::error::Error) -> BackendError {
    BackendError::Context(err.to_string())
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

#[cfg(target_os = "windows")]
fn display_preference(window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Wgl(Some(window))
}

#[cfg(target_os = "macos")]
fn display_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Cgl
}

#[cfg(all(
    unix,
    not(any(target_os = "macos", target_os = "ios", target_os = "android"))
))]
fn display_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Egl
}

/// Pick the config with the fewest multisample buffers; egui does its own
/// anti-aliasing.
fn pick_config(configs: impl Iterator<Item = Config>) -> Option<Config> {
    configs.min_by_key(|config| config.num_samples())
}

impl GraphicsBackend for GlowBackend {
    type Surface = NativeSurface;

    #[allow(unsafe_code)]
    fn init(surface: NativeSurface, options: &BackendOptions) -> Result<Self, BackendError> {
        let NativeSurface {
            id,
            display,
            window,
            size,
        } = surface;

        // SAFETY: the display and window handles come from a live winit
        // window, and the editor joins this thread before destroying it.
        let display = unsafe { Display::new(display, display_preference(window)) }
            .map_err(context_error)?;

        let template = ConfigTemplateBuilder::new()
            .with_alpha_size(8)
            .compatible_with_native_window(window)
            .build();
        // SAFETY: as above.
        let config = pick_config(unsafe { display.find_configs(template) }.map_err(context_error)?)
            .ok_or_else(|| BackendError::Context("no matching GL config".into()))?;

        let desktop = ContextAttributesBuilder::new().build(Some(window));
        let gles = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::Gles(None))
            .build(Some(window));
        // SAFETY: as above; the config belongs to this display.
        let not_current = unsafe { display.create_context(&config, &desktop) }
            .or_else(|_| unsafe { display.create_context(&config, &gles) })
            .map_err(context_error)?;

        let attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            window,
            non_zero(size.0),
            non_zero(size.1),
        );
        // SAFETY: as above.
        let gl_surface = unsafe { display.create_window_surface(&config, &attributes) }
            .map_err(context_error)?;
        let context = not_current
            .make_current(&gl_surface)
            .map_err(context_error)?;

        let interval = if options.vsync {
            SwapInterval::Wait(NonZeroU32::MIN)
        } else {
            SwapInterval::DontWait
        };
        if let Err(err) = gl_surface.set_swap_interval(&context, interval) {
            tracing::warn!(window = %id, %err, "swap interval not applied");
        }

        // SAFETY: the context was made current on this thread above, and
        // the loader returns entry points of that context.
        let gl = unsafe {
            Arc::new(glow::Context::from_loader_function_cstr(|symbol| {
                display.get_proc_address(symbol)
            }))
        };
        let painter = egui_glow::Painter::new(Arc::clone(&gl), "", None, false)
            .map_err(|err| BackendError::Painter(format!("{err:?}")))?;

        tracing::debug!(window = %id, width = size.0, height = size.1, "GL backend ready");
        Ok(Self {
            window: id,
            gl,
            painter,
            surface: gl_surface,
            context,
            size,
        })
    }

    fn render(&mut self, frame: &FramePacket) -> Result<(), BackendError> {
        if !self.context.is_current() {
            return Err(BackendError::Context(format!(
                "context for {} is not current",
                self.window
            )));
        }

        let (width, height) = frame.physical_size();
        if (width, height) != self.size && width > 0 && height > 0 {
            self.surface
                .resize(&self.context, non_zero(width), non_zero(height));
            self.size = (width, height);
        }

        let [r, g, b, a] = frame.clear_color;
        #[allow(unsafe_code)]
        // SAFETY: the context is current on this thread (checked above).
        unsafe {
            self.gl.viewport(0, 0, width as i32, height as i32);
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }

        self.painter.paint_and_update_textures(
            [width, height],
            frame.pixels_per_point,
            &frame.primitives,
            &frame.textures_delta,
        );
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), BackendError> {
        self.surface
            .swap_buffers(&self.context)
            .map_err(|err| BackendError::Swap(err.to_string()))
    }

    fn shutdown(mut self) {
        self.painter.destroy();
        tracing::debug!(window = %self.window, "GL backend shut down");
    }
}
