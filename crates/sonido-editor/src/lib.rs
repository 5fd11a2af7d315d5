//! Embeddable, thread-isolated egui editor windows for sonido plugins.
//!
//! A plugin host owns the top-level window, calls the editor's lifecycle
//! hooks on its main thread and may load any number of plugin instances
//! into one process. This crate gives every instance its own native window,
//! its own render thread and its own egui context, and keeps the ambient
//! state of the windowing library (initialization, event polling) and of
//! the rendering library (the "current context") from leaking between
//! instances or between the two threads of one instance.
//!
//! # Architecture
//!
//! ```text
//! host main thread                         render thread (one per instance)
//! ────────────────                         ───────────────────────────────
//! EditorInstance::open ──► SubsystemLease   create + activate RenderContext
//!                     └──► InstanceWindow   GraphicsBackend::init(surface)
//!                     └──► spawn ─────────► install input on router
//! EditorInstance::idle ──► poll_events      loop until close requested:
//!        │                                    frame lock → activate → run UI
//!        ▼                                    → tessellate → paint → swap
//! EventCallbackRouter::dispatch             uninstall input, backend
//!   activate owner's context ─► input::*    shutdown, destroy context
//! EditorInstance::close ─► request close ─► join ─► destroy window ─► release
//! ```
//!
//! The windowing library is abstracted by [`Platform`], the GPU path by
//! [`GraphicsBackend`]. [`platform::headless`] implements both in memory;
//! `sonido-editor-native` implements them with winit, glutin and egui_glow.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sonido_editor::platform::headless::{HeadlessBackend, HeadlessPlatform};
//! use sonido_editor::{EditorConfig, EditorInstance, ParentHandle, WindowingSubsystemManager};
//!
//! let subsystem = Arc::new(WindowingSubsystemManager::new(HeadlessPlatform::new()));
//! let config = EditorConfig::default().with_max_fps(Some(120));
//!
//! let mut editor: EditorInstance<HeadlessPlatform, HeadlessBackend> =
//!     EditorInstance::new(Arc::clone(&subsystem), config, Some(ParentHandle(0x2a)))
//!         .with_ui(|ctx| {
//!             egui::CentralPanel::default().show(ctx, |ui| ui.label("hello"));
//!         });
//!
//! editor.open().unwrap();
//! editor.idle();
//! editor.size_changed(1024, 768);
//! editor.close();
//! assert_eq!(subsystem.ref_count(), 0);
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod input;
pub mod lifecycle;
pub mod platform;
pub mod render_thread;
pub mod router;
pub mod subsystem;
pub mod window;

pub use backend::{BackendError, BackendOptions, FramePacket, GraphicsBackend};
pub use config::{ConfigError, EditorConfig};
pub use context::{Activation, ContextError, ContextHandle, RenderContext, RenderContextRegistry};
pub use error::{EditorError, Severity};
pub use lifecycle::{EditorInstance, InstanceId, InstanceState, PARAM_HEIGHT, PARAM_WIDTH};
pub use platform::{
    MouseButton, NativeEvent, NativeWindowId, ParentHandle, Platform, PlatformError, WindowSpec,
};
pub use render_thread::{BuildFn, RenderJob, RenderThreadController, ThreadState, UiFn};
pub use router::{EventCallbackRouter, HostNotify};
pub use subsystem::{SubsystemLease, WindowingSubsystemManager};
pub use window::{AtomicSize, InstanceWindow, WindowShared};

/// Re-exported so hosts can describe UI content without a direct egui dependency.
pub use egui;
