//! Error taxonomy and the diagnostic channel.
//!
//! Host ABIs offer no typed error return for UI lifecycle calls, so every
//! failure is also reported as a severity-tagged `tracing` event through
//! [`EditorError::report`]. Nothing in this crate retries: native windowing
//! and graphics failures are not transient.

use std::sync::Arc;

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::context::ContextError;
use crate::lifecycle::InstanceId;
use crate::platform::PlatformError;

/// Severity tag attached to every reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// An input or request was dropped; the instance keeps working.
    Warning,
    /// A call was rejected; the instance keeps working.
    Error,
    /// The instance (or its session) is unusable until closed.
    Fatal,
}

/// Errors produced by the editor subsystem.
#[derive(Debug, Clone, Error)]
pub enum EditorError {
    /// The instance's configuration is inconsistent; nothing was acquired.
    #[error("editor configuration rejected: {0}")]
    Config(#[source] Arc<ConfigError>),

    /// The windowing library could not be initialized (e.g. no display server).
    #[error("windowing subsystem failed to initialize: {0}")]
    SubsystemInit(#[source] PlatformError),

    /// The native window could not be created (e.g. invalid parent handle).
    #[error("native window creation failed: {0}")]
    WindowCreation(#[source] PlatformError),

    /// The render thread could not create its context or graphics backend.
    #[error("render context or backend initialization failed: {0}")]
    ContextOrBackendInit(#[source] BackendError),

    /// A frame failed mid-session; the render thread has exited.
    #[error("render loop failed: {0}")]
    RenderLoop(#[source] BackendError),

    /// The OS refused to spawn the render thread.
    #[error("failed to spawn render thread: {0}")]
    ThreadSpawn(#[source] Arc<std::io::Error>),

    /// The render thread panicked instead of returning.
    #[error("render thread panicked")]
    ThreadPanicked,

    /// Window-system events were polled off the subsystem's main thread.
    #[error("window events must be polled on the thread that initialized the subsystem")]
    WrongThread,

    /// A render context operation was rejected.
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl EditorError {
    /// Severity of this failure.
    pub fn severity(&self) -> Severity {
        match self {
            EditorError::Config(_)
            | EditorError::SubsystemInit(_)
            | EditorError::WindowCreation(_)
            | EditorError::ContextOrBackendInit(_)
            | EditorError::RenderLoop(_)
            | EditorError::ThreadSpawn(_)
            | EditorError::ThreadPanicked => Severity::Fatal,
            EditorError::WrongThread => Severity::Error,
            EditorError::Context(_) => Severity::Warning,
        }
    }

    /// Emit this error on the diagnostic channel, tagged with its severity.
    pub fn report(&self, instance: InstanceId) {
        let severity = self.severity();
        match severity {
            Severity::Fatal | Severity::Error => {
                tracing::error!(%instance, ?severity, error = %self, "editor failure");
            }
            Severity::Warning => {
                tracing::warn!(%instance, ?severity, error = %self, "editor warning");
            }
        }
    }
}

impl From<ConfigError> for EditorError {
    fn from(err: ConfigError) -> Self {
        EditorError::Config(Arc::new(err))
    }
}

impl From<std::io::Error> for EditorError {
    fn from(err: std::io::Error) -> Self {
        EditorError::ThreadSpawn(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn lifecycle_failures_are_fatal() {
        let platform = PlatformError::new(1, "no display");
        assert_eq!(
            EditorError::SubsystemInit(platform.clone()).severity(),
            Severity::Fatal
        );
        assert_eq!(
            EditorError::WindowCreation(platform).severity(),
            Severity::Fatal
        );
        assert_eq!(
            EditorError::RenderLoop(BackendError::Swap("lost".into())).severity(),
            Severity::Fatal
        );
    }

    #[test]
    fn wrong_thread_is_not_fatal() {
        assert_eq!(EditorError::WrongThread.severity(), Severity::Error);
        assert!(EditorError::WrongThread.severity() < Severity::Fatal);
    }

    #[test]
    fn window_creation_exposes_platform_source() {
        let err = EditorError::WindowCreation(PlatformError::new(0x10004, "invalid parent"));
        let msg = err.to_string();
        assert!(msg.contains("native window creation failed"), "got: {msg}");
        assert!(msg.contains("invalid parent"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn io_error_becomes_thread_spawn() {
        let err: EditorError =
            std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no stack").into();
        assert!(matches!(err, EditorError::ThreadSpawn(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn rejected_config_is_fatal() {
        let err = EditorError::from(ConfigError::Invalid("scale must be positive".into()));
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(err.to_string().contains("scale must be positive"));
        assert!(err.source().is_some());
    }

    #[test]
    fn context_error_is_transparent() {
        let err = EditorError::from(ContextError::NotActive);
        assert_eq!(err.to_string(), ContextError::NotActive.to_string());
        assert_eq!(err.severity(), Severity::Warning);
    }
}
