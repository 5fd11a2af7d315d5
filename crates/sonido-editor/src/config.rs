//! Editor window configuration.
//!
//! Loaded from TOML or built in code. Every field has a default, so a
//! config file only needs the keys it wants to change:
//!
//! ```toml
//! title = "Sonido Reverb"
//! width = 640
//! height = 480
//! max_fps = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default editor width in logical pixels.
pub const DEFAULT_WIDTH: u32 = 800;

/// Default editor height in logical pixels.
pub const DEFAULT_HEIGHT: u32 = 600;

/// Errors that can occur while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Values parsed but are inconsistent
    #[error("invalid editor config: {0}")]
    Invalid(String),
}

/// Per-instance editor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Native window title (only visible in standalone mode).
    pub title: String,
    /// Initial width in logical pixels.
    pub width: u32,
    /// Initial height in logical pixels.
    pub height: u32,
    /// Smallest width accepted from the host.
    pub min_width: u32,
    /// Smallest height accepted from the host.
    pub min_height: u32,
    /// Largest width accepted from the host.
    pub max_width: u32,
    /// Largest height accepted from the host.
    pub max_height: u32,
    /// DPI scale factor (physical pixels per logical pixel).
    pub scale: f64,
    /// Straight-alpha RGBA clear color.
    pub clear_color: [f32; 4],
    /// Block buffer swaps on vertical sync.
    pub vsync: bool,
    /// Optional cap on the render loop rate. `None` runs free, bounded only
    /// by buffer swaps.
    pub max_fps: Option<u32>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            title: "Sonido Editor".to_owned(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            min_width: 320,
            min_height: 240,
            max_width: 1920,
            max_height: 1080,
            scale: 1.0,
            clear_color: [0.45, 0.55, 0.60, 1.00],
            vsync: true,
            max_fps: None,
        }
    }
}

impl EditorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check size bounds, scale and frame cap for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_width == 0 || self.min_height == 0 {
            return Err(ConfigError::Invalid("minimum size must be non-zero".into()));
        }
        if self.min_width > self.max_width || self.min_height > self.max_height {
            return Err(ConfigError::Invalid(format!(
                "minimum size {}x{} exceeds maximum size {}x{}",
                self.min_width, self.min_height, self.max_width, self.max_height
            )));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "scale must be positive, got {}",
                self.scale
            )));
        }
        if self.max_fps == Some(0) {
            return Err(ConfigError::Invalid("max_fps must be at least 1".into()));
        }
        Ok(())
    }

    /// Set the initial size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the window title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set or clear the render loop rate cap.
    pub fn with_max_fps(mut self, max_fps: Option<u32>) -> Self {
        self.max_fps = max_fps;
        self
    }

    /// Clamp a requested size to the configured bounds.
    ///
    /// Never panics; with inverted bounds the maximum wins.
    pub fn clamp_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            width.max(self.min_width).min(self.max_width),
            height.max(self.min_height).min(self.max_height),
        )
    }

    /// Initial size after clamping.
    pub fn initial_size(&self) -> (u32, u32) {
        self.clamp_size(self.width, self.height)
    }

    /// Minimum time between frame starts, if a cap is configured.
    pub fn frame_interval(&self) -> Option<Duration> {
        self.max_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)))
    }

    /// Clear color with RGB premultiplied by alpha, as the painter expects.
    pub fn premultiplied_clear_color(&self) -> [f32; 4] {
        let [r, g, b, a] = self.clear_color;
        [r * a, g * a, b * a, a]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = EditorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_size(), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
        assert!(config.vsync);
        assert_eq!(config.frame_interval(), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EditorConfig::from_toml_str(
            r#"
            title = "Sonido Reverb"
            width = 640
            height = 480
            max_fps = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.title, "Sonido Reverb");
        assert_eq!(config.initial_size(), (640, 480));
        assert_eq!(config.frame_interval(), Some(Duration::from_millis(20)));
        assert_eq!(config.max_width, EditorConfig::default().max_width);
    }

    #[test]
    fn inverted_bounds_rejected() {
        let err = EditorConfig::from_toml_str("min_width = 900\nmax_width = 800").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    }

    #[test]
    fn zero_frame_cap_rejected() {
        let err = EditorConfig::from_toml_str("max_fps = 0").unwrap_err();
        assert!(err.to_string().contains("max_fps"), "got: {err}");
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = EditorConfig::from_toml_str("width = \"wide\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn clamp_size_respects_bounds() {
        let config = EditorConfig::default();
        assert_eq!(config.clamp_size(10, 10), (320, 240));
        assert_eq!(config.clamp_size(5000, 5000), (1920, 1080));
        assert_eq!(config.clamp_size(1024, 768), (1024, 768));
    }

    #[test]
    fn clamp_size_with_inverted_bounds_keeps_maximum() {
        let mut config = EditorConfig::default();
        config.min_width = 900;
        config.max_width = 800;
        config.min_height = 2000;
        assert_eq!(config.clamp_size(1024, 768), (800, 1080));
        assert_eq!(config.clamp_size(10, 10), (800, 1080));
    }

    #[test]
    fn clear_color_is_premultiplied() {
        let mut config = EditorConfig::default();
        config.clear_color = [1.0, 0.5, 0.25, 0.5];
        assert_eq!(config.premultiplied_clear_color(), [0.5, 0.25, 0.125, 0.5]);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("editor.toml");
        std::fs::write(&path, "height = 500\nvsync = false").unwrap();
        let config = EditorConfig::load(&path).unwrap();
        assert_eq!(config.height, 500);
        assert!(!config.vsync);
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = EditorConfig::load("/nonexistent/editor.toml").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("failed to read file"), "got: {msg}");
        assert!(msg.contains("/nonexistent/editor.toml"), "got: {msg}");
    }
}
