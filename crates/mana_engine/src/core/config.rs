//! # Unified Configuration System
//!
//! All configuration structures for the engine core in one place: renderer,
//! asset loading and engine behavior, grouped by [`ApplicationConfig`].
//!
//! Every structure is serde serializable and can be loaded from TOML or RON
//! through the [`Config`] trait.

use serde::{Serialize, Deserialize};

use crate::render::api::MAX_LIGHTS;
use crate::render::primitives::color::ColorRGBA;

pub use crate::config::{Config, ConfigError};

/// # Renderer Configuration
///
/// Settings consumed by the deferred pipeline and its passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// Size of the geometry buffer before the first frame resizes it
    pub initial_size: (i32, i32),
    /// Color the compositor clears the screen with
    pub clear_color: ColorRGBA,
    /// Color drawn into the skybox layer when the scene has no skybox
    pub skybox_color: ColorRGBA,
    /// Maximum number of lights of each type uploaded per draw
    pub max_lights: usize,
    /// Length of the debug normal/tangent/bitangent segments
    pub normal_scale: f32,
    /// Draw debug normals in the debug pass
    pub debug_normals: bool,
    /// Draw light caster gizmos in the debug pass
    pub debug_light_casters: bool,
    /// Reject pass lists whose declared reads are not written by an earlier pass
    pub check_pass_dependencies: bool,
}

impl RendererConfig {
    /// Create a renderer configuration with defaults
    pub fn new() -> Self {
        Self {
            initial_size: (640, 320),
            clear_color: ColorRGBA::new(0, 0, 0, 255),
            skybox_color: ColorRGBA::new(0, 0, 0, 255),
            max_lights: 20,
            normal_scale: 0.1,
            debug_normals: false,
            debug_light_casters: false,
            check_pass_dependencies: true,
        }
    }

    /// Set the initial geometry buffer size
    pub fn with_initial_size(mut self, width: i32, height: i32) -> Self {
        self.initial_size = (width, height);
        self
    }

    /// Set the compositor clear color
    pub fn with_clear_color(mut self, color: ColorRGBA) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the fallback skybox color
    pub fn with_skybox_color(mut self, color: ColorRGBA) -> Self {
        self.skybox_color = color;
        self
    }

    /// Set the per type light limit
    pub fn with_max_lights(mut self, max_lights: usize) -> Self {
        self.max_lights = max_lights;
        self
    }

    /// Toggle the debug overlays
    pub fn with_debug_overlays(mut self, normals: bool, light_casters: bool) -> Self {
        self.debug_normals = normals;
        self.debug_light_casters = light_casters;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_size.0 <= 0 || self.initial_size.1 <= 0 {
            return Err(format!(
                "Initial size must be positive, got {}x{}",
                self.initial_size.0, self.initial_size.1
            ));
        }

        if self.max_lights == 0 || self.max_lights > MAX_LIGHTS {
            return Err(format!("Max lights must be within 1..={MAX_LIGHTS}, got {}", self.max_lights));
        }

        if !self.normal_scale.is_finite() || self.normal_scale <= 0.0 {
            return Err("Normal scale must be a positive number".to_string());
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Engine Configuration
///
/// Core engine behavior shared by every subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Log level for the engine
    pub log_level: String,
    /// Whether to enable debug features
    pub debug_mode: bool,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_mode: cfg!(debug_assertions),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable debug mode
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Asset Configuration
///
/// Configuration for bundle loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssetConfig {
    /// Base directory for assets
    pub assets_dir: String,
    /// Worker threads for bundle decoding, `None` uses the shared pool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_threads: Option<usize>,
    /// File extensions the importer accepts
    pub supported_formats: Vec<String>,
}

impl AssetConfig {
    /// Create a new asset configuration
    pub fn new() -> Self {
        Self {
            assets_dir: "assets".to_string(),
            worker_threads: None,
            supported_formats: vec![
                "json".to_string(),
                "obj".to_string(),
                "png".to_string(),
                "wav".to_string(),
            ],
        }
    }

    /// Set assets directory
    pub fn with_assets_dir(mut self, dir: impl Into<String>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    /// Use a dedicated pool of `threads` workers
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Whether a file extension is accepted
    pub fn supports(&self, extension: &str) -> bool {
        self.supported_formats
            .iter()
            .any(|format| format.eq_ignore_ascii_case(extension))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_threads == Some(0) {
            return Err("Worker thread count must be at least 1".to_string());
        }
        if self.supported_formats.is_empty() {
            return Err("At least one asset format must be supported".to_string());
        }
        Ok(())
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration that encompasses all engine subsystems.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Rendering system configuration
    pub renderer: RendererConfig,
    /// Asset system configuration
    pub assets: AssetConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        self.renderer.validate()?;
        self.assets.validate()?;
        Ok(())
    }

    /// Load from a TOML or RON file and validate the result
    pub fn load_validated(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ApplicationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.renderer.max_lights, 20);
        assert_eq!(config.renderer.initial_size, (640, 320));
    }

    #[test]
    fn test_renderer_validation() {
        assert!(RendererConfig::new().with_max_lights(0).validate().is_err());
        assert!(RendererConfig::new().with_max_lights(MAX_LIGHTS + 1).validate().is_err());
        assert!(RendererConfig::new().with_initial_size(0, 10).validate().is_err());
    }

    #[test]
    fn test_asset_validation() {
        assert!(AssetConfig::new().with_worker_threads(0).validate().is_err());
        assert!(AssetConfig::new().with_worker_threads(2).validate().is_ok());
        assert!(AssetConfig::new().supports("PNG"));
        assert!(!AssetConfig::new().supports("fbx"));
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mana.toml");

        let mut config = ApplicationConfig::default();
        config.renderer = config.renderer.with_debug_overlays(true, false);
        config.engine = config.engine.with_log_level("debug");
        config.save_to_file(&path).unwrap();

        let loaded = ApplicationConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mana.ron");

        let mut config = ApplicationConfig::default();
        config.assets = config.assets.with_assets_dir("data").with_worker_threads(3);
        config.save_to_file(&path).unwrap();

        let loaded = ApplicationConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.assets.assets_dir, "data");
        assert_eq!(loaded.assets.worker_threads, Some(3));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[renderer]\nmax_lights = 8\n").unwrap();

        let loaded = ApplicationConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.renderer.max_lights, 8);
        assert_eq!(loaded.assets, AssetConfig::default());
    }

    #[test]
    fn test_load_validated_rejects_bad_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[renderer]\nmax_lights = 0\n").unwrap();

        let result = ApplicationConfig::load_validated(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mana.yaml");
        let result = ApplicationConfig::default().save_to_file(&path);
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let loaded = ApplicationConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, ApplicationConfig::default());
    }
}
