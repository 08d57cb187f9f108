//! # Headless Configuration
//!
//! Configuration for context creation: which backends to probe and in which
//! order, validation layers, and per-backend knobs. Every structure round
//! trips through TOML and RON via the [`Config`] trait.

use crate::api::Backend;
pub use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        match extension(path) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match extension(path) {
            Some("toml") => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Configuration parsed but is not usable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which flavour of GL the EGL backend asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlFlavor {
    /// OpenGL ES
    Gles,
    /// Desktop OpenGL
    OpenGl,
}

/// # GL Configuration
///
/// Context version requested from EGL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlConfig {
    /// API flavour
    pub flavor: GlFlavor,
    /// Requested (major, minor) version
    pub version: (u8, u8),
}

impl Default for GlConfig {
    fn default() -> Self {
        Self {
            flavor: GlFlavor::Gles,
            version: (3, 0),
        }
    }
}

/// # Direct3D 12 Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct D3d12Config {
    /// Fall back to the WARP software adapter when no hardware adapter
    /// supports feature level 12.0
    pub allow_software_adapter: bool,
}

impl Default for D3d12Config {
    fn default() -> Self {
        Self {
            allow_software_adapter: true,
        }
    }
}

/// # Headless Context Configuration
///
/// The factory walks [`HeadlessConfig::backends`] in order and keeps the
/// first backend that constructs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessConfig {
    /// Application name reported to drivers that accept one (Vulkan)
    pub application_name: String,
    /// Backend preference order
    pub backends: Vec<Backend>,
    /// Whether to enable API validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Log filter used by tools that initialize logging from this config
    pub log_level: String,
    /// GL/EGL settings
    pub gl: GlConfig,
    /// Direct3D 12 settings
    pub d3d12: D3d12Config,
}

impl HeadlessConfig {
    /// Create a configuration with the platform's default backend order
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            backends: default_backend_order(),
            enable_validation: None,
            log_level: "info".to_string(),
            gl: GlConfig::default(),
            d3d12: D3d12Config::default(),
        }
    }

    /// Replace the backend preference order
    #[must_use]
    pub fn with_backends(mut self, backends: impl IntoIterator<Item = Backend>) -> Self {
        self.backends = backends.into_iter().collect();
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the log filter
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set GL settings
    #[must_use]
    pub fn with_gl(mut self, gl: GlConfig) -> Self {
        self.gl = gl;
        self
    }

    /// Whether validation layers should be requested
    ///
    /// Enabled in debug builds unless configured explicitly.
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if self.backends.is_empty() {
            return Err(ConfigError::Invalid("At least one backend must be listed".to_string()));
        }

        for (index, backend) in self.backends.iter().enumerate() {
            if self.backends[..index].contains(backend) {
                return Err(ConfigError::Invalid(format!("Backend {backend} is listed twice")));
            }
        }

        if self.gl.version.0 == 0 {
            return Err(ConfigError::Invalid("GL major version must be at least 1".to_string()));
        }

        Ok(())
    }
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self::new("gpu_headless")
    }
}

impl Config for HeadlessConfig {}

/// The platform's preferred backend order
pub fn default_backend_order() -> Vec<Backend> {
    if cfg!(target_vendor = "apple") {
        vec![Backend::Metal]
    } else if cfg!(windows) {
        vec![Backend::D3d12, Backend::Vulkan, Backend::Gl]
    } else {
        vec![Backend::Vulkan, Backend::Gl]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("gpu_headless_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_default_is_valid() {
        let config = HeadlessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backends, default_backend_order());
    }

    #[test]
    fn test_validation_rejects_bad_configs() {
        let empty = HeadlessConfig::default().with_backends([]);
        assert!(matches!(empty.validate(), Err(ConfigError::Invalid(_))));

        let duplicate = HeadlessConfig::default().with_backends([Backend::Gl, Backend::Vulkan, Backend::Gl]);
        let error = duplicate.validate().unwrap_err();
        assert!(error.to_string().contains("listed twice"));

        let unnamed = HeadlessConfig::new("");
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_explicit_validation_overrides_build_type() {
        assert!(HeadlessConfig::default().with_validation(true).validation_enabled());
        assert!(!HeadlessConfig::default().with_validation(false).validation_enabled());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let path = temp_path("config.toml");
        let config = HeadlessConfig::new("config_test")
            .with_backends([Backend::Gl, Backend::Vulkan])
            .with_validation(true)
            .with_gl(GlConfig {
                flavor: GlFlavor::OpenGl,
                version: (4, 5),
            });

        config.save_to_file(&path).unwrap();
        let loaded = HeadlessConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_file_round_trip() {
        let path = temp_path("config.ron");
        let config = HeadlessConfig::new("config_test").with_backends([Backend::Metal]);

        config.save_to_file(&path).unwrap();
        let loaded = HeadlessConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: HeadlessConfig = toml::from_str("backends = [\"vulkan\"]").unwrap();
        assert_eq!(config.backends, vec![Backend::Vulkan]);
        assert_eq!(config.gl, GlConfig::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_unsupported_extension() {
        let result = HeadlessConfig::default().save_to_file(temp_path("config.yaml"));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
