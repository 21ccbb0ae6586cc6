//! Engine configuration, loaded from TOML.
//!
//! Every field has a default, so an empty or partial file is valid:
//!
//! ```toml
//! [window]
//! title = "Vulkan Engine"
//! width = 720
//! height = 405
//!
//! [frame]
//! fence_timeout_ns = 1_000_000_000
//! wait_for_present_idle = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub vulkan: VulkanConfig,
    pub frame: FrameConfig,
    pub descriptors: DescriptorConfig,
    pub shaders: ShaderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Engine".to_string(),
            width: 720,
            height: 405,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulkanConfig {
    /// Khronos validation layer plus debug messenger.
    pub enable_validation: bool,
    /// MAILBOX when available, FIFO otherwise.
    pub prefer_mailbox: bool,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            prefer_mailbox: true,
        }
    }
}

/// Frame pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub fence_timeout_ns: u64,
    pub acquire_timeout_ns: u64,
    /// Wait for the queue to go idle after every present.
    pub wait_for_present_idle: bool,
    /// Sleep between loop iterations while minimized.
    pub suspended_sleep_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            fence_timeout_ns: 1_000_000_000,
            acquire_timeout_ns: 1_000_000_000,
            wait_for_present_idle: true,
            suspended_sleep_ms: 100,
        }
    }
}

impl FrameConfig {
    #[inline]
    pub fn suspended_sleep(&self) -> Duration {
        Duration::from_millis(self.suspended_sleep_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    pub max_sets: u32,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self { max_sets: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// SPIR-V for the background compute pass.
    pub background_compute: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            background_compute: PathBuf::from("shaders/gradient.comp.spv"),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content, path)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when it is missing or invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {:?}, using defaults", path);
            return Self::default();
        }

        Self::load(path).unwrap_or_else(|e| {
            warn!("{}; using defaults", e);
            Self::default()
        })
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.descriptors.max_sets == 0 {
            return Err(Error::Config("descriptors.max_sets must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<EngineConfig> {
        EngineConfig::from_toml_str(content, Path::new("test.toml"))
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = parse("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.window.width, 720);
        assert_eq!(config.window.height, 405);
        assert_eq!(config.frame.fence_timeout_ns, 1_000_000_000);
        assert_eq!(config.descriptors.max_sets, 10);
        assert!(config.frame.wait_for_present_idle);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = parse(
            r#"
            [window]
            width = 1280

            [frame]
            wait_for_present_idle = false
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 405);
        assert_eq!(config.window.title, "Vulkan Engine");
        assert!(!config.frame.wait_for_present_idle);
        assert_eq!(config.frame.suspended_sleep(), Duration::from_millis(100));
    }

    #[test]
    fn test_shader_path() {
        let config = parse(
            r#"
            [shaders]
            background_compute = "assets/sky.comp.spv"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.shaders.background_compute,
            PathBuf::from("assets/sky.comp.spv")
        );
    }

    #[test]
    fn test_invalid_toml_names_file() {
        let err = parse("[window\nwidth = 1").unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
        assert!(err.to_string().contains("test.toml"));
    }

    #[test]
    fn test_zero_extent_rejected() {
        let err = parse("[window]\nheight = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_max_sets_rejected() {
        assert!(parse("[descriptors]\nmax_sets = 0").is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = EngineConfig::load_or_default("definitely/not/here/vk_engine.toml");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = EngineConfig::load("definitely/not/here/vk_engine.toml").unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }

    #[test]
    fn test_serialized_defaults_parse_back() {
        let text = toml::to_string(&EngineConfig::default()).unwrap();
        assert_eq!(parse(&text).unwrap(), EngineConfig::default());
    }
}
