//! TOML configuration.
//!
//! Every field has a default, so a missing file or a partial file is valid:
//!
//! ```toml
//! [window]
//! width = 1600
//! height = 900
//!
//! [renderer]
//! validation = true
//! samples = 4
//! shadow_map_size = 4096
//! shader_dir = "shaders/spirv"
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//!
//! [scene]
//! space_radius = 60.0
//! camera_speed = 12.0
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Highest sample count Vulkan can express.
const MAX_SAMPLES: u32 = 64;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub scene: SceneConfig,
}

/// Initial window parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Deferred Renderer".to_string(),
        }
    }
}

/// GPU-side parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// Enable the Khronos validation layer
    pub validation: bool,
    /// Samples per pixel for the geometry and final passes; capped at what
    /// the device supports
    pub samples: u32,
    /// Edge length of the square shadow map
    pub shadow_map_size: u32,
    /// Directory holding compiled SPIR-V modules
    pub shader_dir: PathBuf,
    /// Clear color of the final composite pass
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            samples: 1,
            shadow_map_size: 4096,
            shader_dir: PathBuf::from("shaders/spirv"),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Demo scene parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Half extent of the orthographic light volume
    pub space_radius: f32,
    /// Camera movement speed in units per second
    pub camera_speed: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            space_radius: 60.0,
            camera_speed: 12.0,
        }
    }
}

impl Config {
    /// Parse configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// contains unusable values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load configuration from a file, using defaults if it does not exist.
    ///
    /// A file that exists but is invalid is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        let samples = self.renderer.samples;
        if !samples.is_power_of_two() || samples > MAX_SAMPLES {
            return Err(Error::Config(format!(
                "samples must be a power of two up to {}, got {}",
                MAX_SAMPLES, samples
            )));
        }
        if self.renderer.shadow_map_size == 0 {
            return Err(Error::Config("shadow_map_size must be non-zero".to_string()));
        }
        if self.scene.space_radius <= 0.0 {
            return Err(Error::Config("space_radius must be positive".to_string()));
        }
        Ok(())
    }
}
