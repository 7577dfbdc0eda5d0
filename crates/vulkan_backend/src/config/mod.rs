//! Configuration system
//!
//! Settings are plain serde structs stored as TOML or RON. The renderer reads a
//! [`RendererConfig`] once at initialization.

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
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

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings passed once to the renderer at initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance
    pub application_name: String,
    /// Requested screen width in pixels
    pub screen_width: u32,
    /// Requested screen height in pixels
    pub screen_height: u32,
    /// Enable validation layers (debug builds only)
    pub enable_validation: bool,
    /// Clear color of the swapchain pass
    pub clear_color: [f32; 4],
    /// Clear depth of the swapchain pass
    pub clear_depth: f32,
    /// Descriptor sets per shader-program descriptor pool
    pub descriptor_sets_per_pool: u32,
    /// Directory holding compiled SPIR-V shaders
    pub shader_directory: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Vulkan Backend".to_string(),
            screen_width: 1280,
            screen_height: 720,
            enable_validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            descriptor_sets_per_pool: 64,
            shader_directory: "target/shaders".to_string(),
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Create a configuration with the given application name
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    /// Set the requested screen size
    #[must_use]
    pub const fn with_screen_size(mut self, width: u32, height: u32) -> Self {
        self.screen_width = width;
        self.screen_height = height;
        self
    }

    /// Enable or disable validation layers
    #[must_use]
    pub const fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Set the clear color
    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Set the descriptor pool capacity used by shader programs
    #[must_use]
    pub const fn with_descriptor_sets_per_pool(mut self, sets: u32) -> Self {
        self.descriptor_sets_per_pool = sets;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("application_name cannot be empty".to_string()));
        }
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "screen size must be non-zero, got {}x{}",
                self.screen_width, self.screen_height
            )));
        }
        if self.descriptor_sets_per_pool == 0 {
            return Err(ConfigError::Invalid(
                "descriptor_sets_per_pool must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.clear_depth) {
            return Err(ConfigError::Invalid(format!(
                "clear_depth must be within [0, 1], got {}",
                self.clear_depth
            )));
        }
        Ok(())
    }
}
