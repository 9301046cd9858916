//! Configuration system
//!
//! Stage tuning lives in [`StageConfig`]; any config type can be loaded from
//! or saved to TOML and RON files through the [`Config`] trait.

pub use serde::{Serialize, Deserialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;

        // Try different formats
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

        std::fs::write(path, contents).map_err(ConfigError::Io)
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

    /// A value parsed but is out of range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Spatial index tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Initial root center
    pub center: [f32; 3],
    /// Initial root cell edge length; the root doubles when items fall outside
    pub size: f32,
    /// Cells are never subdivided below this edge length
    pub min_node_size: f32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0, 0.0],
            size: 10.0,
            min_node_size: 0.5,
        }
    }
}

/// Instance batch buffer sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Slots allocated when a batch is created
    pub initial_capacity: usize,
    /// Slots added each time a batch outgrows its buffers
    pub growth_headroom: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 10,
            growth_headroom: 100,
        }
    }
}

/// Raycast behavior for pointer/reticle queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaycastConfig {
    /// Stop at the nearest hit instead of collecting every hit
    pub first_hit_only: bool,
}

impl Default for RaycastConfig {
    fn default() -> Self {
        Self { first_hit_only: true }
    }
}

/// Top-level stage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Spatial index settings
    pub spatial: SpatialConfig,
    /// Batch buffer settings
    pub batching: BatchConfig,
    /// Raycast settings
    pub raycast: RaycastConfig,
}

impl Config for StageConfig {}

impl StageConfig {
    /// Reject values the stage cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batching.growth_headroom == 0 {
            return Err(ConfigError::Invalid {
                field: "batching.growth_headroom",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.spatial.size.is_finite() && self.spatial.size > 0.0) {
            return Err(ConfigError::Invalid {
                field: "spatial.size",
                reason: format!("must be a positive number, got {}", self.spatial.size),
            });
        }
        if !(self.spatial.min_node_size.is_finite() && self.spatial.min_node_size > 0.0) {
            return Err(ConfigError::Invalid {
                field: "spatial.min_node_size",
                reason: format!("must be a positive number, got {}", self.spatial.min_node_size),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StageConfig::default();
        assert_eq!(config.batching.initial_capacity, 10);
        assert_eq!(config.batching.growth_headroom, 100);
        assert!(config.raycast.first_hit_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: StageConfig = toml::from_str("[batching]\ngrowth_headroom = 32\n").unwrap();
        assert_eq!(config.batching.growth_headroom, 32);
        assert_eq!(config.batching.initial_capacity, 10);
        assert_eq!(config.spatial.size, 10.0);
    }

    #[test]
    fn test_ron_roundtrip_through_file() {
        let path = std::env::temp_dir().join(format!("stage_config_{}.ron", std::process::id()));
        let path = path.to_string_lossy().to_string();
        let mut config = StageConfig::default();
        config.raycast.first_hit_only = false;
        config.save_to_file(&path).unwrap();
        let loaded = StageConfig::load_from_file(&path).unwrap();
        assert!(!loaded.raycast.first_hit_only);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_zero_headroom_rejected() {
        let mut config = StageConfig::default();
        config.batching.growth_headroom = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "batching.growth_headroom", .. })));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        assert!(matches!(
            StageConfig::load_from_file("stage.yaml"),
            Err(ConfigError::Io(_)) | Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
