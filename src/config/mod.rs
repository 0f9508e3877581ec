//! Configuration module for the trace viewer engine
//!
//! This module holds the tunables of every component in one serde
//! structure, [`ViewerConfig`], read from and written to TOML. Persisting
//! the file is up to the embedding application; this module only provides
//! the (de)serialization and validation.
//!
//! # Example
//!
//! ```ignore
//! use tracevis_rs::config::ViewerConfig;
//!
//! let config = ViewerConfig::from_toml_str(r#"
//!     [cache]
//!     budget_bytes = 67108864
//!
//!     [interaction]
//!     default_label = "BAD_blink"
//! "#)?;
//! assert_eq!(config.cache.block_points, 1024);
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, ViewerError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ViewerConfig {
    /// LOD cache and fetch pool
    #[serde(default)]
    pub cache: CacheSettings,

    /// Viewport defaults and row layout
    #[serde(default)]
    pub view: ViewSettings,

    /// Input handling
    #[serde(default)]
    pub interaction: InteractionSettings,

    /// Annotation store
    #[serde(default)]
    pub annotations: AnnotationSettings,
}

impl ViewerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ViewerConfig = toml::from_str(content)
            .map_err(|e| ViewerError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ViewerError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load a config file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load viewer config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Serialize to a TOML document
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ViewerError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Save as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ViewerError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| {
            ViewerError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        if cache.block_points < 2 || !cache.block_points.is_power_of_two() {
            return Err(ViewerError::Config(format!(
                "cache.block_points must be a power of two >= 2, got {}",
                cache.block_points
            )));
        }
        if cache.channels_per_block == 0 {
            return Err(ViewerError::Config(
                "cache.channels_per_block must be positive".to_string(),
            ));
        }
        if cache.queue_depth == 0 {
            return Err(ViewerError::Config(
                "cache.queue_depth must be positive".to_string(),
            ));
        }

        let view = &self.view;
        if !(view.initial_duration > 0.0) {
            return Err(ViewerError::Config(format!(
                "view.initial_duration must be positive, got {}",
                view.initial_duration
            )));
        }
        if view.initial_channels == 0 {
            return Err(ViewerError::Config(
                "view.initial_channels must be positive".to_string(),
            ));
        }
        if view.clipping_rows.is_some_and(|c| !(c > 0.0)) {
            return Err(ViewerError::Config(
                "view.clipping_rows must be positive when set".to_string(),
            ));
        }

        let input = &self.interaction;
        if !(input.zoom_step > 1.0) || !(input.scale_step > 1.0) {
            return Err(ViewerError::Config(
                "interaction.zoom_step and scale_step must be greater than 1".to_string(),
            ));
        }
        if !(input.pan_fraction > 0.0) || !(input.drag_zoom_px > 0.0) {
            return Err(ViewerError::Config(
                "interaction.pan_fraction and drag_zoom_px must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
