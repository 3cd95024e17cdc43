//! matte configuration system
//!
//! This crate provides centralized configuration management for matte,
//! loading settings from `matte.toml` as an alternative to environment
//! variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for matte
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MatteConfig {
    /// Compositing backend settings
    pub rendering: RenderingConfig,
    /// Playback synchronization settings
    pub playback: PlaybackConfig,
}

/// Compositing backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderingConfig {
    /// Backend to use: "auto", "gpu-modern", "gpu-legacy", or "software"
    pub backend: String,
    /// Log per-frame layout and composite timings at debug level
    pub debug_timing: bool,
    /// Initial surface width in pixels, before the host reports a layout
    pub width: u32,
    /// Initial surface height in pixels
    pub height: u32,
}

/// Playback synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Seconds added to every demanded media time (positive shows
    /// subtitles later)
    pub time_offset: f64,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            backend: "auto".to_string(),
            debug_timing: false,
            width: 1280,
            height: 720,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { time_offset: 0.0 }
    }
}

impl MatteConfig {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the matte.toml configuration file
    ///
    /// # Returns
    /// * `Ok(MatteConfig)` - Successfully loaded configuration
    /// * `Err(String)` - Error message if loading failed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Load configuration from the default location (matte.toml in the
    /// current directory) or return default configuration if file doesn't exist
    pub fn load_or_default() -> Self {
        Self::load_from_file("matte.toml").unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file values.
    /// This allows for temporary overrides without modifying the config file.
    pub fn merge_with_env(&mut self) {
        if let Ok(backend) = std::env::var("MATTE_BACKEND") {
            self.rendering.backend = backend;
        }
        if let Ok(val) = std::env::var("MATTE_DEBUG_TIMING") {
            self.rendering.debug_timing = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("MATTE_WIDTH") {
            if let Ok(width) = val.parse::<u32>() {
                self.rendering.width = width;
            }
        }
        if let Ok(val) = std::env::var("MATTE_HEIGHT") {
            if let Ok(height) = val.parse::<u32>() {
                self.rendering.height = height;
            }
        }
        if let Ok(val) = std::env::var("MATTE_TIME_OFFSET") {
            if let Ok(offset) = val.parse::<f64>() {
                self.playback.time_offset = offset;
            }
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// This is the recommended way to load configuration:
    /// 1. Load from matte.toml (or use defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MatteConfig::default();
        assert_eq!(config.rendering.backend, "auto");
        assert!(!config.rendering.debug_timing);
        assert_eq!(config.rendering.width, 1280);
        assert_eq!(config.rendering.height, 720);
        assert_eq!(config.playback.time_offset, 0.0);
    }

    #[test]
    fn test_toml_serialization() {
        let config = MatteConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: MatteConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.rendering.backend, "auto");
        assert_eq!(parsed.rendering.width, 1280);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let parsed: MatteConfig = toml::from_str(
            r#"
            [rendering]
            backend = "software"

            [playback]
            time_offset = -0.25
            "#,
        )
        .unwrap();
        assert_eq!(parsed.rendering.backend, "software");
        assert_eq!(parsed.rendering.width, 1280);
        assert!(!parsed.rendering.debug_timing);
        assert_eq!(parsed.playback.time_offset, -0.25);
    }

    #[test]
    fn test_load_or_default() {
        // Should not panic even if matte.toml doesn't exist
        let config = MatteConfig::load_or_default();
        assert_eq!(config.rendering.backend, "auto");
    }

    #[test]
    fn test_merge_with_env() {
        // Set environment variable
        unsafe {
            std::env::set_var("MATTE_BACKEND", "gpu-legacy");
            std::env::set_var("MATTE_DEBUG_TIMING", "true");
            std::env::set_var("MATTE_TIME_OFFSET", "0.75");
        }

        let mut config = MatteConfig::default();
        config.merge_with_env();

        assert_eq!(config.rendering.backend, "gpu-legacy");
        assert!(config.rendering.debug_timing);
        assert_eq!(config.playback.time_offset, 0.75);

        // Clean up
        unsafe {
            std::env::remove_var("MATTE_BACKEND");
            std::env::remove_var("MATTE_DEBUG_TIMING");
            std::env::remove_var("MATTE_TIME_OFFSET");
        }
    }
}
