//! Configuration handling for the markers CLI
//!
//! Supports loading configuration from markers.toml files with CLI argument overrides.

use anyhow::{Context, Result};
use markers_core::{Crs, LatLng, LayerOptions, StaticMapView};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "markers.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub layer: LayerOptions,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Projection used to place markers
    #[serde(default)]
    pub crs: Crs,

    /// Viewport width in CSS pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// Viewport height in CSS pixels
    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default)]
    pub center_lat: f64,

    #[serde(default)]
    pub center_lng: f64,

    #[serde(default = "default_zoom")]
    pub zoom: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Background color as #rrggbb or #rrggbbaa; empty for transparent
    #[serde(default = "default_background")]
    pub background: String,

    /// How long to wait for icon files to decode
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,
}

fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_zoom() -> f64 { 2.0 }
fn default_background() -> String { "#ffffff".to_string() }
fn default_load_timeout() -> u64 { 30 }

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            crs: Crs::default(),
            width: default_width(),
            height: default_height(),
            center_lat: 0.0,
            center_lng: 0.0,
            zoom: default_zoom(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            background: default_background(),
            load_timeout_secs: default_load_timeout(),
        }
    }
}

impl ViewConfig {
    pub fn center(&self) -> LatLng {
        LatLng::new(self.center_lat, self.center_lng)
    }

    pub fn build(&self) -> StaticMapView {
        StaticMapView::new(
            self.crs,
            self.width as f64,
            self.height as f64,
            self.center(),
            self.zoom,
        )
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    log::info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
                    Self::load_from_file(&default_path)?
                } else {
                    log::info!("Using default configuration");
                    Self::default()
                }
            }
        };

        config
            .layer
            .validate()
            .context("Invalid [layer] configuration")?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to serialize default configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.layer.padding, 0.1);
        assert_eq!(config.view.width, 800);
        assert_eq!(config.view.crs, Crs::WebMercator);
        assert_eq!(config.output.background, "#ffffff");
    }

    #[test]
    fn test_config_roundtrip() -> Result<()> {
        let mut config = Config::default();
        config.view.crs = Crs::Simple;
        config.layer.pixel_ratio = 2.0;
        let temp_file = NamedTempFile::new()?;

        config.save_to_file(temp_file.path())?;
        let loaded = Config::load_from_file(temp_file.path())?;

        assert_eq!(loaded.view.crs, Crs::Simple);
        assert_eq!(loaded.layer.pixel_ratio, 2.0);
        assert_eq!(loaded.view.height, config.view.height);

        Ok(())
    }

    #[test]
    fn test_partial_file_fills_defaults() -> Result<()> {
        let config: Config = toml::from_str("[view]\nzoom = 5.0\ncrs = \"simple\"\n")?;
        assert_eq!(config.view.zoom, 5.0);
        assert_eq!(config.view.crs, Crs::Simple);
        assert_eq!(config.view.width, 800);
        assert_eq!(config.layer.rebuild_ratio, 0.1);
        Ok(())
    }

    #[test]
    fn test_invalid_layer_options_are_rejected() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        std::fs::write(temp_file.path(), "[layer]\npadding = -1.0\n")?;
        assert!(Config::load(Some(temp_file.path())).is_err());
        Ok(())
    }

    #[test]
    fn test_example_toml_generation() -> Result<()> {
        let example = Config::example_toml()?;
        assert!(example.contains("[layer]"));
        assert!(example.contains("[view]"));
        assert!(example.contains("[output]"));
        Ok(())
    }
}
