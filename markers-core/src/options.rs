//! Layer options

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Tuning knobs for a canvas marker layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerOptions {
    /// How far the drawn area extends past the view, relative to its size
    /// (0.1 draws an extra 10% in each direction)
    pub padding: f64,

    /// Mutations-per-marker ratio at which the geo index is repacked
    pub rebuild_ratio: f64,

    /// Device pixels per CSS pixel
    pub pixel_ratio: f64,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            padding: 0.1,
            rebuild_ratio: 0.1,
            pixel_ratio: 1.0,
        }
    }
}

impl LayerOptions {
    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.padding.is_finite() || self.padding < 0.0 {
            return Err(ConfigError::InvalidOption {
                name: "padding",
                value: self.padding.to_string(),
            });
        }
        if !self.rebuild_ratio.is_finite() || self.rebuild_ratio <= 0.0 {
            return Err(ConfigError::InvalidOption {
                name: "rebuild_ratio",
                value: self.rebuild_ratio.to_string(),
            });
        }
        if !self.pixel_ratio.is_finite() || self.pixel_ratio < 1.0 {
            return Err(ConfigError::InvalidOption {
                name: "pixel_ratio",
                value: self.pixel_ratio.to_string(),
            });
        }
        Ok(())
    }
}
