//! Command implementations for the markers CLI

pub mod hit;
pub mod render;

use anyhow::{Context, Result};
use markers_core::{FileImageSource, ImageCache, StaticMapView};
use markers_render::{CanvasMarkerLayer, Layer, RasterSurface};
use std::path::Path;

use crate::config::Config;
use crate::input;

pub type CliLayer = CanvasMarkerLayer<StaticMapView, RasterSurface>;

/// Builds a layer over the configured view and loads every marker in `markers`.
/// Icon paths resolve relative to the marker file.
pub fn build_layer(config: &Config, markers: &Path) -> Result<CliLayer> {
    let grouped = input::load_markers(markers)?;

    let icon_root = markers
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let images = ImageCache::new(FileImageSource::with_root(icon_root));
    let mut layer = CanvasMarkerLayer::new(config.layer.clone(), RasterSurface::new(), images)
        .context("Invalid layer options")?;

    for (group, batch) in grouped {
        let report = layer.add_many(batch, group.clone());
        if !report.rejected.is_empty() {
            log::warn!("Group {}: skipped {} invalid markers", group, report.rejected.len());
        }
    }

    layer.mount(config.view.build());
    Ok(layer)
}
