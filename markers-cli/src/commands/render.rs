//! Render command implementation - draw a marker file onto a PNG

use anyhow::{Context, Result};
use image::{imageops, ImageFormat, Rgba, RgbaImage};
use markers_core::{MapView, Point};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{build_layer, CliLayer};
use crate::config::Config;
use crate::error::{parse_color, CliError};

#[derive(Debug, Serialize)]
pub struct RenderReport {
    pub markers: usize,
    pub visible: usize,
    pub drawn: usize,
    pub width: u32,
    pub height: u32,
    pub output: PathBuf,
}

pub fn execute(config: &Config, markers: PathBuf, output: PathBuf) -> Result<RenderReport> {
    log::info!("Starting marker rendering");
    log::info!("Input markers: {}", markers.display());
    log::info!("Output file: {}", output.display());

    let background = parse_color(&config.output.background)?;
    let mut layer = build_layer(config, &markers)?;

    let applied = layer.wait_for_image_loads(Duration::from_secs(config.output.load_timeout_secs));
    log::debug!("Applied {} icon loads", applied);
    if layer.images().loads_in_flight() > 0 {
        log::warn!(
            "{} icons still loading after {}s; their markers are left out",
            layer.images().loads_in_flight(),
            config.output.load_timeout_secs
        );
    }

    let image = compose(&layer, background)?;
    save_png(&image, &output)?;

    let store = layer.store().ok_or_else(|| CliError::rendering("layer has no marker store"))?;
    let report = RenderReport {
        markers: store.total(),
        visible: store.visible_len(),
        drawn: layer.surface().draw_calls(),
        width: image.width(),
        height: image.height(),
        output,
    };
    log::info!(
        "Rendered {} of {} markers ({} draws)",
        report.visible,
        report.markers,
        report.drawn
    );
    Ok(report)
}

/// Crops the visible container out of the padded surface and lays it over
/// the background.
fn compose(layer: &CliLayer, background: [u8; 4]) -> Result<RgbaImage> {
    let view = layer.view().ok_or_else(|| CliError::rendering("layer is not mounted"))?;
    let frame = layer
        .pipeline()
        .frame()
        .ok_or_else(|| CliError::rendering("layer has not been drawn"))?;
    let pixel_ratio = layer.options().pixel_ratio;

    let origin = (view.container_point_to_layer_point(Point::default()) - frame.pixel_bounds.min()) * pixel_ratio;
    let origin = origin.round();
    let size = view.size() * pixel_ratio;
    let (width, height) = (size.x.round() as u32, size.y.round() as u32);

    let visible = layer
        .surface()
        .crop(origin.x.max(0.0) as u32, origin.y.max(0.0) as u32, width, height);

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba(background));
    imageops::overlay(&mut canvas, &visible, 0, 0);
    Ok(canvas)
}

fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to write PNG: {}", path.display()))?;
    log::info!("Saved {}x{} image to {}", image.width(), image.height(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use markers_core::Crs;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_fixture(dir: &TempDir) -> Result<PathBuf> {
        RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255]))
            .save_with_format(dir.path().join("dot.png"), ImageFormat::Png)?;

        let markers = dir.path().join("markers.json");
        let mut file = std::fs::File::create(&markers)?;
        // Container points (20, 20) and (200, 200) on a 100x100 plane
        file.write_all(
            br#"[
                {"lat": 80, "lng": 20, "icon": {"url": "dot.png", "size": [10, 10]}},
                {"lat": -100, "lng": 200, "icon": {"url": "dot.png", "size": [10, 10]}}
            ]"#,
        )?;
        Ok(markers)
    }

    fn plane_config() -> Config {
        let mut config = Config::default();
        config.view.crs = Crs::Simple;
        config.view.width = 100;
        config.view.height = 100;
        config.view.center_lat = 50.0;
        config.view.center_lng = 50.0;
        config.view.zoom = 0.0;
        config.output.background = "#000000".to_string();
        config
    }

    #[test]
    fn test_render_places_visible_markers() -> Result<()> {
        let dir = TempDir::new()?;
        let markers = write_fixture(&dir)?;
        let output = dir.path().join("out.png");

        let report = execute(&plane_config(), markers, output.clone())?;
        assert_eq!(report.markers, 2);
        assert_eq!(report.visible, 1);
        assert_eq!((report.width, report.height), (100, 100));

        let rendered = image::open(&output)?.to_rgba8();
        assert_eq!(rendered.dimensions(), (100, 100));
        assert_eq!(*rendered.get_pixel(20, 20), Rgba([0, 0, 255, 255]));
        assert_eq!(*rendered.get_pixel(50, 50), Rgba([0, 0, 0, 255]));
        Ok(())
    }

    #[test]
    fn test_render_rejects_bad_background() -> Result<()> {
        let dir = TempDir::new()?;
        let markers = write_fixture(&dir)?;
        let mut config = plane_config();
        config.output.background = "blue".to_string();

        assert!(execute(&config, markers, dir.path().join("out.png")).is_err());
        Ok(())
    }
}
