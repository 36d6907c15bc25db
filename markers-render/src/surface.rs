/*!
# Bitmap Surfaces

The drawing target a marker layer paints into. Coordinates passed to a
[`Surface`] are device pixels relative to the surface's own top-left corner.

[`RasterSurface`] keeps the pixels in an [`RgbaImage`] so the result can be
inspected in tests or written out as PNG.
*/

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{Pixel, Rgba, RgbaImage};
use markers_core::{Bounds, Point};
use std::path::Path;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Host-side placement of the surface: translate by `offset`, then scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceTransform {
    pub offset: Point,
    pub scale: f64,
}

impl Default for SurfaceTransform {
    fn default() -> Self {
        Self {
            offset: Point::default(),
            scale: 1.0,
        }
    }
}

/// Pixel primitives the render pipeline needs.
pub trait Surface {
    /// Called when the owning layer is attached to a view.
    fn mount(&mut self) {}

    /// Called when the owning layer is detached.
    fn unmount(&mut self) {}

    /// Sets the backing size in device pixels. Contents are unspecified
    /// afterwards; the pipeline always clears after resizing.
    fn resize(&mut self, width: u32, height: u32);

    fn dimensions(&self) -> (u32, u32);

    /// Places the surface's top-left corner at a layer point.
    fn set_position(&mut self, position: Point);

    fn set_transform(&mut self, transform: SurfaceTransform);

    fn clear(&mut self);

    fn clear_rect(&mut self, rect: Bounds);

    /// Restricts subsequent draws to `clip`, or lifts the restriction.
    fn set_clip(&mut self, clip: Option<Bounds>);

    /// Draws `image` scaled into `dest`.
    fn draw_image(&mut self, image: &RgbaImage, dest: Bounds);

    /// Toggles the pointer-over-marker indicator.
    fn set_interactive(&mut self, interactive: bool);
}

/// In-memory RGBA surface.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    canvas: RgbaImage,
    position: Point,
    transform: SurfaceTransform,
    clip: Option<Bounds>,
    interactive: bool,
    mounted: bool,
    draw_calls: usize,
}

impl Default for RasterSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterSurface {
    pub fn new() -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
            position: Point::default(),
            transform: SurfaceTransform::default(),
            clip: None,
            interactive: false,
            mounted: false,
            draw_calls: 0,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn transform(&self) -> SurfaceTransform {
        self.transform
    }

    pub fn clip(&self) -> Option<Bounds> {
        self.clip
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Number of `draw_image` calls since creation.
    pub fn draw_calls(&self) -> usize {
        self.draw_calls
    }

    /// Copies out a `width` x `height` window starting at `(x, y)`.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> RgbaImage {
        imageops::crop_imm(&self.canvas, x, y, width, height).to_image()
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.canvas
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write PNG to {}", path.display()))?;
        log::info!("Exported surface to {}", path.display());
        Ok(())
    }

    /// Integer pixel window of `rect`, intersected with the canvas and clip.
    fn pixel_window(&self, rect: Bounds) -> Option<(u32, u32, u32, u32)> {
        let (width, height) = self.canvas.dimensions();
        let mut area = Bounds::new(0.0, 0.0, width as f64, height as f64);
        if let Some(clip) = self.clip {
            area = Bounds::new(
                area.min_x.max(clip.min_x),
                area.min_y.max(clip.min_y),
                area.max_x.min(clip.max_x),
                area.max_y.min(clip.max_y),
            );
        }
        let x0 = rect.min_x.round().max(area.min_x.round());
        let y0 = rect.min_y.round().max(area.min_y.round());
        let x1 = rect.max_x.round().min(area.max_x.round());
        let y1 = rect.max_y.round().min(area.max_y.round());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

impl Surface for RasterSurface {
    fn mount(&mut self) {
        self.mounted = true;
    }

    fn unmount(&mut self) {
        self.mounted = false;
        self.interactive = false;
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.canvas.dimensions() != (width, height) {
            log::trace!("Resizing surface to {}x{}", width, height);
            self.canvas = RgbaImage::new(width, height);
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    fn set_transform(&mut self, transform: SurfaceTransform) {
        self.transform = transform;
    }

    fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    fn clear_rect(&mut self, rect: Bounds) {
        let Some((x0, y0, x1, y1)) = self.pixel_window(rect) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                self.canvas.put_pixel(x, y, TRANSPARENT);
            }
        }
    }

    fn set_clip(&mut self, clip: Option<Bounds>) {
        self.clip = clip;
    }

    fn draw_image(&mut self, image: &RgbaImage, dest: Bounds) {
        self.draw_calls += 1;

        let origin = dest.min().round();
        let size = dest.size().round();
        if size.x < 1.0 || size.y < 1.0 {
            return;
        }
        let (width, height) = (size.x as u32, size.y as u32);
        let scaled;
        let source = if image.dimensions() == (width, height) {
            image
        } else {
            scaled = imageops::resize(image, width, height, FilterType::Triangle);
            &scaled
        };

        let target = Bounds::new(origin.x, origin.y, origin.x + size.x, origin.y + size.y);
        let Some((x0, y0, x1, y1)) = self.pixel_window(target) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                let sx = (x as f64 - origin.x) as u32;
                let sy = (y as f64 - origin.y) as u32;
                let src = *source.get_pixel(sx, sy);
                if src[3] == 0 {
                    continue;
                }
                self.canvas.get_pixel_mut(x, y).blend(&src);
            }
        }
    }

    fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }
}
