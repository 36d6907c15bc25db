/*!
# Viewport Render Pipeline

Recomputes the padded viewport, culls the geo index against it, rebuilds the
screen index and paints the visible markers through the icon cache.

One redraw walks `Idle -> Recomputing -> Clearing -> Drawing -> Idle`. The
surface covers the view plus `padding` of its size on every side, so small
pans can be shown by the host without waiting for a redraw.

A redraw either clears the whole surface or, when only a known region went
stale and the padded frame has not moved, clears and repaints that region
alone.
*/

use crate::surface::{Surface, SurfaceTransform};
use markers_core::{
    Bitmap, Bounds, ImageCache, IndexedEntry, LatLng, LatLngBounds, MapView, MarkerEntry, MarkerRef,
    MarkerStore, Point,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderState {
    #[default]
    Idle,
    Recomputing,
    Clearing,
    Drawing,
}

/// Placement of the surface computed at the start of a redraw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    /// Padded area in layer points; `min` is the surface's top-left
    pub pixel_bounds: Bounds,
    pub center: LatLng,
    pub zoom: f64,
}

/// What a redraw did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RedrawSummary {
    /// Markers inside the padded viewport
    pub visible: usize,
    /// Markers painted immediately
    pub drawn: usize,
    /// Markers waiting on their icon
    pub queued: usize,
    /// Only a dirty region was cleared and repainted
    pub partial: bool,
    /// The geo index was repacked first
    pub repacked: bool,
    /// The redraw was deferred because another one was running
    pub deferred: bool,
}

/// Paints one marker whose device-pixel top-left is `origin`.
pub fn paint_marker<S: Surface + ?Sized>(
    surface: &mut S,
    marker: &MarkerRef,
    origin: Point,
    bitmap: &Bitmap,
    pixel_ratio: f64,
) {
    let Some(icon) = marker.icon() else {
        return;
    };
    let size = Point::from(icon.size) * pixel_ratio;
    surface.draw_image(bitmap, Bounds::from_corners(origin, origin + size));
}

pub struct RenderPipeline {
    padding: f64,
    pixel_ratio: f64,
    state: RenderState,
    frame: Option<FrameGeometry>,
    dirty_region: Option<Bounds>,
    redraw_requested: bool,
    transform: SurfaceTransform,
}

impl RenderPipeline {
    pub fn new(padding: f64, pixel_ratio: f64) -> Self {
        Self {
            padding,
            pixel_ratio,
            state: RenderState::Idle,
            frame: None,
            dirty_region: None,
            redraw_requested: false,
            transform: SurfaceTransform::default(),
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn frame(&self) -> Option<&FrameGeometry> {
        self.frame.as_ref()
    }

    pub fn transform(&self) -> SurfaceTransform {
        self.transform
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn padding(&self) -> f64 {
        self.padding
    }

    pub fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    pub fn redraw_pending(&self) -> bool {
        self.redraw_requested
    }

    /// Marks a container-space box as stale. Regions accumulate until the
    /// next redraw.
    pub fn mark_dirty(&mut self, region: Bounds) {
        self.dirty_region = Some(match self.dirty_region {
            Some(existing) => existing.extend(&region),
            None => region,
        });
    }

    pub fn dirty_region(&self) -> Option<Bounds> {
        self.dirty_region
    }

    /// Forgets the frame, the dirty region and any pending request.
    pub fn reset(&mut self) {
        self.state = RenderState::Idle;
        self.frame = None;
        self.dirty_region = None;
        self.redraw_requested = false;
        self.transform = SurfaceTransform::default();
    }

    /// Runs one full pipeline pass.
    pub fn redraw<V, S>(
        &mut self,
        view: &V,
        store: &mut MarkerStore,
        images: &mut ImageCache,
        surface: &mut S,
    ) -> RedrawSummary
    where
        V: MapView + ?Sized,
        S: Surface + ?Sized,
    {
        if self.state != RenderState::Idle {
            log::trace!("Redraw requested during {:?}; deferring", self.state);
            self.redraw_requested = true;
            return RedrawSummary {
                deferred: true,
                ..RedrawSummary::default()
            };
        }
        self.redraw_requested = false;

        self.transition(RenderState::Recomputing);
        let previous = self.frame;
        let frame = self.update_frame(view);
        let pixel_bounds = frame.pixel_bounds;
        let device = pixel_bounds.size() * self.pixel_ratio;
        surface.resize(device.x.round() as u32, device.y.round() as u32);
        surface.set_position(pixel_bounds.min());
        self.update_transform(view, frame.center, frame.zoom, surface);

        self.transition(RenderState::Clearing);
        let frame_unchanged = previous.map_or(false, |prev| {
            prev.pixel_bounds == frame.pixel_bounds && prev.zoom == frame.zoom
        });
        let region = self
            .dirty_region
            .take()
            .filter(|_| frame_unchanged)
            .map(|container| self.container_to_device(view, &frame, container).round_out());
        match region {
            Some(device_region) => {
                surface.clear_rect(device_region);
                surface.set_clip(Some(device_region));
            }
            None => {
                surface.clear();
                images.discard_pending();
            }
        }

        self.transition(RenderState::Drawing);
        let mut summary = RedrawSummary {
            partial: region.is_some(),
            repacked: store.maintain(),
            ..RedrawSummary::default()
        };

        let geo_query = padded_geo_bounds(view, self.padding).to_bounds();
        let mut screen_entries: Vec<MarkerEntry> = Vec::new();
        let mut handles = Vec::new();
        for entry in store.search_geo(&geo_query) {
            let marker = &entry.data;
            let Some(icon) = marker.icon() else {
                continue;
            };
            let point = view.lat_lng_to_container_point(marker.position());
            let Some(bounds) = marker.screen_bounds(point) else {
                continue;
            };
            screen_entries.push(IndexedEntry::new(bounds, marker.clone()));

            let repaint = match (region, marker.draw_bounds(point)) {
                (Some(device_region), Some(drawn)) => self
                    .container_to_device(view, &frame, drawn)
                    .intersects(&device_region),
                _ => true,
            };
            if !repaint {
                continue;
            }

            let origin = self.device_origin(view, &frame, point, icon.anchor_point());
            let handle = images.get_or_load(&icon.url);
            let pixel_ratio = self.pixel_ratio;
            let mut drawn = false;
            images.on_ready(&handle, marker, origin, |marker, origin, bitmap| {
                paint_marker(surface, marker, origin, bitmap, pixel_ratio);
                drawn = true;
            });
            if drawn {
                summary.drawn += 1;
            } else if images.pending_draws(&handle) > 0 && !images.is_loaded(&handle) {
                summary.queued += 1;
            }
            handles.push((marker.id(), handle));
        }

        surface.set_clip(None);
        for (id, handle) in handles {
            store.note_image(id, handle);
        }
        summary.visible = screen_entries.len();
        store.replace_screen(screen_entries);

        self.transition(RenderState::Idle);
        log::debug!(
            "Redraw: {} visible, {} drawn, {} waiting on icons{}{}",
            summary.visible,
            summary.drawn,
            summary.queued,
            if summary.partial { ", partial" } else { "" },
            if summary.repacked { ", geo index repacked" } else { "" },
        );
        summary
    }

    /// Device-pixel top-left for a marker projected to `container_point`.
    /// Only meaningful once a frame exists.
    pub fn marker_origin<V: MapView + ?Sized>(
        &self,
        view: &V,
        container_point: Point,
        anchor: Point,
    ) -> Option<Point> {
        self.frame
            .as_ref()
            .map(|frame| self.device_origin(view, frame, container_point, anchor))
    }

    /// Recomputes the host transform for a view heading to `center`/`zoom`.
    pub fn update_transform<V, S>(&mut self, view: &V, center: LatLng, zoom: f64, surface: &mut S)
    where
        V: MapView + ?Sized,
        S: Surface + ?Sized,
    {
        let Some(frame) = self.frame else {
            return;
        };
        let scale = view.zoom_scale(zoom, frame.zoom);
        let position = frame.pixel_bounds.min();
        let view_half = view.size() * (0.5 + self.padding);
        let center_offset = view.project(center, zoom) - view.project(frame.center, zoom);

        self.transform = SurfaceTransform {
            offset: view_half * -scale + position + view_half - center_offset,
            scale,
        };
        surface.set_transform(self.transform);
    }

    fn update_frame<V: MapView + ?Sized>(&mut self, view: &V) -> FrameGeometry {
        if let Some(frame) = self.frame {
            if view.is_animating_zoom() {
                return frame;
            }
        }

        let size = view.size();
        let min = view
            .container_point_to_layer_point(size * -self.padding)
            .round();
        let max = (min + size * (1.0 + 2.0 * self.padding)).round();
        let frame = FrameGeometry {
            pixel_bounds: Bounds::from_corners(min, max),
            center: view.center(),
            zoom: view.zoom(),
        };
        self.frame = Some(frame);
        frame
    }

    fn device_origin<V: MapView + ?Sized>(
        &self,
        view: &V,
        frame: &FrameGeometry,
        container_point: Point,
        anchor: Point,
    ) -> Point {
        let layer = view.container_point_to_layer_point(container_point - anchor);
        (layer - frame.pixel_bounds.min()) * self.pixel_ratio
    }

    fn container_to_device<V: MapView + ?Sized>(
        &self,
        view: &V,
        frame: &FrameGeometry,
        container: Bounds,
    ) -> Bounds {
        let origin = frame.pixel_bounds.min();
        let min = (view.container_point_to_layer_point(container.min()) - origin) * self.pixel_ratio;
        let max = (view.container_point_to_layer_point(container.max()) - origin) * self.pixel_ratio;
        Bounds::from_corners(min, max)
    }

    fn transition(&mut self, next: RenderState) {
        log::trace!("Render state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Padded geographic query area for a view.
pub fn padded_geo_bounds<V: MapView + ?Sized>(view: &V, padding: f64) -> LatLngBounds {
    view.bounds().pad(padding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RasterSurface;
    use image::{Rgba, RgbaImage};
    use markers_core::{Crs, GroupId, Icon, Marker, StaticImageSource, StaticMapView};

    fn plane_view() -> StaticMapView {
        // Simple CRS: container (x, y) <-> lng = x, lat = 100 - y
        StaticMapView::new(Crs::Simple, 100.0, 100.0, LatLng::new(50.0, 50.0), 0.0)
    }

    fn icons() -> ImageCache {
        ImageCache::new(
            StaticImageSource::new().with_image("pin.png", RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 255]))),
        )
    }

    #[test]
    fn test_frame_covers_padded_view() {
        let view = plane_view();
        let mut pipeline = RenderPipeline::new(0.1, 1.0);
        let mut store = MarkerStore::new(0.1);
        let mut images = icons();
        let mut surface = RasterSurface::new();

        let summary = pipeline.redraw(&view, &mut store, &mut images, &mut surface);
        assert!(!summary.partial);
        assert_eq!(pipeline.frame().unwrap().pixel_bounds, Bounds::new(-10.0, -10.0, 110.0, 110.0));
        assert_eq!(surface.dimensions(), (120, 120));
        assert_eq!(surface.position(), Point::new(-10.0, -10.0));
        assert_eq!(pipeline.state(), RenderState::Idle);
    }

    #[test]
    fn test_pixel_ratio_scales_surface_and_draws() {
        let view = plane_view();
        let mut pipeline = RenderPipeline::new(0.0, 2.0);
        let mut store = MarkerStore::new(0.1);
        let mut images = icons();
        let mut surface = RasterSurface::new();
        let marker = Marker::new(LatLng::new(50.0, 50.0), Icon::new("pin.png", 20.0, 20.0));
        store.add(marker, GroupId::default(), None).unwrap();

        // First pass starts the icon load; the static source answers at once
        pipeline.redraw(&view, &mut store, &mut images, &mut surface);
        images.process_completions(|_, _, _| {});
        let summary = pipeline.redraw(&view, &mut store, &mut images, &mut surface);

        assert_eq!(summary.drawn, 1);
        assert_eq!(surface.dimensions(), (200, 200));
        // Icon spans container 40..60, device 80..120
        assert_eq!(surface.image().get_pixel(80, 80)[3], 255);
        assert_eq!(surface.image().get_pixel(119, 119)[3], 255);
        assert_eq!(surface.image().get_pixel(79, 79)[3], 0);
    }

    #[test]
    fn test_anchor_offsets_draw_position() {
        let view = plane_view();
        let mut pipeline = RenderPipeline::new(0.0, 1.0);
        pipeline.redraw(&view, &mut MarkerStore::new(0.1), &mut icons(), &mut RasterSurface::new());

        let origin = pipeline
            .marker_origin(&view, Point::new(50.0, 50.0), Point::new(10.0, 20.0))
            .unwrap();
        assert_eq!(origin, Point::new(40.0, 30.0));
    }

    #[test]
    fn test_nested_redraw_is_deferred() {
        let view = plane_view();
        let mut pipeline = RenderPipeline::new(0.1, 1.0);
        pipeline.state = RenderState::Drawing;

        let summary = pipeline.redraw(&view, &mut MarkerStore::new(0.1), &mut icons(), &mut RasterSurface::new());
        assert!(summary.deferred);
        assert!(pipeline.redraw_pending());
    }

    #[test]
    fn test_zoom_transform_matches_identity_at_rest() {
        let view = plane_view();
        let mut pipeline = RenderPipeline::new(0.1, 1.0);
        let mut surface = RasterSurface::new();
        pipeline.redraw(&view, &mut MarkerStore::new(0.1), &mut icons(), &mut surface);

        let transform = pipeline.transform();
        assert_eq!(transform.scale, 1.0);
        assert_eq!(transform.offset, Point::new(-10.0, -10.0));
    }

    #[test]
    fn test_dirty_regions_accumulate() {
        let mut pipeline = RenderPipeline::new(0.1, 1.0);
        pipeline.mark_dirty(Bounds::new(0.0, 0.0, 10.0, 10.0));
        pipeline.mark_dirty(Bounds::new(20.0, 5.0, 30.0, 15.0));
        assert_eq!(pipeline.dirty_region(), Some(Bounds::new(0.0, 0.0, 30.0, 15.0)));
        pipeline.reset();
        assert_eq!(pipeline.dirty_region(), None);
    }
}
