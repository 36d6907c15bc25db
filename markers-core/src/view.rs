/*!
# Host View Interface

The layer never owns the map; it reads bounds and projections from whatever
implements [`MapView`]. [`StaticMapView`] is an in-memory view with a fixed
container size, used by the CLI and in tests.

Coordinate spaces follow the usual tiled-map conventions:
- *projected* points: `project(lat_lng, zoom)` in world pixels
- *layer* points: projected minus the pixel origin fixed at the last view reset
- *container* points: layer points shifted by the current pan offset; `(0, 0)`
  is the top-left of the visible container
*/

use crate::coords::{LatLng, LatLngBounds, Point};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Everything the layer needs from the host map.
pub trait MapView {
    /// Geographic bounds of the visible container.
    fn bounds(&self) -> LatLngBounds;

    /// Container size in CSS pixels.
    fn size(&self) -> Point;

    fn center(&self) -> LatLng;

    fn zoom(&self) -> f64;

    fn project(&self, lat_lng: LatLng, zoom: f64) -> Point;

    fn lat_lng_to_container_point(&self, lat_lng: LatLng) -> Point;

    fn container_point_to_layer_point(&self, point: Point) -> Point;

    /// Scale factor between two zoom levels.
    fn zoom_scale(&self, to_zoom: f64, from_zoom: f64) -> f64 {
        2f64.powf(to_zoom - from_zoom)
    }

    fn is_animating_zoom(&self) -> bool {
        false
    }

    fn is_dragging(&self) -> bool {
        false
    }
}

/// View-change notifications delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewEvent {
    /// A pan or zoom settled
    MoveEnd,
    /// Zoom level changed without animation
    Zoom,
    /// A zoom animation is heading to `center`/`zoom`
    ZoomAnim { center: LatLng, zoom: f64 },
    /// Container size changed
    Resize,
}

/// Coordinate reference system for [`StaticMapView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crs {
    /// Spherical Web Mercator with 256px tiles
    #[default]
    WebMercator,
    /// Flat plane: `x = lng`, `y = -lat`, one unit per pixel at zoom 0
    Simple,
}

const TILE_SIZE: f64 = 256.0;
const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

impl Crs {
    pub fn scale(&self, zoom: f64) -> f64 {
        match self {
            Crs::WebMercator => TILE_SIZE * 2f64.powf(zoom),
            Crs::Simple => 2f64.powf(zoom),
        }
    }

    pub fn project(&self, lat_lng: LatLng, zoom: f64) -> Point {
        let scale = self.scale(zoom);
        match self {
            Crs::WebMercator => {
                let lat = lat_lng.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
                let x = (lat_lng.lng + 180.0) / 360.0;
                let y = 0.5 - ((1.0 + lat.sin()) / (1.0 - lat.sin())).ln() / (4.0 * PI);
                Point::new(x * scale, y * scale)
            }
            Crs::Simple => Point::new(lat_lng.lng * scale, -lat_lng.lat * scale),
        }
    }

    pub fn unproject(&self, point: Point, zoom: f64) -> LatLng {
        let scale = self.scale(zoom);
        match self {
            Crs::WebMercator => {
                let lng = point.x / scale * 360.0 - 180.0;
                let n = PI - 2.0 * PI * point.y / scale;
                let lat = n.sinh().atan().to_degrees();
                LatLng::new(lat, lng)
            }
            Crs::Simple => LatLng::new(-point.y / scale, point.x / scale),
        }
    }
}

/// In-memory map view with settable center, zoom and pan state.
#[derive(Debug, Clone)]
pub struct StaticMapView {
    crs: Crs,
    size: Point,
    center: LatLng,
    zoom: f64,
    pixel_origin: Point,
    pane_offset: Point,
    animating_zoom: bool,
    dragging: bool,
}

impl StaticMapView {
    pub fn new(crs: Crs, width: f64, height: f64, center: LatLng, zoom: f64) -> Self {
        let mut view = Self {
            crs,
            size: Point::new(width, height),
            center,
            zoom,
            pixel_origin: Point::default(),
            pane_offset: Point::default(),
            animating_zoom: false,
            dragging: false,
        };
        view.set_view(center, zoom);
        view
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    /// Resets the view, fixing a new pixel origin.
    pub fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.center = center;
        self.zoom = zoom;
        self.pixel_origin = (self.crs.project(center, zoom) - self.size * 0.5).round();
        self.pane_offset = Point::default();
    }

    /// Pans by `offset` container pixels, keeping the pixel origin.
    pub fn pan_by(&mut self, offset: Point) {
        self.pane_offset = self.pane_offset - offset;
        let center = self.crs.project(self.center, self.zoom) + offset;
        self.center = self.crs.unproject(center, self.zoom);
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.size = Point::new(width, height);
        self.set_view(self.center, self.zoom);
    }

    pub fn set_animating_zoom(&mut self, animating: bool) {
        self.animating_zoom = animating;
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    pub fn container_point_to_lat_lng(&self, point: Point) -> LatLng {
        let projected = point - self.pane_offset + self.pixel_origin;
        self.crs.unproject(projected, self.zoom)
    }
}

impl MapView for StaticMapView {
    fn bounds(&self) -> LatLngBounds {
        let south_west = self.container_point_to_lat_lng(Point::new(0.0, self.size.y));
        let north_east = self.container_point_to_lat_lng(Point::new(self.size.x, 0.0));
        LatLngBounds::new(south_west, north_east)
    }

    fn size(&self) -> Point {
        self.size
    }

    fn center(&self) -> LatLng {
        self.center
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn project(&self, lat_lng: LatLng, zoom: f64) -> Point {
        self.crs.project(lat_lng, zoom)
    }

    fn lat_lng_to_container_point(&self, lat_lng: LatLng) -> Point {
        self.crs.project(lat_lng, self.zoom) - self.pixel_origin + self.pane_offset
    }

    fn container_point_to_layer_point(&self, point: Point) -> Point {
        point - self.pane_offset
    }

    fn is_animating_zoom(&self) -> bool {
        self.animating_zoom
    }

    fn is_dragging(&self) -> bool {
        self.dragging
    }
}
