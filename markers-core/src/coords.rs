//! Geometry primitives shared by the geo and screen indexes.
//!
//! Screen-space values are expressed as [`Point`]/[`Bounds`] in CSS pixels.
//! Geographic values use [`LatLng`]/[`LatLngBounds`]; when stored in the geo
//! index a position becomes the degenerate box at `(lng, lat)`.

use rstar::AABB;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn round(self) -> Self {
        Self::new(self.x.round(), self.y.round())
    }

    pub fn floor(self) -> Self {
        Self::new(self.x.floor(), self.y.floor())
    }

    pub fn ceil(self) -> Self {
        Self::new(self.x.ceil(), self.y.ceil())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl From<[f64; 2]> for Point {
    fn from(value: [f64; 2]) -> Self {
        Point::new(value[0], value[1])
    }
}

/// Axis-aligned box, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
    }

    /// Degenerate box covering a single point.
    pub fn from_point(point: Point) -> Self {
        Self::new(point.x, point.y, point.x, point.y)
    }

    /// Box of `half_extent` in each direction around `center`.
    pub fn centered(center: Point, half_extent: Point) -> Self {
        Self::new(
            center.x - half_extent.x,
            center.y - half_extent.y,
            center.x + half_extent.x,
            center.y + half_extent.y,
        )
    }

    pub fn min(&self) -> Point {
        Point::new(self.min_x, self.min_y)
    }

    pub fn max(&self) -> Point {
        Point::new(self.max_x, self.max_y)
    }

    pub fn size(&self) -> Point {
        Point::new(self.max_x - self.min_x, self.max_y - self.min_y)
    }

    pub fn center(&self) -> Point {
        Point::new((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }

    /// Smallest box covering both.
    pub fn extend(&self, other: &Bounds) -> Bounds {
        Bounds::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Rounds outward to whole pixels: min corner floored, max corner ceiled.
    pub fn round_out(&self) -> Bounds {
        Bounds::from_corners(self.min().floor(), self.max().ceil())
    }

    pub(crate) fn to_aabb(self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Position as stored in the geo index (`x = lng`, `y = lat`).
    pub fn to_point(self) -> Point {
        Point::new(self.lng, self.lat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(a: LatLng, b: LatLng) -> Self {
        Self {
            south_west: LatLng::new(a.lat.min(b.lat), a.lng.min(b.lng)),
            north_east: LatLng::new(a.lat.max(b.lat), a.lng.max(b.lng)),
        }
    }

    pub fn west(&self) -> f64 {
        self.south_west.lng
    }

    pub fn east(&self) -> f64 {
        self.north_east.lng
    }

    pub fn south(&self) -> f64 {
        self.south_west.lat
    }

    pub fn north(&self) -> f64 {
        self.north_east.lat
    }

    pub fn contains(&self, lat_lng: LatLng) -> bool {
        lat_lng.lat >= self.south()
            && lat_lng.lat <= self.north()
            && lat_lng.lng >= self.west()
            && lat_lng.lng <= self.east()
    }

    /// Extends the bounds by `ratio` of their span in each direction.
    /// Negative ratios shrink them.
    pub fn pad(&self, ratio: f64) -> LatLngBounds {
        let height_buffer = (self.north() - self.south()).abs() * ratio;
        let width_buffer = (self.east() - self.west()).abs() * ratio;
        LatLngBounds {
            south_west: LatLng::new(self.south() - height_buffer, self.west() - width_buffer),
            north_east: LatLng::new(self.north() + height_buffer, self.east() + width_buffer),
        }
    }

    /// Geo-index search box for these bounds.
    pub fn to_bounds(&self) -> Bounds {
        Bounds::new(self.west(), self.south(), self.east(), self.north())
    }
}
