//! Canvas Markers Core Library
//!
//! Marker records, the R-tree backed marker store, the icon cache and the
//! host view interface shared by the rendering layer.

pub mod coords;
pub mod error;
pub mod image_cache;
pub mod options;
pub mod spatial;
pub mod store;
pub mod types;
pub mod view;

// Re-export commonly used types
pub use coords::{Bounds, LatLng, LatLngBounds, Point};
pub use error::{ConfigError, MarkerError, MarkerResult};
pub use image_cache::{
    Bitmap, FileImageSource, ImageCache, ImageHandle, ImageSource, LoadReply, LoadState,
    StaticImageSource,
};
pub use options::LayerOptions;
pub use spatial::{IndexedEntry, SpatialIndex};
pub use store::{AddOutcome, BatchReport, MarkerEntry, MarkerStore, Removal};
pub use types::{EventKind, GroupId, Icon, Listener, Marker, MarkerEvent, MarkerId, MarkerRef};
pub use view::{Crs, MapView, StaticMapView, ViewEvent};

/// Version information for the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
