#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use markers_core::*;
use markers_render::*;
use std::cell::RefCell;
use std::rc::Rc;

pub type TestLayer = CanvasMarkerLayer<StaticMapView, RasterSurface>;

pub const PIN: &str = "pin.png";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 100x100 view over a flat plane where container `(x, y)` shows
/// `lng = x`, `lat = 100 - y`.
pub fn plane_view() -> StaticMapView {
    StaticMapView::new(Crs::Simple, 100.0, 100.0, LatLng::new(50.0, 50.0), 0.0)
}

/// Geographic position shown at container point `(x, y)` of [`plane_view`].
pub fn at(x: f64, y: f64) -> LatLng {
    LatLng::new(100.0 - y, x)
}

pub fn pin_at(x: f64, y: f64) -> MarkerRef {
    Marker::new(at(x, y), Icon::new(PIN, 20.0, 20.0))
}

pub fn solid_icon() -> RgbaImage {
    RgbaImage::from_pixel(20, 20, Rgba([200, 30, 30, 255]))
}

pub fn static_icons() -> ImageCache {
    ImageCache::new(StaticImageSource::new().with_image(PIN, solid_icon()))
}

pub fn layer_with(options: LayerOptions, images: ImageCache) -> TestLayer {
    init_logging();
    CanvasMarkerLayer::new(options, RasterSurface::new(), images).unwrap()
}

pub fn mounted_layer(options: LayerOptions) -> TestLayer {
    let mut layer = layer_with(options, static_icons());
    layer.mount(plane_view());
    layer
}

/// Holds every load request until the test completes it.
#[derive(Clone, Default)]
pub struct ManualSource {
    pub replies: Rc<RefCell<Vec<LoadReply>>>,
}

impl ImageSource for ManualSource {
    fn fetch(&self, reply: LoadReply) {
        self.replies.borrow_mut().push(reply);
    }
}

impl ManualSource {
    pub fn complete_all(&self, image: &RgbaImage) {
        for reply in self.replies.borrow_mut().drain(..) {
            reply.complete(Ok(image.clone()));
        }
    }

    pub fn fail_all(&self) {
        for reply in self.replies.borrow_mut().drain(..) {
            let url = reply.url().to_string();
            reply.complete(Err(MarkerError::image_load(url, "unreachable")));
        }
    }
}

pub fn alpha_at(layer: &TestLayer, x: u32, y: u32) -> u8 {
    layer.surface().image().get_pixel(x, y)[3]
}

/// Records the kind and target of every event a handler sees.
pub fn recorder() -> (Rc<RefCell<Vec<(EventKind, Option<MarkerId>)>>>, impl Fn() -> Box<dyn FnMut(&MarkerEvent)>) {
    let log: Rc<RefCell<Vec<(EventKind, Option<MarkerId>)>>> = Rc::default();
    let sink = log.clone();
    let make = move || -> Box<dyn FnMut(&MarkerEvent)> {
        let sink = sink.clone();
        Box::new(move |event: &MarkerEvent| {
            sink.borrow_mut()
                .push((event.kind.clone(), event.target.as_ref().map(|m| m.id())));
        })
    };
    (log, make)
}
