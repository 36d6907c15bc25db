/*!
# Canvas Marker Layer

Composes the marker store, icon cache, render pipeline and event dispatcher
behind one owner. A host adapter drives it through the [`Layer`] trait and
forwards view and pointer events; callers mutate the marker set through the
inherent methods.

Before [`Layer::mount`] the layer still accepts markers. They are indexed
geographically but nothing is drawn and hit tests find nothing.
*/

use crate::events::{EventDispatcher, PointerEvent, PointerKind};
use crate::pipeline::{paint_marker, RedrawSummary, RenderPipeline};
use crate::surface::Surface;
use markers_core::{
    AddOutcome, BatchReport, ConfigError, EventKind, GroupId, ImageCache, LayerOptions, MapView, MarkerEvent,
    MarkerRef, MarkerResult, MarkerStore, Point, Removal, ViewEvent,
};
use std::time::Duration;

/// Host-facing lifecycle of a map layer.
pub trait Layer {
    type View: MapView;

    /// Attaches the layer to a view and draws it.
    fn mount(&mut self, view: Self::View);

    /// Detaches the layer, dropping its indexes. Returns the view.
    fn unmount(&mut self) -> Option<Self::View>;

    fn on_view_change(&mut self, event: ViewEvent);

    fn on_pointer_event(&mut self, event: &mut PointerEvent);

    /// Runs a pending redraw, if any. Returns whether one ran.
    fn on_frame(&mut self) -> bool;
}

pub struct CanvasMarkerLayer<V: MapView, S: Surface> {
    options: LayerOptions,
    view: Option<V>,
    surface: S,
    store: Option<MarkerStore>,
    images: ImageCache,
    pipeline: RenderPipeline,
    events: EventDispatcher,
}

impl<V: MapView, S: Surface> CanvasMarkerLayer<V, S> {
    pub fn new(options: LayerOptions, surface: S, images: ImageCache) -> Result<Self, ConfigError> {
        options.validate()?;
        let pipeline = RenderPipeline::new(options.padding, options.pixel_ratio);
        Ok(Self {
            options,
            view: None,
            surface,
            store: None,
            images,
            pipeline,
            events: EventDispatcher::new(),
        })
    }

    pub fn is_mounted(&self) -> bool {
        self.view.is_some()
    }

    /// Adds one marker. A marker landing inside the current view is drawn
    /// right away.
    pub fn add(&mut self, marker: MarkerRef, group: impl Into<GroupId>) -> MarkerResult<AddOutcome> {
        let rebuild_ratio = self.options.rebuild_ratio;
        let store = self.store.get_or_insert_with(|| MarkerStore::new(rebuild_ratio));
        let view = self.view.as_ref().map(|view| view as &dyn MapView);

        let outcome = store.add(marker.clone(), group.into(), view).map_err(|err| {
            log::error!("{}", err);
            err
        })?;
        if let AddOutcome::Inserted {
            visible_at: Some(point),
        } = outcome
        {
            self.draw_now(&marker, point);
        }
        Ok(outcome)
    }

    /// Adds a batch, indexing it in one pass. Rejected markers are logged
    /// and listed in the report.
    pub fn add_many<I>(&mut self, markers: I, group: impl Into<GroupId>) -> BatchReport
    where
        I: IntoIterator<Item = MarkerRef>,
    {
        let rebuild_ratio = self.options.rebuild_ratio;
        let store = self.store.get_or_insert_with(|| MarkerStore::new(rebuild_ratio));
        let view = self.view.as_ref().map(|view| view as &dyn MapView);

        let report = store.add_many(markers, group.into(), view);
        store.maintain();
        for err in &report.rejected {
            log::error!("{}", err);
        }
        for (marker, point) in &report.visible {
            self.draw_now(marker, *point);
        }
        log::debug!(
            "Added {} marker(s), {} visible, {} moved, {} unchanged, {} rejected",
            report.inserted,
            report.visible.len(),
            report.moved,
            report.unchanged,
            report.rejected.len()
        );
        report
    }

    /// Removes one marker. With `redraw`, the area it covered is repainted.
    pub fn remove(&mut self, marker: &MarkerRef, redraw: bool) -> Option<Removal> {
        let removal = self.detach(marker)?;
        if redraw {
            if let Some(bounds) = removal.draw_bounds {
                self.pipeline.mark_dirty(bounds);
                self.redraw();
            }
        }
        Some(removal)
    }

    /// Removes a batch without redrawing. Returns how many were registered.
    pub fn remove_many<'a, I>(&mut self, markers: I) -> usize
    where
        I: IntoIterator<Item = &'a MarkerRef>,
    {
        let removed = markers
            .into_iter()
            .filter(|marker| self.detach(marker).is_some())
            .count();
        if let Some(store) = self.store.as_mut() {
            store.maintain();
        }
        removed
    }

    /// Removes every member of `group` and redraws.
    pub fn remove_group(&mut self, group: impl Into<GroupId>) -> usize {
        let removed = self.remove_group_quietly(&group.into());
        self.redraw();
        removed
    }

    /// Removes several groups, redrawing once at the end.
    pub fn remove_groups<I, G>(&mut self, groups: I) -> usize
    where
        I: IntoIterator<Item = G>,
        G: Into<GroupId>,
    {
        let removed = groups
            .into_iter()
            .map(|group| self.remove_group_quietly(&group.into()))
            .sum();
        self.redraw();
        removed
    }

    /// Forgets every marker and blanks the surface.
    pub fn clear_all(&mut self) {
        if let Some(store) = self.store.as_mut() {
            store.clear();
        }
        self.events.reset();
        self.images.discard_pending();
        if self.redraw().is_none() {
            self.surface.clear();
        }
    }

    /// Registers a layer-level handler. `click`, `mouseover` and `mouseout`
    /// set the fallback used for markers without their own listener; other
    /// kinds are pass-through handlers invoked by [`fire`](Self::fire).
    pub fn on<K, F>(&mut self, kind: K, handler: F)
    where
        K: Into<EventKind>,
        F: FnMut(&MarkerEvent) + 'static,
    {
        self.events.on(kind.into(), Box::new(handler));
    }

    pub fn fire(&mut self, kind: impl Into<EventKind>, event: &MarkerEvent) -> usize {
        self.events.fire(&kind.into(), event)
    }

    /// Runs the pipeline now. `None` when not mounted.
    pub fn redraw(&mut self) -> Option<RedrawSummary> {
        let view = self.view.as_ref()?;
        let rebuild_ratio = self.options.rebuild_ratio;
        let store = self.store.get_or_insert_with(|| MarkerStore::new(rebuild_ratio));
        Some(self.pipeline.redraw(view, store, &mut self.images, &mut self.surface))
    }

    /// Schedules a redraw for the next [`Layer::on_frame`].
    pub fn request_redraw(&mut self) {
        self.pipeline.request_redraw();
    }

    /// Applies finished icon loads, painting their queued markers. Returns
    /// the number of loads applied.
    pub fn process_image_loads(&mut self) -> usize {
        let pixel_ratio = self.options.pixel_ratio;
        let store = self.store.as_ref();
        let surface = &mut self.surface;
        self.images.process_completions(|marker, origin, bitmap| {
            if store.map_or(false, |store| store.contains(marker.id())) {
                paint_marker(surface, marker, origin, bitmap, pixel_ratio);
            }
        })
    }

    /// Like [`process_image_loads`](Self::process_image_loads) but blocks
    /// until every started load is applied or `timeout` passes.
    pub fn wait_for_image_loads(&mut self, timeout: Duration) -> usize {
        let pixel_ratio = self.options.pixel_ratio;
        let store = self.store.as_ref();
        let surface = &mut self.surface;
        self.images.wait_for_loads(timeout, |marker, origin, bitmap| {
            if store.map_or(false, |store| store.contains(marker.id())) {
                paint_marker(surface, marker, origin, bitmap, pixel_ratio);
            }
        })
    }

    /// Marker under a container point, if any.
    pub fn hit_test(&self, point: Point) -> Option<MarkerRef> {
        self.store
            .as_ref()
            .and_then(|store| store.hit(point))
            .map(|entry| entry.data.clone())
    }

    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    pub fn view(&self) -> Option<&V> {
        self.view.as_ref()
    }

    pub fn view_mut(&mut self) -> Option<&mut V> {
        self.view.as_mut()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn store(&self) -> Option<&MarkerStore> {
        self.store.as_ref()
    }

    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    /// Paints a single newly visible marker without a full redraw.
    fn draw_now(&mut self, marker: &MarkerRef, point: Point) {
        let (Some(view), Some(icon)) = (self.view.as_ref(), marker.icon()) else {
            return;
        };
        let Some(origin) = self.pipeline.marker_origin(view, point, icon.anchor_point()) else {
            return;
        };
        let handle = self.images.get_or_load(&icon.url);
        let pixel_ratio = self.options.pixel_ratio;
        let surface = &mut self.surface;
        self.images.on_ready(&handle, marker, origin, |marker, origin, bitmap| {
            paint_marker(surface, marker, origin, bitmap, pixel_ratio);
        });
        if let Some(store) = self.store.as_mut() {
            store.note_image(marker.id(), handle);
        }
    }

    fn detach(&mut self, marker: &MarkerRef) -> Option<Removal> {
        let removal = self.store.as_mut()?.remove(marker)?;
        self.images.forget_marker(marker.id());
        if self.events.hovered().map_or(false, |hovered| hovered.id() == marker.id()) {
            self.events.reset();
            self.surface.set_interactive(false);
        }
        Some(removal)
    }

    fn remove_group_quietly(&mut self, group: &GroupId) -> usize {
        let Some(store) = self.store.as_mut() else {
            return 0;
        };
        let removed = store.remove_group(group);
        store.maintain();
        let hover_removed = self
            .events
            .hovered()
            .map_or(false, |hovered| !store.contains(hovered.id()));
        if hover_removed {
            self.events.reset();
            self.surface.set_interactive(false);
        }
        removed
    }
}

impl<V: MapView, S: Surface> Layer for CanvasMarkerLayer<V, S> {
    type View = V;

    fn mount(&mut self, view: V) {
        self.view = Some(view);
        self.surface.mount();
        log::debug!("Layer mounted");
        self.redraw();
    }

    fn unmount(&mut self) -> Option<V> {
        let view = self.view.take()?;
        self.surface.unmount();
        self.store = None;
        self.events.reset();
        self.images.discard_pending();
        self.pipeline.reset();
        log::debug!("Layer unmounted");
        Some(view)
    }

    fn on_view_change(&mut self, event: ViewEvent) {
        let Some(view) = self.view.as_ref() else {
            return;
        };
        match event {
            ViewEvent::MoveEnd | ViewEvent::Resize => self.pipeline.request_redraw(),
            ViewEvent::Zoom => {
                let (center, zoom) = (view.center(), view.zoom());
                self.pipeline.update_transform(view, center, zoom, &mut self.surface);
            }
            ViewEvent::ZoomAnim { center, zoom } => {
                self.pipeline.update_transform(view, center, zoom, &mut self.surface);
            }
        }
    }

    fn on_pointer_event(&mut self, event: &mut PointerEvent) {
        let (Some(view), Some(store)) = (self.view.as_ref(), self.store.as_ref()) else {
            return;
        };
        match event.kind {
            PointerKind::Click => {
                self.events.handle_click(store, event);
            }
            PointerKind::Move => {
                if view.is_dragging() || view.is_animating_zoom() {
                    return;
                }
                self.events.handle_move(store, &mut self.surface, event);
            }
            PointerKind::Leave => self.events.handle_leave(&mut self.surface, event),
        }
    }

    fn on_frame(&mut self) -> bool {
        if !self.pipeline.redraw_pending() {
            return false;
        }
        self.redraw().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RasterSurface;
    use image::{Rgba, RgbaImage};
    use markers_core::{Crs, Icon, LatLng, Marker, StaticImageSource, StaticMapView};

    type TestLayer = CanvasMarkerLayer<StaticMapView, RasterSurface>;

    fn layer() -> TestLayer {
        let icons = StaticImageSource::new().with_image("pin.png", RgbaImage::from_pixel(20, 20, Rgba([0, 0, 255, 255])));
        CanvasMarkerLayer::new(LayerOptions::default(), RasterSurface::new(), ImageCache::new(icons)).unwrap()
    }

    fn view() -> StaticMapView {
        StaticMapView::new(Crs::Simple, 100.0, 100.0, LatLng::new(50.0, 50.0), 0.0)
    }

    fn pin(lat: f64, lng: f64) -> MarkerRef {
        Marker::new(LatLng::new(lat, lng), Icon::new("pin.png", 20.0, 20.0))
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let options = LayerOptions::default().with_pixel_ratio(0.5);
        let result: Result<TestLayer, _> =
            CanvasMarkerLayer::new(options, RasterSurface::new(), ImageCache::new(StaticImageSource::new()));
        assert!(matches!(result, Err(ConfigError::InvalidOption { name: "pixel_ratio", .. })));
    }

    #[test]
    fn test_operations_before_mount_degrade_quietly() {
        let mut layer = layer();
        let marker = pin(50.0, 50.0);
        let outcome = layer.add(marker.clone(), "0").unwrap();

        assert_eq!(outcome, AddOutcome::Inserted { visible_at: None });
        assert!(layer.hit_test(Point::new(50.0, 50.0)).is_none());
        assert!(layer.redraw().is_none());
        assert!(!layer.on_frame());
        layer.on_pointer_event(&mut PointerEvent::click(50.0, 50.0));
        assert_eq!(layer.surface().draw_calls(), 0);
    }

    #[test]
    fn test_mount_draws_existing_markers() {
        let mut layer = layer();
        let marker = pin(50.0, 50.0);
        layer.add(marker.clone(), "0").unwrap();
        layer.mount(view());
        layer.process_image_loads();

        assert_eq!(layer.hit_test(Point::new(45.0, 45.0)).map(|m| m.id()), Some(marker.id()));
        assert_eq!(layer.surface().draw_calls(), 1);
        assert!(layer.surface().is_mounted());
    }

    #[test]
    fn test_invalid_add_is_rejected() {
        let mut layer = layer();
        let err = layer.add(Marker::without_icon(LatLng::new(1.0, 1.0)), "0").unwrap_err();
        assert!(matches!(err, markers_core::MarkerError::InvalidMarker { .. }));
        assert_eq!(layer.store().map(|s| s.total()), Some(0));
    }

    #[test]
    fn test_remove_many_does_not_redraw() {
        let mut layer = layer();
        layer.mount(view());
        let markers: Vec<_> = (0..5).map(|i| pin(50.0, 10.0 + 10.0 * i as f64)).collect();
        layer.add_many(markers.clone(), "batch");
        let frame_before = layer.pipeline().frame().copied();

        let removed = layer.remove_many(markers.iter().take(3));
        assert_eq!(removed, 3);
        assert_eq!(layer.store().unwrap().total(), 2);
        assert_eq!(layer.pipeline().frame().copied(), frame_before);
        assert!(!layer.pipeline().redraw_pending());
    }

    #[test]
    fn test_move_end_is_coalesced_into_one_frame() {
        let mut layer = layer();
        layer.mount(view());
        layer.on_view_change(ViewEvent::MoveEnd);
        layer.on_view_change(ViewEvent::MoveEnd);

        assert!(layer.on_frame());
        assert!(!layer.on_frame());
    }

    #[test]
    fn test_unmount_drops_indexes() {
        let mut layer = layer();
        layer.mount(view());
        layer.add(pin(50.0, 50.0), "0").unwrap();
        let returned = layer.unmount();

        assert!(returned.is_some());
        assert!(layer.store().is_none());
        assert!(layer.hit_test(Point::new(50.0, 50.0)).is_none());
        assert!(layer.unmount().is_none());
    }
}
