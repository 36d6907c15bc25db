//! Hit testing and pointer event dispatch
//!
//! Pointer coordinates are resolved through the store's screen index. A hit
//! goes to the marker's own listeners when it has one for the event type, and
//! to the layer-level fallback handler otherwise.

use crate::surface::Surface;
use markers_core::{EventKind, MarkerEntry, MarkerEvent, MarkerRef, MarkerStore, Point};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Move,
    Click,
    Leave,
}

/// A pointer event delivered by the host, in container coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub container_point: Point,
    propagation_stopped: bool,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, container_point: Point) -> Self {
        Self {
            kind,
            container_point,
            propagation_stopped: false,
        }
    }

    pub fn moved(x: f64, y: f64) -> Self {
        Self::new(PointerKind::Move, Point::new(x, y))
    }

    pub fn click(x: f64, y: f64) -> Self {
        Self::new(PointerKind::Click, Point::new(x, y))
    }

    pub fn leave() -> Self {
        Self::new(PointerKind::Leave, Point::default())
    }

    /// Keeps the host from handing this event to anything under the layer.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

pub type LayerHandler = Box<dyn FnMut(&MarkerEvent)>;

/// First screen entry under `point`, in index order.
pub fn hit_test(store: &MarkerStore, point: Point) -> Option<&MarkerEntry> {
    store.hit(point)
}

#[derive(Default)]
pub struct EventDispatcher {
    fallbacks: HashMap<EventKind, LayerHandler>,
    passthrough: HashMap<EventKind, Vec<LayerHandler>>,
    hovered: Option<MarkerRef>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer kinds replace the fallback for that kind; anything else is
    /// added to the pass-through handlers.
    pub fn on(&mut self, kind: EventKind, handler: LayerHandler) {
        if kind.is_pointer() {
            self.fallbacks.insert(kind, handler);
        } else {
            self.passthrough.entry(kind).or_default().push(handler);
        }
    }

    /// Invokes pass-through handlers registered for `kind`. Returns how many ran.
    pub fn fire(&mut self, kind: &EventKind, event: &MarkerEvent) -> usize {
        match self.passthrough.get_mut(kind) {
            Some(handlers) => {
                for handler in handlers.iter_mut() {
                    handler(event);
                }
                handlers.len()
            }
            None => 0,
        }
    }

    pub fn has_fallback(&self, kind: &EventKind) -> bool {
        self.fallbacks.contains_key(kind)
    }

    pub fn hovered(&self) -> Option<&MarkerRef> {
        self.hovered.as_ref()
    }

    /// Resolves a click. Returns the hit marker.
    pub fn handle_click(&mut self, store: &MarkerStore, pointer: &mut PointerEvent) -> Option<MarkerRef> {
        let entry = hit_test(store, pointer.container_point)?;
        pointer.stop_propagation();

        let target = entry.data.clone();
        let event = MarkerEvent {
            kind: EventKind::Click,
            target: Some(target.clone()),
            container_point: entry.bounds.center().round(),
            original_point: pointer.container_point,
        };
        self.deliver(&target, &event);
        Some(target)
    }

    /// Tracks hover across pointer moves, raising `mouseout`/`mouseover`.
    pub fn handle_move<S: Surface + ?Sized>(
        &mut self,
        store: &MarkerStore,
        surface: &mut S,
        pointer: &mut PointerEvent,
    ) {
        let raw = pointer.container_point;
        let hit = hit_test(store, raw).map(|entry| (entry.data.clone(), entry.bounds.center().round()));
        let same = match (&hit, &self.hovered) {
            (Some((marker, _)), Some(hovered)) => marker.id() == hovered.id(),
            (None, None) => true,
            _ => false,
        };

        if !same {
            self.hover_out(surface, raw);
            if let Some((marker, _)) = &hit {
                surface.set_interactive(true);
                self.hovered = Some(marker.clone());
                pointer.stop_propagation();
            }
        }

        if let Some((marker, center)) = hit {
            let event = MarkerEvent {
                kind: EventKind::MouseOver,
                target: Some(marker.clone()),
                container_point: center,
                original_point: raw,
            };
            self.deliver(&marker, &event);
        }
    }

    /// The pointer left the host container.
    pub fn handle_leave<S: Surface + ?Sized>(&mut self, surface: &mut S, pointer: &PointerEvent) {
        self.hover_out(surface, pointer.container_point);
    }

    /// Drops hover state without firing anything.
    pub fn reset(&mut self) {
        self.hovered = None;
    }

    fn hover_out<S: Surface + ?Sized>(&mut self, surface: &mut S, point: Point) {
        let Some(previous) = self.hovered.take() else {
            return;
        };
        surface.set_interactive(false);
        let event = MarkerEvent {
            kind: EventKind::MouseOut,
            target: Some(previous.clone()),
            container_point: point,
            original_point: point,
        };
        self.deliver(&previous, &event);
    }

    fn deliver(&mut self, target: &MarkerRef, event: &MarkerEvent) {
        if target.listens(&event.kind) {
            target.fire(event);
        } else if let Some(fallback) = self.fallbacks.get_mut(&event.kind) {
            fallback(event);
        }
    }
}
