use crate::coords::{Bounds, LatLng, Point};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MARKER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique marker identity, stamped once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(u64);

impl MarkerId {
    fn next() -> Self {
        MarkerId(NEXT_MARKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Caller-assigned tag used for bulk removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        GroupId("0".to_string())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(value: &str) -> Self {
        GroupId(value.to_string())
    }
}

impl From<String> for GroupId {
    fn from(value: String) -> Self {
        GroupId(value)
    }
}

impl From<u32> for GroupId {
    fn from(value: u32) -> Self {
        GroupId(value.to_string())
    }
}

/// Icon metadata for a marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    pub url: String,
    /// Width and height in CSS pixels
    pub size: [f64; 2],
    /// Icon pixel placed on the marker position; defaults to the center
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<[f64; 2]>,
}

impl Icon {
    pub fn new(url: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            url: url.into(),
            size: [width, height],
            anchor: None,
        }
    }

    pub fn with_anchor(mut self, x: f64, y: f64) -> Self {
        self.anchor = Some([x, y]);
        self
    }

    pub fn half_extent(&self) -> Point {
        Point::new(self.size[0] / 2.0, self.size[1] / 2.0)
    }

    pub fn anchor_point(&self) -> Point {
        self.anchor.map(Point::from).unwrap_or_else(|| self.half_extent())
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("icon url is empty".to_string());
        }
        let [width, height] = self.size;
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(format!("icon size {}x{} is not a positive finite size", width, height));
        }
        if let Some(anchor) = self.anchor {
            if !Point::from(anchor).is_finite() {
                return Err("icon anchor is not finite".to_string());
            }
        }
        Ok(())
    }
}

/// Event types a marker or layer can listen for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    MouseOver,
    MouseOut,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Click => "click",
            EventKind::MouseOver => "mouseover",
            EventKind::MouseOut => "mouseout",
            EventKind::Other(name) => name,
        }
    }

    /// Whether the layer resolves this event itself through the hit test.
    pub fn is_pointer(&self) -> bool {
        !matches!(self, EventKind::Other(_))
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "click" => EventKind::Click,
            "mouseover" => EventKind::MouseOver,
            "mouseout" => EventKind::MouseOut,
            other => EventKind::Other(other.to_string()),
        })
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthetic event raised for a marker.
#[derive(Debug, Clone)]
pub struct MarkerEvent {
    pub kind: EventKind,
    pub target: Option<MarkerRef>,
    /// Center of the hit marker's box, rounded, when there is a target
    pub container_point: Point,
    /// Pointer position as reported by the host
    pub original_point: Point,
}

pub type Listener = Rc<dyn Fn(&MarkerEvent)>;

pub type MarkerRef = Rc<Marker>;

/// A point marker. The layer only reads its position and icon.
pub struct Marker {
    id: MarkerId,
    position: LatLng,
    icon: Option<Icon>,
    listeners: RefCell<HashMap<EventKind, Vec<Listener>>>,
}

impl Marker {
    pub fn new(position: LatLng, icon: Icon) -> MarkerRef {
        Self::build(position, Some(icon))
    }

    /// A marker without icon metadata. Layers reject these.
    pub fn without_icon(position: LatLng) -> MarkerRef {
        Self::build(position, None)
    }

    fn build(position: LatLng, icon: Option<Icon>) -> MarkerRef {
        Rc::new(Self {
            id: MarkerId::next(),
            position,
            icon,
            listeners: RefCell::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> MarkerId {
        self.id
    }

    pub fn position(&self) -> LatLng {
        self.position
    }

    pub fn icon(&self) -> Option<&Icon> {
        self.icon.as_ref()
    }

    /// Geo-index box: the degenerate box at `(lng, lat)`.
    pub fn geo_bounds(&self) -> Bounds {
        Bounds::from_point(self.position.to_point())
    }

    /// Icon footprint centered on a projected container point.
    pub fn screen_bounds(&self, container_point: Point) -> Option<Bounds> {
        self.icon
            .as_ref()
            .map(|icon| Bounds::centered(container_point, icon.half_extent()))
    }

    /// Pixels the icon covers when drawn for `container_point`: the icon box
    /// placed so its anchor lands on the point.
    pub fn draw_bounds(&self, container_point: Point) -> Option<Bounds> {
        self.icon.as_ref().map(|icon| {
            let min = container_point - icon.anchor_point();
            Bounds::from_corners(min, min + Point::from(icon.size))
        })
    }

    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&MarkerEvent) + 'static,
    {
        self.listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push(Rc::new(listener));
    }

    pub fn off(&self, kind: &EventKind) {
        self.listeners.borrow_mut().remove(kind);
    }

    pub fn listens(&self, kind: &EventKind) -> bool {
        self.listeners
            .borrow()
            .get(kind)
            .map_or(false, |listeners| !listeners.is_empty())
    }

    /// Invokes every listener registered for `event.kind`, returning how many ran.
    pub fn fire(&self, event: &MarkerEvent) -> usize {
        // Listeners may register further listeners, so run them outside the borrow
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub(crate) fn check(&self) -> Result<&Icon, String> {
        if !self.position.is_finite() {
            return Err(format!(
                "position ({}, {}) is not finite",
                self.position.lat, self.position.lng
            ));
        }
        let icon = self.icon.as_ref().ok_or_else(|| "marker has no icon".to_string())?;
        icon.check()?;
        Ok(icon)
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Marker")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("icon", &self.icon)
            .finish_non_exhaustive()
    }
}
