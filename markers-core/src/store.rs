//! Dual-index marker store
//!
//! Keeps every registered marker in a geo index keyed by `(lng, lat)` and the
//! currently visible ones in a screen index keyed by icon footprint:
//! - the geo index holds each registered marker exactly once
//! - the screen index is replaced wholesale on redraw; between redraws it only
//!   gains markers added while visible and loses removed ones
//! - `dirty` counts geo-index mutations since the last repack; once
//!   `dirty / total` reaches the rebuild ratio, [`MarkerStore::maintain`]
//!   repacks the geo index

use crate::coords::{Bounds, Point};
use crate::error::{MarkerError, MarkerResult};
use crate::image_cache::ImageHandle;
use crate::spatial::{BulkLoad, IndexedEntry, SpatialIndex};
use crate::types::{GroupId, Marker, MarkerId, MarkerRef};
use crate::view::MapView;
use std::collections::HashMap;

pub type MarkerEntry = IndexedEntry<MarkerRef>;

/// Per-marker state the store attaches on registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub marker: MarkerRef,
    pub group: GroupId,
    /// Icon handle, filled on first draw
    pub image: Option<ImageHandle>,
    /// Container point from the last time the marker was placed on screen
    pub screen_position: Option<Point>,
}

/// Result of a single [`MarkerStore::add`].
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// Newly registered; `visible_at` is its container point when it landed
    /// inside the current view
    Inserted { visible_at: Option<Point> },
    /// Already registered under another group; moved to the new one
    Moved { from: GroupId },
    /// Already registered under the same group
    Unchanged,
}

/// Result of [`MarkerStore::add_many`].
#[derive(Debug, Default)]
pub struct BatchReport {
    pub inserted: usize,
    pub moved: usize,
    pub unchanged: usize,
    /// Newly inserted markers inside the current view, with container points
    pub visible: Vec<(MarkerRef, Point)>,
    pub rejected: Vec<MarkerError>,
}

/// Result of [`MarkerStore::remove`].
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub group: GroupId,
    /// Screen footprint when the marker was in the screen index
    pub screen_bounds: Option<Bounds>,
    /// Pixels its icon was drawn over, when it was in the screen index
    pub draw_bounds: Option<Bounds>,
}

struct Prepared {
    geo: MarkerEntry,
    screen: Option<(MarkerEntry, Point)>,
}

pub struct MarkerStore {
    geo: SpatialIndex<MarkerRef>,
    screen: SpatialIndex<MarkerRef>,
    registry: HashMap<MarkerId, Registration>,
    groups: HashMap<GroupId, usize>,
    dirty: usize,
    rebuild_ratio: f64,
}

impl MarkerStore {
    pub fn new(rebuild_ratio: f64) -> Self {
        Self {
            geo: SpatialIndex::new(),
            screen: SpatialIndex::new(),
            registry: HashMap::new(),
            groups: HashMap::new(),
            dirty: 0,
            rebuild_ratio,
        }
    }

    /// Registers one marker, inserting it into the geo index and, when it is
    /// inside `view`, into the screen index.
    pub fn add(
        &mut self,
        marker: MarkerRef,
        group: GroupId,
        view: Option<&dyn MapView>,
    ) -> MarkerResult<AddOutcome> {
        Self::validate(&marker)?;
        if let Some(outcome) = self.reconcile_existing(&marker, &group) {
            return Ok(outcome);
        }

        let prepared = Self::prepare(&marker, view);
        let visible_at = prepared.screen.as_ref().map(|(_, point)| *point);
        self.geo.insert(prepared.geo);
        if let Some((entry, _)) = prepared.screen {
            self.screen.insert(entry);
        }
        self.register(marker, group, visible_at);
        self.dirty += 1;

        Ok(AddOutcome::Inserted { visible_at })
    }

    /// Registers a batch, bulk-loading each index once. Invalid markers are
    /// reported and skipped.
    pub fn add_many<I>(&mut self, markers: I, group: GroupId, view: Option<&dyn MapView>) -> BatchReport
    where
        I: IntoIterator<Item = MarkerRef>,
    {
        let mut report = BatchReport::default();
        let mut geo_entries = Vec::new();
        let mut screen_entries = Vec::new();

        for marker in markers {
            if let Err(err) = Self::validate(&marker) {
                report.rejected.push(err);
                continue;
            }
            match self.reconcile_existing(&marker, &group) {
                Some(AddOutcome::Moved { .. }) => {
                    report.moved += 1;
                    continue;
                }
                Some(_) => {
                    report.unchanged += 1;
                    continue;
                }
                None => {}
            }

            let prepared = Self::prepare(&marker, view);
            let visible_at = prepared.screen.as_ref().map(|(_, point)| *point);
            geo_entries.push(prepared.geo);
            if let Some((entry, point)) = prepared.screen {
                screen_entries.push(entry);
                report.visible.push((marker.clone(), point));
            }
            self.register(marker, group.clone(), visible_at);
            report.inserted += 1;
        }

        self.dirty += geo_entries.len();
        if self.geo.bulk_load(geo_entries) == BulkLoad::Packed {
            // A packed build is already as tight as a repack would make it
            self.dirty = 0;
        }
        self.screen.bulk_load(screen_entries);

        report
    }

    /// Unregisters a marker by identity. Returns `None` when it was never added.
    pub fn remove(&mut self, marker: &Marker) -> Option<Removal> {
        let removal = self.detach(marker.id())?;
        self.leave_group(&removal.group);
        Some(removal)
    }

    /// Removes the group's members (stopping once its recorded count is
    /// reached) and forgets the group. Returns how many markers were removed.
    pub fn remove_group(&mut self, group: &GroupId) -> usize {
        let Some(count) = self.groups.remove(group) else {
            return 0;
        };

        let members: Vec<MarkerId> = self
            .geo
            .all()
            .into_iter()
            .filter(|entry| {
                self.registry
                    .get(&entry.data.id())
                    .map_or(false, |registration| &registration.group == group)
            })
            .take(count)
            .map(|entry| entry.data.id())
            .collect();

        let removed = members
            .into_iter()
            .filter(|id| self.detach(*id).is_some())
            .count();
        log::debug!("Removed {} marker(s) from group {}", removed, group);
        removed
    }

    /// Repacks the geo index once enough mutations have accumulated.
    /// Returns whether a repack happened.
    pub fn maintain(&mut self) -> bool {
        let total = self.total();
        if total == 0 {
            self.dirty = 0;
            return false;
        }
        if (self.dirty as f64) / (total as f64) < self.rebuild_ratio {
            return false;
        }
        log::debug!("Repacking geo index ({} mutations over {} markers)", self.dirty, total);
        self.geo.flatten();
        self.dirty = 0;
        true
    }

    pub fn search_geo(&self, bounds: &Bounds) -> Vec<&MarkerEntry> {
        self.geo.search(bounds)
    }

    /// Replaces the screen index and records each entry's screen position.
    pub fn replace_screen(&mut self, entries: Vec<MarkerEntry>) {
        for entry in &entries {
            if let Some(registration) = self.registry.get_mut(&entry.data.id()) {
                registration.screen_position = Some(entry.bounds.center());
            }
        }
        self.screen.replace(entries);
    }

    /// First screen entry under `point`, in index order.
    pub fn hit(&self, point: Point) -> Option<&MarkerEntry> {
        self.screen.search(&Bounds::from_point(point)).into_iter().next()
    }

    pub fn screen_entries(&self) -> Vec<&MarkerEntry> {
        self.screen.all()
    }

    pub fn geo_entries(&self) -> Vec<&MarkerEntry> {
        self.geo.all()
    }

    pub fn note_image(&mut self, id: MarkerId, image: ImageHandle) {
        if let Some(registration) = self.registry.get_mut(&id) {
            registration.image.get_or_insert(image);
        }
    }

    pub fn registration(&self, id: MarkerId) -> Option<&Registration> {
        self.registry.get(&id)
    }

    pub fn contains(&self, id: MarkerId) -> bool {
        self.registry.contains_key(&id)
    }

    pub fn group_count(&self, group: &GroupId) -> Option<usize> {
        self.groups.get(group).copied()
    }

    /// Number of registered markers.
    pub fn total(&self) -> usize {
        self.registry.len()
    }

    pub fn len(&self) -> usize {
        self.total()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn dirty(&self) -> usize {
        self.dirty
    }

    pub fn visible_len(&self) -> usize {
        self.screen.len()
    }

    pub fn clear(&mut self) {
        self.geo.clear();
        self.screen.clear();
        self.registry.clear();
        self.groups.clear();
        self.dirty = 0;
    }

    fn validate(marker: &Marker) -> MarkerResult<()> {
        marker
            .check()
            .map(|_| ())
            .map_err(|reason| MarkerError::invalid_marker(marker.id(), reason))
    }

    fn prepare(marker: &MarkerRef, view: Option<&dyn MapView>) -> Prepared {
        let geo = IndexedEntry::new(marker.geo_bounds(), marker.clone());
        let screen = view
            .filter(|view| view.bounds().contains(marker.position()))
            .and_then(|view| {
                let point = view.lat_lng_to_container_point(marker.position());
                marker
                    .screen_bounds(point)
                    .map(|bounds| (IndexedEntry::new(bounds, marker.clone()), point))
            });
        Prepared { geo, screen }
    }

    /// Handles re-registration of a known marker; `None` for new markers.
    fn reconcile_existing(&mut self, marker: &Marker, group: &GroupId) -> Option<AddOutcome> {
        let registration = self.registry.get_mut(&marker.id())?;
        if &registration.group == group {
            return Some(AddOutcome::Unchanged);
        }
        let from = std::mem::replace(&mut registration.group, group.clone());
        self.leave_group(&from);
        *self.groups.entry(group.clone()).or_insert(0) += 1;
        Some(AddOutcome::Moved { from })
    }

    fn register(&mut self, marker: MarkerRef, group: GroupId, screen_position: Option<Point>) {
        *self.groups.entry(group.clone()).or_insert(0) += 1;
        self.registry.insert(
            marker.id(),
            Registration {
                marker,
                group,
                image: None,
                screen_position,
            },
        );
    }

    fn leave_group(&mut self, group: &GroupId) {
        if let Some(count) = self.groups.get_mut(group) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.groups.remove(group);
            }
        }
    }

    /// Drops a marker from the registry and both indexes, leaving group
    /// counts to the caller.
    fn detach(&mut self, id: MarkerId) -> Option<Removal> {
        let registration = self.registry.remove(&id)?;
        let marker = &registration.marker;

        if self
            .geo
            .remove(&marker.geo_bounds(), |entry| entry.data.id() == id)
            .is_none()
        {
            log::warn!("Marker {} was registered but missing from the geo index", id);
        }
        self.dirty += 1;

        let on_screen = registration.screen_position.and_then(|point| {
            let bounds = marker.screen_bounds(point)?;
            self.screen
                .remove(&bounds, |entry| entry.data.id() == id)
                .map(|entry| (entry.bounds, marker.draw_bounds(point)))
        });

        Some(Removal {
            group: registration.group,
            screen_bounds: on_screen.map(|(bounds, _)| bounds),
            draw_bounds: on_screen.and_then(|(_, drawn)| drawn),
        })
    }
}
