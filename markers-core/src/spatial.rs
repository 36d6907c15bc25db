/*!
# Spatial Index

Bulk-loadable, mutable R-tree over boxed entries. The marker store keeps two
of these: one over geographic positions and one over on-screen icon boxes.

Search order is whatever the tree yields; it is stable for a fixed tree state
but changes after inserts, removals and repacking.
*/

use crate::coords::Bounds;
use rstar::{Envelope, RTree, RTreeObject, SelectionFunction, AABB};

/// A bounding box plus the payload it indexes.
#[derive(Debug, Clone)]
pub struct IndexedEntry<D> {
    pub bounds: Bounds,
    pub data: D,
}

impl<D> IndexedEntry<D> {
    pub fn new(bounds: Bounds, data: D) -> Self {
        Self { bounds, data }
    }
}

impl<D> RTreeObject for IndexedEntry<D> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bounds.to_aabb()
    }
}

/// How a bulk load was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkLoad {
    /// The tree was rebuilt in one packed pass
    Packed,
    /// Entries were inserted one at a time into the existing tree
    Inserted,
    /// Nothing to load
    Empty,
}

/// Descends only into nodes that could hold `probe` and picks the first leaf
/// accepted by `equals`.
struct MatchingEntry<F> {
    probe: AABB<[f64; 2]>,
    equals: F,
}

impl<D, F> SelectionFunction<IndexedEntry<D>> for MatchingEntry<F>
where
    F: Fn(&IndexedEntry<D>) -> bool,
{
    fn should_unpack_parent(&self, envelope: &AABB<[f64; 2]>) -> bool {
        envelope.contains_envelope(&self.probe)
    }

    fn should_unpack_leaf(&self, leaf: &IndexedEntry<D>) -> bool {
        leaf.envelope().contains_envelope(&self.probe) && (self.equals)(leaf)
    }
}

pub struct SpatialIndex<D> {
    tree: RTree<IndexedEntry<D>>,
}

impl<D: Clone> Default for SpatialIndex<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Clone> SpatialIndex<D> {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn insert(&mut self, entry: IndexedEntry<D>) {
        self.tree.insert(entry);
    }

    /// Adds a batch of entries. An empty tree, or a batch at least as large as
    /// the current tree, is packed in one pass together with any existing
    /// entries; smaller batches are inserted individually.
    pub fn bulk_load(&mut self, entries: Vec<IndexedEntry<D>>) -> BulkLoad {
        if entries.is_empty() {
            return BulkLoad::Empty;
        }
        if self.is_empty() {
            self.tree = RTree::bulk_load(entries);
            return BulkLoad::Packed;
        }
        if entries.len() < self.len() {
            for entry in entries {
                self.tree.insert(entry);
            }
            return BulkLoad::Inserted;
        }
        let mut all = self.drain();
        all.extend(entries);
        self.tree = RTree::bulk_load(all);
        BulkLoad::Packed
    }

    /// All entries whose bounds intersect `bounds`, edges inclusive.
    pub fn search(&self, bounds: &Bounds) -> Vec<&IndexedEntry<D>> {
        self.tree
            .locate_in_envelope_intersecting(&bounds.to_aabb())
            .collect()
    }

    /// Removes the first entry covering `probe` for which `equals` holds.
    pub fn remove<F>(&mut self, probe: &Bounds, equals: F) -> Option<IndexedEntry<D>>
    where
        F: Fn(&IndexedEntry<D>) -> bool,
    {
        self.tree.remove_with_selection_function(MatchingEntry {
            probe: probe.to_aabb(),
            equals,
        })
    }

    pub fn all(&self) -> Vec<&IndexedEntry<D>> {
        self.tree.iter().collect()
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }

    /// Swaps the whole contents for `entries`.
    pub fn replace(&mut self, entries: Vec<IndexedEntry<D>>) {
        self.clear();
        self.bulk_load(entries);
    }

    /// Drains and repacks the tree.
    pub fn flatten(&mut self) {
        let entries = self.drain();
        if !entries.is_empty() {
            self.tree = RTree::bulk_load(entries);
        }
    }

    fn drain(&mut self) -> Vec<IndexedEntry<D>> {
        let tree = std::mem::replace(&mut self.tree, RTree::new());
        tree.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Point;

    fn point_entry(x: f64, y: f64, id: u32) -> IndexedEntry<u32> {
        IndexedEntry::new(Bounds::from_point(Point::new(x, y)), id)
    }

    fn ids(entries: Vec<&IndexedEntry<u32>>) -> Vec<u32> {
        let mut ids: Vec<u32> = entries.into_iter().map(|e| e.data).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn test_search_returns_intersecting_entries() {
        let mut index = SpatialIndex::new();
        index.bulk_load(vec![
            point_entry(1.0, 1.0, 1),
            point_entry(5.0, 5.0, 2),
            point_entry(9.0, 9.0, 3),
        ]);

        let found = index.search(&Bounds::new(0.0, 0.0, 5.0, 5.0));
        assert_eq!(ids(found), vec![1, 2]);
        assert!(index.search(&Bounds::new(20.0, 20.0, 30.0, 30.0)).is_empty());
    }

    #[test]
    fn test_bulk_load_strategy() {
        let mut index = SpatialIndex::new();
        assert_eq!(index.bulk_load(Vec::new()), BulkLoad::Empty);
        let first: Vec<_> = (0..10).map(|i| point_entry(i as f64, 0.0, i)).collect();
        assert_eq!(index.bulk_load(first), BulkLoad::Packed);

        let small: Vec<_> = (10..12).map(|i| point_entry(i as f64, 0.0, i)).collect();
        assert_eq!(index.bulk_load(small), BulkLoad::Inserted);

        let large: Vec<_> = (12..40).map(|i| point_entry(i as f64, 0.0, i)).collect();
        assert_eq!(index.bulk_load(large), BulkLoad::Packed);
        assert_eq!(index.len(), 40);
    }

    #[test]
    fn test_remove_uses_equality_predicate() {
        let mut index = SpatialIndex::new();
        // Two entries at the same spot; only the matching one goes
        index.insert(point_entry(3.0, 3.0, 7));
        index.insert(point_entry(3.0, 3.0, 8));

        let probe = Bounds::from_point(Point::new(3.0, 3.0));
        let removed = index.remove(&probe, |e| e.data == 8);
        assert_eq!(removed.map(|e| e.data), Some(8));
        assert_eq!(ids(index.all()), vec![7]);

        assert!(index.remove(&probe, |e| e.data == 99).is_none());
        let elsewhere = Bounds::from_point(Point::new(4.0, 4.0));
        assert!(index.remove(&elsewhere, |e| e.data == 7).is_none());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_flatten_keeps_entries() {
        let mut index = SpatialIndex::new();
        for i in 0..50 {
            index.insert(point_entry((i % 7) as f64, (i / 7) as f64, i));
        }
        let query = Bounds::new(1.0, 1.0, 4.0, 4.0);
        let before = ids(index.search(&query));
        index.flatten();
        assert_eq!(ids(index.search(&query)), before);
        assert_eq!(index.len(), 50);
    }

    #[test]
    fn test_replace_and_clear() {
        let mut index = SpatialIndex::new();
        index.bulk_load(vec![point_entry(0.0, 0.0, 1)]);
        index.replace(vec![point_entry(2.0, 2.0, 2), point_entry(3.0, 3.0, 3)]);
        assert_eq!(ids(index.all()), vec![2, 3]);
        index.clear();
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_order_is_stable_for_fixed_tree() {
        let mut index = SpatialIndex::new();
        index.bulk_load((0..100).map(|i| point_entry((i % 10) as f64, (i / 10) as f64, i)).collect());
        let query = Bounds::new(2.0, 2.0, 6.0, 6.0);
        let first: Vec<u32> = index.search(&query).into_iter().map(|e| e.data).collect();
        let second: Vec<u32> = index.search(&query).into_iter().map(|e| e.data).collect();
        assert_eq!(first, second);
    }
}
