//! Dynamic quadtree over layer coordinates.
//!
//! The tree stores every element in the deepest node whose region fully
//! contains the element's bounding box. A leaf that fills up splits into
//! four quadrants and pushes its elements down; a node whose quadrants
//! become empty again folds them back in.

mod region_iter;

pub use region_iter::RegionIter;

use crate::bounding_box::BoundingBox;
use crate::shape::Spatial;
use degate::common::{DEFAULT_QUADTREE_MAX_ENTRIES, DEFAULT_QUADTREE_MIN_SIZE};

const NW: usize = 0;
const NE: usize = 1;
const SW: usize = 2;
const SE: usize = 3;

/// An element together with the box it was indexed under.
#[derive(Debug)]
pub(crate) struct Entry<T> {
    pub(crate) bbox: BoundingBox,
    pub(crate) object: T,
}

/// A quadtree node. The root is an ordinary node.
///
/// Elements are located by the bounding box they were inserted with, so an
/// element whose shape changes must be moved with
/// [`notify_shape_change`](QuadTree::notify_shape_change), passing the box
/// it had before the change.
///
/// The tree has no internal locking; share it behind a lock if needed.
///
/// # Examples
///
/// ```rust
/// use degate_spatial::{BoundingBox, QuadTree};
///
/// let mut tree = QuadTree::new(BoundingBox::new(0.0, 1000.0, 0.0, 1000.0), 4);
/// for i in 0..8 {
///     let offset = i as f64 * 100.0;
///     tree.insert(BoundingBox::new(offset, offset + 10.0, offset, offset + 10.0));
/// }
/// assert_eq!(tree.total_size(), 8);
///
/// let hits = tree.region_iter_in(&BoundingBox::new(180.0, 320.0, 180.0, 320.0)).count();
/// assert_eq!(hits, 2);
/// ```
#[derive(Debug)]
pub struct QuadTree<T> {
    bbox: BoundingBox,
    children: Vec<Entry<T>>,
    subtree_nodes: Option<Box<[QuadTree<T>; 4]>>,
    max_entries: usize,
    bbox_min_size: f64,
}

impl<T: Spatial + PartialEq> Default for QuadTree<T> {
    fn default() -> Self {
        QuadTree::new(BoundingBox::default(), DEFAULT_QUADTREE_MAX_ENTRIES)
    }
}

impl<T: Spatial + PartialEq> QuadTree<T> {
    /// Creates an empty tree covering `bbox`. Leaves split once they hold
    /// `max_entries` elements.
    ///
    /// # Panics
    ///
    /// Panics if `max_entries` is zero.
    pub fn new(bbox: BoundingBox, max_entries: usize) -> QuadTree<T> {
        assert!(max_entries > 0, "quadtree nodes must hold at least one entry");
        QuadTree {
            bbox,
            children: Vec::new(),
            subtree_nodes: None,
            max_entries,
            bbox_min_size: DEFAULT_QUADTREE_MIN_SIZE,
        }
    }

    /// Nodes narrower or lower than `min_size` are never split.
    pub fn with_min_size(mut self, min_size: f64) -> QuadTree<T> {
        self.bbox_min_size = min_size;
        self
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Inserts `object` under its current bounding box.
    pub fn insert(&mut self, object: T) {
        let bbox = object.bounding_box();
        self.insert_with_bbox(object, &bbox);
    }

    /// Inserts `object` under `bbox`. Inserting the same object twice
    /// stores it twice.
    ///
    /// Objects lying (partly) outside the tree's region are kept at the root.
    ///
    /// # Panics
    ///
    /// Panics if `bbox` has a NaN coordinate.
    pub fn insert_with_bbox(&mut self, object: T, bbox: &BoundingBox) {
        assert!(!bbox.has_nan(), "cannot index an object with bounding box {}", bbox);
        self.insert_entry(Entry { bbox: *bbox, object });
    }

    fn insert_entry(&mut self, entry: Entry<T>) {
        if let Some(nodes) = self.subtree_nodes.as_deref_mut() {
            match nodes.iter_mut().find(|node| entry.bbox.in_bounding_box(&node.bbox)) {
                Some(node) => node.insert_entry(entry),
                None => self.children.push(entry),
            }
            return;
        }

        if self.children.len() >= self.max_entries && self.is_splittable() {
            self.split();
            self.insert_entry(entry);
        } else {
            self.children.push(entry);
        }
    }

    fn is_splittable(&self) -> bool {
        self.bbox.width() > self.bbox_min_size && self.bbox.height() > self.bbox_min_size
    }

    fn split(&mut self) {
        let half_width = (self.bbox.width() / 2.0).floor();
        let half_height = (self.bbox.height() / 2.0).floor();
        let (min_x, max_x) = (self.bbox.min_x(), self.bbox.max_x());
        let (min_y, max_y) = (self.bbox.min_y(), self.bbox.max_y());
        let center_x = min_x + half_width;
        let center_y = min_y + half_height;

        let mut quadrants = [
            BoundingBox::default(),
            BoundingBox::default(),
            BoundingBox::default(),
            BoundingBox::default(),
        ];
        quadrants[NW] = BoundingBox::new(min_x, center_x, min_y, center_y);
        quadrants[NE] = BoundingBox::new(center_x + 1.0, max_x, min_y, center_y);
        quadrants[SW] = BoundingBox::new(min_x, center_x, center_y + 1.0, max_y);
        quadrants[SE] = BoundingBox::new(center_x + 1.0, max_x, center_y + 1.0, max_y);

        log::trace!("Splitting quadtree node {} holding {} entries", self.bbox, self.children.len());

        let (max_entries, bbox_min_size) = (self.max_entries, self.bbox_min_size);
        self.subtree_nodes = Some(Box::new(quadrants.map(|bbox| QuadTree {
            bbox,
            children: Vec::new(),
            subtree_nodes: None,
            max_entries,
            bbox_min_size,
        })));

        for entry in std::mem::take(&mut self.children) {
            self.insert_entry(entry);
        }
    }

    /// Removes one occurrence of `object`, located by its current bounding box.
    ///
    /// Returns `false` if it was not found there.
    pub fn remove(&mut self, object: &T) -> bool {
        let bbox = object.bounding_box();
        self.remove_with_bbox(object, &bbox)
    }

    /// Removes one occurrence of `object`, located by the box it was inserted with.
    pub fn remove_with_bbox(&mut self, object: &T, bbox: &BoundingBox) -> bool {
        self.take(object, bbox).is_some()
    }

    /// Moves `object` from the place it was indexed under `old_bbox` to the
    /// place its current bounding box belongs.
    ///
    /// Returns `false` and leaves the tree unchanged if the object is not
    /// found under `old_bbox`.
    pub fn notify_shape_change(&mut self, object: &T, old_bbox: &BoundingBox) -> bool {
        match self.take(object, old_bbox) {
            Some(entry) => {
                self.insert(entry.object);
                true
            }
            None => {
                log::warn!("Object not found under its previous bounding box {}, not reindexed", old_bbox);
                false
            }
        }
    }

    fn take(&mut self, object: &T, bbox: &BoundingBox) -> Option<Entry<T>> {
        let child = self
            .subtree_nodes
            .as_deref_mut()
            .and_then(|nodes| nodes.iter_mut().find(|node| bbox.in_bounding_box(&node.bbox)));

        let taken = match child {
            Some(node) => node.take(object, bbox),
            None => self
                .children
                .iter()
                .position(|entry| &entry.object == object)
                .map(|pos| self.children.remove(pos)),
        };

        if taken.is_some() {
            self.collapse_if_empty();
        }
        taken
    }

    fn collapse_if_empty(&mut self) {
        let empty = self
            .subtree_nodes
            .as_deref()
            .is_some_and(|nodes| nodes.iter().all(|node| node.total_size() == 0));
        if !empty {
            return;
        }

        if let Some(nodes) = self.subtree_nodes.take() {
            let mut held = Vec::new();
            for node in *nodes {
                node.drain_into(&mut held);
            }
            for entry in held {
                self.insert_entry(entry);
            }
        }
    }

    fn drain_into(self, held: &mut Vec<Entry<T>>) {
        held.extend(self.children);
        if let Some(nodes) = self.subtree_nodes {
            for node in *nodes {
                node.drain_into(held);
            }
        }
    }

    /// Drops every element and the whole subdivision.
    pub fn clear(&mut self) {
        self.children.clear();
        self.subtree_nodes = None;
    }

    /// Number of elements in this node and all of its descendants.
    pub fn total_size(&self) -> usize {
        let below: usize = self
            .subtree_nodes
            .as_deref()
            .map_or(0, |nodes| nodes.iter().map(QuadTree::total_size).sum());
        self.children.len() + below
    }

    /// Number of levels; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .subtree_nodes
            .as_deref()
            .map_or(0, |nodes| nodes.iter().map(QuadTree::depth).max().unwrap_or(0))
    }

    pub fn is_empty(&self) -> bool {
        self.total_size() == 0
    }

    /// True if this node has not been split.
    pub fn is_leaf(&self) -> bool {
        self.subtree_nodes.is_none()
    }

    /// Iterates over every element.
    pub fn region_iter(&self) -> RegionIter<'_, T> {
        RegionIter::new(self, None)
    }

    /// Iterates over the elements whose bounding box intersects `region`.
    pub fn region_iter_in(&self, region: &BoundingBox) -> RegionIter<'_, T> {
        RegionIter::new(self, Some(*region))
    }

    /// An exhausted iterator, equal to any region iterator that has run to its end.
    pub fn region_iter_end(&self) -> RegionIter<'_, T> {
        RegionIter::end()
    }

    /// Elements whose bounding box contains the point `(x, y)`.
    pub fn find_at(&self, x: f64, y: f64) -> Vec<&T> {
        let point = BoundingBox::new(x, x, y, y);
        self.region_iter_in(&point).collect()
    }

    pub(crate) fn entries(&self) -> &[Entry<T>] {
        &self.children
    }

    pub(crate) fn subtree_nodes(&self) -> Option<&[QuadTree<T>; 4]> {
        self.subtree_nodes.as_deref()
    }
}

impl<T: Spatial + PartialEq> Extend<T> for QuadTree<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for object in iter {
            self.insert(object);
        }
    }
}

impl<'a, T: Spatial + PartialEq> IntoIterator for &'a QuadTree<T> {
    type Item = &'a T;
    type IntoIter = RegionIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.region_iter()
    }
}
