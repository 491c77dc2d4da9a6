use super::{Entry, QuadTree};
use crate::bounding_box::BoundingBox;
use crate::shape::Spatial;
use std::slice;

/// Lazy traversal over the elements of a [`QuadTree`] whose bounding box
/// intersects a region.
///
/// Nodes still to be visited sit on an open list; quadrants that miss the
/// region are never pushed. The iterator borrows the tree, so the tree
/// cannot change while it is alive. Start a new one to restart.
pub struct RegionIter<'a, T> {
    open_list: Vec<&'a QuadTree<T>>,
    current: slice::Iter<'a, Entry<T>>,
    region: Option<BoundingBox>,
}

impl<'a, T: Spatial + PartialEq> RegionIter<'a, T> {
    pub(crate) fn new(root: &'a QuadTree<T>, region: Option<BoundingBox>) -> RegionIter<'a, T> {
        RegionIter {
            open_list: vec![root],
            current: Default::default(),
            region,
        }
    }

    pub(crate) fn end() -> RegionIter<'a, T> {
        RegionIter {
            open_list: Vec::new(),
            current: Default::default(),
            region: None,
        }
    }

    pub fn region(&self) -> Option<&BoundingBox> {
        self.region.as_ref()
    }
}

impl<'a, T: Spatial + PartialEq> Iterator for RegionIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let region = self.region;
        loop {
            for entry in self.current.by_ref() {
                if region.map_or(true, |region| entry.bbox.intersects(&region)) {
                    return Some(&entry.object);
                }
            }

            let node = self.open_list.pop()?;
            if let Some(nodes) = node.subtree_nodes() {
                for child in nodes.iter().rev() {
                    if region.map_or(true, |region| child.bounding_box().intersects(&region)) {
                        self.open_list.push(child);
                    }
                }
            }
            self.current = node.entries().iter();
        }
    }
}

impl<T> RegionIter<'_, T> {
    fn is_exhausted(&self) -> bool {
        self.open_list.is_empty() && self.current.as_slice().is_empty()
    }
}

impl<T> PartialEq for RegionIter<'_, T> {
    /// Two iterators are equal when they query the same region from the
    /// same position. Every exhausted iterator equals
    /// [`QuadTree::region_iter_end`], whatever its region.
    fn eq(&self, other: &Self) -> bool {
        if self.is_exhausted() && other.is_exhausted() {
            return true;
        }
        let same_nodes = self.open_list.len() == other.open_list.len()
            && self
                .open_list
                .iter()
                .zip(other.open_list.iter())
                .all(|(a, b)| std::ptr::eq(*a, *b));
        let (mine, theirs) = (self.current.as_slice(), other.current.as_slice());
        let same_position =
            mine.len() == theirs.len() && (mine.is_empty() || std::ptr::eq(mine.as_ptr(), theirs.as_ptr()));
        same_nodes && same_position && self.region == other.region
    }
}
