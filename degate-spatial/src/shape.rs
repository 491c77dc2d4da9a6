//! Shapes that can be placed in a [`QuadTree`](crate::QuadTree).

use crate::bounding_box::BoundingBox;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Arc;

/// Anything with an axis-aligned extent on a layer.
///
/// The quadtree only ever looks at the bounding box, so an element type
/// needs nothing beyond this trait (and `PartialEq` for removal).
pub trait Spatial {
    fn bounding_box(&self) -> BoundingBox;
}

impl<T: Spatial + ?Sized> Spatial for &T {
    fn bounding_box(&self) -> BoundingBox {
        (**self).bounding_box()
    }
}

impl<T: Spatial + ?Sized> Spatial for Box<T> {
    fn bounding_box(&self) -> BoundingBox {
        (**self).bounding_box()
    }
}

impl<T: Spatial + ?Sized> Spatial for Rc<T> {
    fn bounding_box(&self) -> BoundingBox {
        (**self).bounding_box()
    }
}

impl<T: Spatial + ?Sized> Spatial for Arc<T> {
    fn bounding_box(&self) -> BoundingBox {
        (**self).bounding_box()
    }
}

impl Spatial for BoundingBox {
    fn bounding_box(&self) -> BoundingBox {
        *self
    }
}

/// An axis-aligned rectangle shape, the geometry of gates, vias and annotations.
#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Rectangle {
    bbox: BoundingBox,
}

impl Rectangle {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Rectangle {
        Rectangle {
            bbox: BoundingBox::new(min_x, max_x, min_y, max_y),
        }
    }

    pub fn from_bounding_box(bbox: BoundingBox) -> Rectangle {
        Rectangle { bbox }
    }

    pub fn min_x(&self) -> f64 {
        self.bbox.min_x()
    }

    pub fn max_x(&self) -> f64 {
        self.bbox.max_x()
    }

    pub fn min_y(&self) -> f64 {
        self.bbox.min_y()
    }

    pub fn max_y(&self) -> f64 {
        self.bbox.max_y()
    }

    pub fn width(&self) -> f64 {
        self.bbox.width()
    }

    pub fn height(&self) -> f64 {
        self.bbox.height()
    }

    /// Point test with a tolerance band of `max_distance` around the rectangle.
    pub fn in_shape(&self, x: f64, y: f64, max_distance: f64) -> bool {
        self.bbox.in_shape(x, y, max_distance)
    }

    /// True if the rectangle lies completely inside `bbox`.
    pub fn in_bounding_box(&self, bbox: &BoundingBox) -> bool {
        bbox.min_x() <= self.min_x()
            && bbox.max_x() >= self.max_x()
            && bbox.min_y() <= self.min_y()
            && bbox.max_y() >= self.max_y()
    }

    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.bbox.intersects(&other.bbox)
    }

    pub fn shift(&mut self, delta_x: f64, delta_y: f64) {
        self.bbox.shift(delta_x, delta_y);
    }

    pub fn set_position(&mut self, min_x: f64, max_x: f64, min_y: f64, max_y: f64) {
        self.bbox = BoundingBox::new(min_x, max_x, min_y, max_y);
    }
}

impl Spatial for Rectangle {
    fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }
}
