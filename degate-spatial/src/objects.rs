//! Placed logic-model objects and point picking.

use crate::bounding_box::BoundingBox;
use crate::quadtree::QuadTree;
use crate::shape::Spatial;
use parking_lot::RwLock;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Weak};

/// What a placed object is. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Gate,
    GatePort,
    Via,
    Wire,
    Annotation,
    EMarker,
}

impl ObjectKind {
    /// Rank used when several objects lie under the cursor; higher wins.
    ///
    /// Small objects that sit on top of larger ones rank first, so a port is
    /// picked before the gate that contains it.
    pub fn selection_priority(&self) -> u8 {
        match self {
            ObjectKind::EMarker => 5,
            ObjectKind::Via => 4,
            ObjectKind::GatePort => 3,
            ObjectKind::Wire => 2,
            ObjectKind::Annotation => 1,
            ObjectKind::Gate => 0,
        }
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Gate => write!(f, "gate"),
            ObjectKind::GatePort => write!(f, "gate port"),
            ObjectKind::Via => write!(f, "via"),
            ObjectKind::Wire => write!(f, "wire"),
            ObjectKind::Annotation => write!(f, "annotation"),
            ObjectKind::EMarker => write!(f, "emarker"),
        }
    }
}

/// An object placed on a layer.
///
/// The geometry can change after placement; the object is shared as
/// `Arc<PlacedObject>` between the layer's quadtree and the logic model.
/// A port keeps a non-owning handle to its gate, which may already be gone.
#[derive(Debug)]
pub struct PlacedObject {
    id: u64,
    kind: ObjectKind,
    bbox: RwLock<BoundingBox>,
    parent: Option<Weak<PlacedObject>>,
}

impl PlacedObject {
    pub fn new(id: u64, kind: ObjectKind, bbox: BoundingBox) -> Arc<PlacedObject> {
        Arc::new(PlacedObject {
            id,
            kind,
            bbox: RwLock::new(bbox),
            parent: None,
        })
    }

    /// Creates an object attached to `parent`, e.g. a port of a gate.
    pub fn with_parent(
        id: u64,
        kind: ObjectKind,
        bbox: BoundingBox,
        parent: &Arc<PlacedObject>,
    ) -> Arc<PlacedObject> {
        Arc::new(PlacedObject {
            id,
            kind,
            bbox: RwLock::new(bbox),
            parent: Some(Arc::downgrade(parent)),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// The owning object, if there is one and it is still alive.
    pub fn parent(&self) -> Option<Arc<PlacedObject>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Replaces the geometry and returns the previous one.
    pub fn set_bounding_box(&self, bbox: BoundingBox) -> BoundingBox {
        std::mem::replace(&mut *self.bbox.write(), bbox)
    }

    /// Translates the geometry and returns the previous one.
    pub fn shift(&self, delta_x: f64, delta_y: f64) -> BoundingBox {
        let mut bbox = self.bbox.write();
        let old = *bbox;
        bbox.shift(delta_x, delta_y);
        old
    }

    pub fn in_shape(&self, x: f64, y: f64, max_distance: f64) -> bool {
        self.bbox.read().in_shape(x, y, max_distance)
    }
}

impl PartialEq for PlacedObject {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PlacedObject {}

impl Spatial for PlacedObject {
    fn bounding_box(&self) -> BoundingBox {
        *self.bbox.read()
    }
}

/// Quadtree holding the objects of one layer.
pub type LayerIndex = QuadTree<Arc<PlacedObject>>;

/// Moves `object` to `bbox` and keeps `tree` in sync.
///
/// Returns `false` if the object was not indexed under its previous box; its
/// geometry is updated either way.
pub fn reposition(tree: &mut LayerIndex, object: &Arc<PlacedObject>, bbox: BoundingBox) -> bool {
    let old = object.set_bounding_box(bbox);
    tree.notify_shape_change(object, &old)
}

/// Returns the object under `(x, y)` that should be selected, allowing a
/// tolerance of `max_distance`.
///
/// The highest [`selection_priority`](ObjectKind::selection_priority) wins;
/// between equal kinds the smaller object is preferred.
pub fn pick_object_at(
    tree: &LayerIndex,
    x: f64,
    y: f64,
    max_distance: f64,
) -> Option<&Arc<PlacedObject>> {
    let search = BoundingBox::new(x - max_distance, x + max_distance, y - max_distance, y + max_distance);
    tree.region_iter_in(&search)
        .filter(|object| object.in_shape(x, y, max_distance))
        .max_by(|a, b| {
            a.kind()
                .selection_priority()
                .cmp(&b.kind().selection_priority())
                .then_with(|| b.bounding_box().area().total_cmp(&a.bounding_box().area()))
        })
}
