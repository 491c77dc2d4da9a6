//! # Degate Spatial - Spatial Indexing for Logic Models
//!
//! This crate provides the spatial index used to find gates, ports, vias,
//! wires and annotations on a layer by location.
//!
//! ## Features
//!
//! - **Dynamic Quadtree**: Leaves split when they fill up and fold back when emptied
//! - **Region Queries**: Lazy iteration over the objects intersecting a rectangle
//! - **Shape Changes**: Objects are moved using the box they were indexed under
//! - **Point Picking**: Selection of the top-most object under the cursor
//!
//! ## Quick Start
//!
//! ```rust
//! use degate_spatial::{pick_object_at, BoundingBox, LayerIndex, ObjectKind, PlacedObject, QuadTree};
//! use std::sync::Arc;
//!
//! let mut layer: LayerIndex = QuadTree::new(BoundingBox::new(0.0, 4096.0, 0.0, 4096.0), 50);
//! let gate = PlacedObject::new(1, ObjectKind::Gate, BoundingBox::new(100.0, 180.0, 100.0, 140.0));
//! let port = PlacedObject::with_parent(
//!     2,
//!     ObjectKind::GatePort,
//!     BoundingBox::new(104.0, 108.0, 104.0, 108.0),
//!     &gate,
//! );
//! layer.insert(Arc::clone(&gate));
//! layer.insert(Arc::clone(&port));
//!
//! let picked = pick_object_at(&layer, 106.0, 106.0, 1.0);
//! assert_eq!(picked.map(|o| o.id()), Some(2));
//! ```

pub mod bounding_box;
pub mod objects;
pub mod quadtree;
pub mod shape;

pub use bounding_box::BoundingBox;
pub use objects::{pick_object_at, reposition, LayerIndex, ObjectKind, PlacedObject};
pub use quadtree::{QuadTree, RegionIter};
pub use shape::{Rectangle, Spatial};
