//! Spatial index integration tests.
//!
//! These tests drive the quadtree through whole-layer workflows: bulk
//! loading, region queries, editing objects in place and picking.

mod layer_index_test;
mod quadtree_scenario_test;
