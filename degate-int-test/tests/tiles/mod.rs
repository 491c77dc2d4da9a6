//! Tile storage integration tests.
//!
//! These tests run tile caches against real files in a scratch directory,
//! with the global memory budget shared between images.

mod memory_map_test;
mod tile_cache_test;
mod tile_image_test;
