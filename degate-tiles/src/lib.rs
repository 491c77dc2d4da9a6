//! # Degate Tiles - Tiled Image Storage
//!
//! This crate stores the very large layer images of a Degate project as
//! square tiles that are loaded on demand and evicted under a shared
//! memory budget.
//!
//! ## Features
//!
//! - **Memory Maps**: Tiles on the heap, in temp files or in persistent tile files
//! - **Global Budget**: All caches of a pixel type share one memory ceiling
//! - **LRU Eviction**: The least recently used tile of the least recently active cache goes first
//! - **Background Loading**: Slow sources decode on the worker pool, readers see a placeholder
//! - **Pixel Access**: Global pixel coordinates translated to tile-local ones
//!
//! ## Quick Start
//!
//! ```rust
//! use degate::config::{DegateConfig, TileStorage};
//! use degate_tiles::{GlobalTileCache, RgbaPixel, TileImage};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DegateConfig::new();
//! config.set_tile_storage(TileStorage::Heap);
//! config.set_tile_width_exp(8)?;
//!
//! let global = Arc::new(GlobalTileCache::<RgbaPixel>::from_config(&config));
//! let layer = TileImage::blank(2048, 1024, Arc::clone(&global), &config)?;
//! layer.set_pixel(1000, 700, RgbaPixel::merge_channels(255, 0, 0, 255))?;
//!
//! assert_eq!(layer.get_pixel(1000, 700)?.red(), 255);
//! assert_eq!(global.allocated_memory(), 256 * 256 * 4);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod global_tile_cache;
pub mod memory_map;
pub mod pixel;
pub mod tile_cache;
pub mod tile_image;

pub use error::{TileError, TileResult};
pub use global_tile_cache::{CacheConsumer, ConsumerId, GlobalTileCache};
pub use memory_map::{MemoryMap, StorageKind};
pub use pixel::{BytePixel, GreyscalePixel, Pixel, RgbaPixel};
pub use tile_cache::{
    BlankTileLoader, ImageTileLoader, StoreTileLoader, TileCache, TileHandle, TileLoaded, TileLoader,
};
pub use tile_image::TileImage;
