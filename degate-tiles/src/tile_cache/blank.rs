use super::loader::{TileFactory, TileLoader};
use crate::error::TileResult;
use crate::memory_map::MemoryMap;
use crate::pixel::Pixel;
use degate::config::DegateConfig;

/// Loader for a new, empty image: every tile starts out zeroed.
///
/// With [`TileStorage::TempFile`](degate::config::TileStorage::TempFile)
/// storage, pixels written to a tile survive its eviction. With heap
/// storage an evicted tile is reloaded zeroed, so heap-backed blank images
/// need a budget that holds all of their tiles.
pub struct BlankTileLoader {
    width: u32,
    height: u32,
    factory: TileFactory,
}

impl BlankTileLoader {
    /// Tiles are created with the storage configured in `config`.
    pub fn new(width: u32, height: u32, config: &DegateConfig) -> TileResult<BlankTileLoader> {
        Ok(BlankTileLoader {
            width,
            height,
            factory: TileFactory::from_config(config)?,
        })
    }
}

impl<P: Pixel> TileLoader<P> for BlankTileLoader {
    fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn load_tile(&self, tile_x: u32, tile_y: u32, tile_size: u32) -> TileResult<Option<MemoryMap<P>>> {
        log::trace!(
            "Creating blank {} tile ({}, {}) in {:?} storage",
            P::NAME,
            tile_x,
            tile_y,
            self.factory.storage()
        );
        self.factory.create(tile_x, tile_y, tile_size).map(Some)
    }
}
