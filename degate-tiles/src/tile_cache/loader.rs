use crate::error::TileResult;
use crate::memory_map::MemoryMap;
use crate::pixel::Pixel;
use degate::common::TILE_FILE_EXTENSION;
use degate::config::{DegateConfig, TileStorage};
use tempfile::TempDir;

/// Source of tile data for a [`TileCache`](super::TileCache).
///
/// Coordinates are tile indices; a loader fills a `tile_size x tile_size`
/// map for the tile, zero-padding whatever lies outside its image.
pub trait TileLoader<P: Pixel>: Send + Sync {
    /// Width and height of the image in pixels, after any scaling.
    fn extent(&self) -> (u32, u32);

    /// Produces the tile, or `None` if the loader has no data for it.
    fn load_tile(&self, tile_x: u32, tile_y: u32, tile_size: u32) -> TileResult<Option<MemoryMap<P>>>;

    /// Whether loads are slow enough to run off the calling thread.
    fn supports_async(&self) -> bool {
        false
    }

    /// Whether the tile overlaps the image at all.
    fn contains_tile(&self, tile_x: u32, tile_y: u32, tile_size: u32) -> bool {
        let (width, height) = self.extent();
        let origin_x = tile_x as u64 * tile_size as u64;
        let origin_y = tile_y as u64 * tile_size as u64;
        origin_x < width as u64 && origin_y < height as u64
    }
}

/// Creates empty tiles with the configured storage.
///
/// Temp-file tiles are named after their tile indices inside a scratch
/// directory below the configured temp directory. A tile created again for
/// the same indices maps the same file and sees what was written before.
/// The scratch directory is removed with the factory.
pub(crate) struct TileFactory {
    storage: TileStorage,
    scratch: Option<TempDir>,
}

impl TileFactory {
    pub(crate) fn from_config(config: &DegateConfig) -> TileResult<TileFactory> {
        let storage = config.tile_storage();
        let scratch = match storage {
            TileStorage::Heap => None,
            TileStorage::TempFile => {
                let base = config.temp_directory();
                crate::memory_map::ensure_directory(&base)?;
                Some(tempfile::Builder::new().prefix("cache_").tempdir_in(&base)?)
            }
        };
        Ok(TileFactory { storage, scratch })
    }

    /// Maps the tile at `(tile_x, tile_y)`. Heap tiles are always new and
    /// zeroed.
    pub(crate) fn create<P: Pixel>(&self, tile_x: u32, tile_y: u32, tile_size: u32) -> TileResult<MemoryMap<P>> {
        match &self.scratch {
            Some(dir) => {
                let path = dir.path().join(format!("{}_{}.{}", tile_x, tile_y, TILE_FILE_EXTENSION));
                MemoryMap::persistent_file(tile_size, tile_size, &path)
            }
            None => Ok(MemoryMap::new(tile_size, tile_size)),
        }
    }

    pub(crate) fn storage(&self) -> TileStorage {
        self.storage
    }

    #[cfg(test)]
    pub(crate) fn scratch_directory(&self) -> Option<&std::path::Path> {
        self.scratch.as_ref().map(TempDir::path)
    }
}
