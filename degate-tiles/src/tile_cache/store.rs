use super::loader::TileLoader;
use crate::error::TileResult;
use crate::memory_map::{ensure_directory, MemoryMap};
use crate::pixel::Pixel;
use degate::common::TILE_FILE_EXTENSION;
use std::path::{Path, PathBuf};

/// Loader for a pre-tiled image store.
///
/// Each tile is one file named `{tile_x}_{tile_y}.dat` holding
/// `tile_size * tile_size` pixels in row-major order. Files are mapped
/// directly; missing tiles are created zero-filled and stay on disk.
pub struct StoreTileLoader {
    directory: PathBuf,
    width: u32,
    height: u32,
}

impl StoreTileLoader {
    /// Opens the store in `directory`, creating the directory if needed.
    pub fn open(directory: impl Into<PathBuf>, width: u32, height: u32) -> TileResult<StoreTileLoader> {
        let directory = directory.into();
        ensure_directory(&directory)?;
        Ok(StoreTileLoader {
            directory,
            width,
            height,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File holding the tile at the given tile indices.
    pub fn tile_path(&self, tile_x: u32, tile_y: u32) -> PathBuf {
        self.directory
            .join(format!("{}_{}.{}", tile_x, tile_y, TILE_FILE_EXTENSION))
    }
}

impl<P: Pixel> TileLoader<P> for StoreTileLoader {
    fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn load_tile(&self, tile_x: u32, tile_y: u32, tile_size: u32) -> TileResult<Option<MemoryMap<P>>> {
        let path = self.tile_path(tile_x, tile_y);
        MemoryMap::persistent_file(tile_size, tile_size, &path).map(Some)
    }
}
