//! Pixel access to a tiled image.

use crate::error::TileResult;
use crate::global_tile_cache::GlobalTileCache;
use crate::pixel::{Pixel, RgbaPixel};
use crate::tile_cache::{BlankTileLoader, ImageTileLoader, StoreTileLoader, TileCache};
use degate::config::DegateConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// An image addressed in global pixel coordinates and stored in tiles.
///
/// Every access goes through the [`TileCache`], which loads and evicts
/// tiles as needed. Pixels outside the image read as zero and writes to
/// them are dropped; the same holds while a tile is still loading in the
/// background. Whole-image operations wait for every tile instead.
///
/// # Examples
///
/// ```rust
/// use degate::config::{DegateConfig, TileStorage};
/// use degate_tiles::{GlobalTileCache, TileImage};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DegateConfig::new();
/// config.set_tile_storage(TileStorage::Heap);
/// let global = Arc::new(GlobalTileCache::<f32>::from_config(&config));
///
/// let image = TileImage::blank(500, 300, global, &config)?;
/// image.set_pixel(499, 299, 0.5)?;
/// assert_eq!(image.get_pixel(499, 299)?, 0.5);
/// assert_eq!(image.get_pixel(0, 0)?, 0.0);
/// # Ok(())
/// # }
/// ```
pub struct TileImage<P: Pixel> {
    cache: TileCache<P>,
    width: u32,
    height: u32,
}

impl<P: Pixel> TileImage<P> {
    /// Wraps an existing cache; the image size is the loader's extent.
    pub fn new(cache: TileCache<P>) -> TileImage<P> {
        let (width, height) = cache.extent();
        TileImage { cache, width, height }
    }

    /// A new zeroed image whose tiles use the configured storage.
    pub fn blank(
        width: u32,
        height: u32,
        global: Arc<GlobalTileCache<P>>,
        config: &DegateConfig,
    ) -> TileResult<TileImage<P>> {
        let loader = BlankTileLoader::new(width, height, config)?;
        Ok(TileImage::new(TileCache::new(Arc::new(loader), global, config)?))
    }

    /// An image kept in a tile store directory. Written pixels persist.
    pub fn from_store(
        directory: impl Into<PathBuf>,
        width: u32,
        height: u32,
        global: Arc<GlobalTileCache<P>>,
        config: &DegateConfig,
    ) -> TileResult<TileImage<P>> {
        let loader = StoreTileLoader::open(directory, width, height)?;
        Ok(TileImage::new(TileCache::new(Arc::new(loader), global, config)?))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_cache(&self) -> &TileCache<P> {
        &self.cache
    }

    #[inline]
    fn offset(&self, coordinate: u32) -> u32 {
        coordinate & (self.cache.tile_size() - 1)
    }

    /// Reads the pixel at `(x, y)`.
    pub fn get_pixel(&self, x: u32, y: u32) -> TileResult<P> {
        let tile = self.cache.get_tile(x, y)?;
        let value = tile.read().get(self.offset(x), self.offset(y));
        Ok(value)
    }

    /// Writes the pixel at `(x, y)`. Ignored outside the image.
    pub fn set_pixel(&self, x: u32, y: u32, value: P) -> TileResult<()> {
        let tile = self.cache.get_tile(x, y)?;
        if self.cache.is_placeholder(&tile) {
            log::trace!("Dropping write to ({}, {}), tile not available", x, y);
            return Ok(());
        }
        tile.write().set(self.offset(x), self.offset(y), value);
        Ok(())
    }

    /// Sets every pixel to `f(x, y)`, one tile at a time. Tiles are loaded
    /// on the calling thread, so every pixel is written even when the cache
    /// loads asynchronously.
    pub fn fill_from_fn<F>(&self, mut f: F) -> TileResult<()>
    where
        F: FnMut(u32, u32) -> P,
    {
        let tile_size = self.cache.tile_size();
        for tile_y in 0..self.height.div_ceil(tile_size) {
            for tile_x in 0..self.width.div_ceil(tile_size) {
                let tile = self.cache.load_tile_blocking(tile_x, tile_y, true)?;
                if self.cache.is_placeholder(&tile) {
                    continue;
                }
                let origin_x = tile_x * tile_size;
                let origin_y = tile_y * tile_size;
                let mut tile = tile.write();
                for y in 0..tile_size.min(self.height - origin_y) {
                    for x in 0..tile_size.min(self.width - origin_x) {
                        tile.set(x, y, f(origin_x + x, origin_y + y));
                    }
                }
            }
        }
        Ok(())
    }

    /// Copies the whole image into `buffer`, row by row, waiting for tiles
    /// that are still loading.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is smaller than `width * height` pixels.
    pub fn copy_to_buffer(&self, buffer: &mut [P]) -> TileResult<()> {
        let width = self.width as usize;
        let needed = width * self.height as usize;
        assert!(
            buffer.len() >= needed,
            "buffer of {} pixels is too small, {} needed",
            buffer.len(),
            needed
        );

        let tile_size = self.cache.tile_size();
        for tile_y in 0..self.height.div_ceil(tile_size) {
            for tile_x in 0..self.width.div_ceil(tile_size) {
                let tile = self.cache.load_tile_blocking(tile_x, tile_y, false)?;
                let tile = tile.read();
                let origin_x = (tile_x * tile_size) as usize;
                let origin_y = tile_y * tile_size;
                let columns = (tile_size as usize).min(width - origin_x);
                for y in 0..tile_size.min(self.height - origin_y) {
                    let start = (origin_y + y) as usize * width + origin_x;
                    buffer[start..start + columns].copy_from_slice(&tile.row(y)[..columns]);
                }
            }
        }
        Ok(())
    }
}

impl TileImage<RgbaPixel> {
    /// A read-mostly view of an image file, decoded on first access. The
    /// decoded image is held under the same budget as the tiles.
    pub fn from_image_file(
        path: impl Into<PathBuf>,
        global: Arc<GlobalTileCache<RgbaPixel>>,
        config: &DegateConfig,
    ) -> TileResult<TileImage<RgbaPixel>> {
        let loader = ImageTileLoader::open(path, Arc::clone(&global), config)?;
        Ok(TileImage::new(TileCache::new(Arc::new(loader), global, config)?))
    }
}
