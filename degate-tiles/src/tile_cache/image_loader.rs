use super::loader::{TileFactory, TileLoader};
use crate::error::{TileError, TileResult};
use crate::global_tile_cache::{CacheConsumer, ConsumerId, GlobalTileCache};
use crate::memory_map::MemoryMap;
use crate::pixel::RgbaPixel;
use degate::config::DegateConfig;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, ImageFormat, ImageReader, RgbaImage};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

/// Loader that cuts tiles out of a regular image file.
///
/// The image is decoded (and scaled down by `scale`) when a tile is first
/// needed. The decoded image is held under the global tile budget like a
/// cache of its own: it is kept for later loads until the budget needs the
/// room, and decoded again on the next load after that. A decoded image that
/// does not fit is used for the one load and dropped.
///
/// Multi-page TIFF files are read from their largest page. Tiles on the
/// right and bottom edge are clipped to the scaled image and zero-padded.
pub struct ImageTileLoader {
    path: PathBuf,
    page: usize,
    scale: u32,
    width: u32,
    height: u32,
    decoded: Arc<DecodedImage>,
    factory: TileFactory,
}

impl ImageTileLoader {
    /// Opens `path` at full resolution.
    pub fn open(
        path: impl Into<PathBuf>,
        global: Arc<GlobalTileCache<RgbaPixel>>,
        config: &DegateConfig,
    ) -> TileResult<ImageTileLoader> {
        ImageTileLoader::open_scaled(path, 1, global, config)
    }

    /// Opens `path`, presenting it reduced by the integer factor `scale`.
    /// Only image headers are read here.
    pub fn open_scaled(
        path: impl Into<PathBuf>,
        scale: u32,
        global: Arc<GlobalTileCache<RgbaPixel>>,
        config: &DegateConfig,
    ) -> TileResult<ImageTileLoader> {
        if scale == 0 {
            return Err(TileError::InvalidOperation("image scale must be at least 1".to_string()));
        }
        let path = path.into();
        let (page, (source_width, source_height)) = select_page(&path)?;
        let width = source_width.div_ceil(scale);
        let height = source_height.div_ceil(scale);

        log::debug!(
            "Opened {} page {} ({}x{}), scale 1/{} gives {}x{}",
            path.display(),
            page,
            source_width,
            source_height,
            scale,
            width,
            height
        );
        let bytes = width as u64 * height as u64 * 4;
        Ok(ImageTileLoader {
            path,
            page,
            scale,
            width,
            height,
            decoded: DecodedImage::new(bytes, global),
            factory: TileFactory::from_config(config)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Index of the page tiles are cut from; zero unless the file has
    /// several pages.
    pub fn page(&self) -> usize {
        self.page
    }

    /// Budget identity of the decoded image.
    pub fn budget_id(&self) -> ConsumerId {
        self.decoded.id
    }

    fn decode(&self) -> TileResult<RgbaImage> {
        let image = if self.page == 0 {
            image::open(&self.path)?.to_rgba8()
        } else {
            decode_tiff_page(&self.path, self.page)?
        };
        if self.scale > 1 {
            return Ok(image::imageops::resize(&image, self.width, self.height, FilterType::Triangle));
        }
        Ok(image)
    }

    fn scaled_image(&self) -> TileResult<Arc<RgbaImage>> {
        let decoded = &self.decoded;
        if let Some(image) = decoded.held() {
            return Ok(image);
        }

        // reserve first so that tiles are evicted before the decode allocates
        let reserved = decoded.global.request_cache_memory(decoded.id, decoded.bytes);
        let image = match self.decode() {
            Ok(image) => Arc::new(image),
            Err(err) => {
                if reserved {
                    decoded.release();
                }
                return Err(err);
            }
        };
        if !reserved {
            log::debug!(
                "No room for {} decoded bytes of {}, dropping the image after this load",
                decoded.bytes,
                self.path.display()
            );
            return Ok(image);
        }
        Ok(decoded.keep(image))
    }
}

impl TileLoader<RgbaPixel> for ImageTileLoader {
    fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn load_tile(&self, tile_x: u32, tile_y: u32, tile_size: u32) -> TileResult<Option<MemoryMap<RgbaPixel>>> {
        if !self.contains_tile(tile_x, tile_y, tile_size) {
            return Ok(None);
        }
        let image = self.scaled_image()?;
        let origin_x = tile_x * tile_size;
        let origin_y = tile_y * tile_size;
        let width = tile_size.min(image.width() - origin_x);
        let height = tile_size.min(image.height() - origin_y);

        let mut tile = self.factory.create::<RgbaPixel>(tile_x, tile_y, tile_size)?;
        for y in 0..height {
            for x in 0..width {
                let pixel = image.get_pixel(origin_x + x, origin_y + y);
                tile.set(x, y, RgbaPixel::from(pixel.0));
            }
        }
        Ok(Some(tile))
    }

    fn supports_async(&self) -> bool {
        true
    }
}

/// Decoded source image, registered with the global cache as a consumer.
struct DecodedImage {
    image: Mutex<Option<Arc<RgbaImage>>>,
    bytes: u64,
    global: Arc<GlobalTileCache<RgbaPixel>>,
    id: ConsumerId,
}

impl DecodedImage {
    fn new(bytes: u64, global: Arc<GlobalTileCache<RgbaPixel>>) -> Arc<DecodedImage> {
        Arc::new_cyclic(|weak: &Weak<DecodedImage>| {
            let consumer: Weak<dyn CacheConsumer> = weak.clone();
            let id = global.register(consumer);
            DecodedImage {
                image: Mutex::new(None),
                bytes,
                global,
                id,
            }
        })
    }

    fn held(&self) -> Option<Arc<RgbaImage>> {
        self.image.lock().clone()
    }

    /// Stores `image` under a reservation already made. If another load
    /// stored one first, that one is returned and the reservation given back.
    fn keep(&self, image: Arc<RgbaImage>) -> Arc<RgbaImage> {
        let mut held = self.image.lock();
        if let Some(existing) = held.as_ref() {
            let existing = Arc::clone(existing);
            drop(held);
            self.release();
            return existing;
        }
        *held = Some(Arc::clone(&image));
        image
    }

    fn release(&self) {
        self.global.release_cache_memory(self.id, self.bytes);
    }
}

impl CacheConsumer for DecodedImage {
    fn cleanup_cache(&self) {
        let dropped = self.image.lock().take();
        if dropped.is_some() {
            log::debug!("Dropping decoded image of {} ({} bytes)", self.id, self.bytes);
            self.release();
        }
    }
}

impl Drop for DecodedImage {
    fn drop(&mut self) {
        if self.image.get_mut().take().is_some() {
            self.release();
        }
        self.global.unregister(self.id);
    }
}

/// Picks the page to read: the largest one of a multi-page TIFF, the only
/// one otherwise. Returns the page index and its dimensions.
fn select_page(path: &Path) -> TileResult<(usize, (u32, u32))> {
    let format = ImageReader::open(path)?.with_guessed_format()?.format();
    if format != Some(ImageFormat::Tiff) {
        return Ok((0, image::image_dimensions(path)?));
    }

    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let area = |(width, height): (u32, u32)| width as u64 * height as u64;
    let mut largest = (0, decoder.dimensions()?);
    let mut page = 0;
    while decoder.more_images() {
        decoder.next_image()?;
        page += 1;
        let dimensions = decoder.dimensions()?;
        if area(dimensions) > area(largest.1) {
            largest = (page, dimensions);
        }
    }
    Ok(largest)
}

fn decode_tiff_page(path: &Path, page: usize) -> TileResult<RgbaImage> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    decoder.seek_to_image(page)?;
    let (width, height) = decoder.dimensions()?;
    let color = decoder.colortype()?;
    let image = match (color, decoder.read_image()?) {
        (ColorType::Gray(8), DecodingResult::U8(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
        (ColorType::GrayA(8), DecodingResult::U8(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLumaA8)
        }
        (ColorType::RGB(8), DecodingResult::U8(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
        }
        (ColorType::RGBA(8), DecodingResult::U8(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgba8)
        }
        (ColorType::Gray(16), DecodingResult::U16(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma16)
        }
        (ColorType::RGB(16), DecodingResult::U16(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgb16)
        }
        (ColorType::RGBA(16), DecodingResult::U16(data)) => {
            ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgba16)
        }
        (color, _) => {
            return Err(TileError::Decode(format!(
                "TIFF page {} of {} has unsupported colour type {:?}",
                page,
                path.display(),
                color
            )))
        }
    };
    image.map(|image| image.to_rgba8()).ok_or_else(|| {
        TileError::Decode(format!(
            "TIFF page {} of {} holds fewer samples than {}x{}",
            page,
            path.display(),
            width,
            height
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use degate::config::TileStorage;
    use image::Rgba;
    use std::io::BufWriter;
    use tempfile::{tempdir, TempDir};
    use tiff::encoder::{colortype, TiffEncoder};

    fn heap_config() -> DegateConfig {
        let config = DegateConfig::new();
        config.set_tile_storage(TileStorage::Heap);
        config
    }

    fn global() -> Arc<GlobalTileCache<RgbaPixel>> {
        Arc::new(GlobalTileCache::with_max_memory(1 << 20))
    }

    struct Idle;

    impl CacheConsumer for Idle {
        fn cleanup_cache(&self) {}
    }

    /// Writes a `width x height` PNG where pixel (x, y) is (x, y, 7, 255).
    fn gradient_png(width: u32, height: u32) -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gradient.png");
        let image = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 7, 255]));
        image.save(&path).unwrap();
        (dir, path)
    }

    #[test]
    fn test_extent_and_flags() {
        let (_dir, path) = gradient_png(40, 20);
        let loader = ImageTileLoader::open(&path, global(), &heap_config()).unwrap();
        assert_eq!(loader.extent(), (40, 20));
        assert_eq!(loader.scale(), 1);
        assert!(loader.supports_async());
        assert_eq!(loader.path(), path.as_path());
    }

    #[test]
    fn test_tile_content_matches_source() {
        let (_dir, path) = gradient_png(40, 20);
        let loader = ImageTileLoader::open(&path, global(), &heap_config()).unwrap();

        let tile = loader.load_tile(1, 0, 16).unwrap().unwrap();
        assert_eq!(tile.get(0, 0).split_channels(), (16, 0, 7, 255));
        assert_eq!(tile.get(3, 5).split_channels(), (19, 5, 7, 255));
    }

    #[test]
    fn test_edge_tile_is_clipped_and_padded() {
        let (_dir, path) = gradient_png(40, 20);
        let loader = ImageTileLoader::open(&path, global(), &heap_config()).unwrap();

        let tile = loader.load_tile(2, 1, 16).unwrap().unwrap();
        // columns 32..40 and rows 16..20 exist
        assert_eq!(tile.get(7, 3).split_channels(), (39, 19, 7, 255));
        assert_eq!(tile.get(8, 3), RgbaPixel::default());
        assert_eq!(tile.get(7, 4), RgbaPixel::default());
    }

    #[test]
    fn test_tile_outside_is_none() {
        let (_dir, path) = gradient_png(40, 20);
        let loader = ImageTileLoader::open(&path, global(), &heap_config()).unwrap();
        assert!(loader.load_tile(3, 0, 16).unwrap().is_none());
        assert!(loader.load_tile(0, 2, 16).unwrap().is_none());
    }

    #[test]
    fn test_scaled_extent() {
        let (_dir, path) = gradient_png(41, 20);
        let loader = ImageTileLoader::open_scaled(&path, 2, global(), &heap_config()).unwrap();
        assert_eq!(loader.extent(), (21, 10));

        let tile = loader.load_tile(1, 0, 16).unwrap().unwrap();
        assert_eq!(tile.get(4, 9).alpha(), 255);
        assert_eq!(tile.get(5, 0), RgbaPixel::default());
        assert_eq!(tile.get(0, 10), RgbaPixel::default());
    }

    #[test]
    fn test_zero_scale_is_rejected() {
        let (_dir, path) = gradient_png(4, 4);
        let result = ImageTileLoader::open_scaled(&path, 0, global(), &heap_config());
        assert!(matches!(result, Err(TileError::InvalidOperation(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let result = ImageTileLoader::open(dir.path().join("missing.png"), global(), &heap_config());
        assert!(matches!(result, Err(TileError::Io(_))));
    }

    #[test]
    fn test_garbage_file_is_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let result = ImageTileLoader::open(&path, global(), &heap_config());
        assert!(matches!(result, Err(TileError::Decode(_))));
    }

    #[test]
    fn test_decoded_image_is_held_under_budget() {
        let (_dir, path) = gradient_png(40, 20);
        let global = global();
        let loader = ImageTileLoader::open(&path, Arc::clone(&global), &heap_config()).unwrap();
        assert_eq!(global.allocated_memory(), 0);

        loader.load_tile(0, 0, 16).unwrap();
        loader.load_tile(1, 0, 16).unwrap();
        assert_eq!(global.footprint_of(loader.budget_id()), 40 * 20 * 4);

        drop(loader);
        assert_eq!(global.allocated_memory(), 0);
        assert_eq!(global.consumer_count(), 0);
    }

    #[test]
    fn test_decoded_image_gives_way_to_other_consumers() {
        let (_dir, path) = gradient_png(40, 20);
        let decoded_bytes = 40 * 20 * 4;
        let global = Arc::new(GlobalTileCache::<RgbaPixel>::with_max_memory(decoded_bytes + 100));
        let loader = ImageTileLoader::open(&path, Arc::clone(&global), &heap_config()).unwrap();
        let idle: Arc<dyn CacheConsumer> = Arc::new(Idle);
        let other = global.register(Arc::downgrade(&idle));

        loader.load_tile(0, 0, 16).unwrap();
        assert_eq!(global.allocated_memory(), decoded_bytes);

        assert!(global.request_cache_memory(other, 1000));
        assert_eq!(global.footprint_of(loader.budget_id()), 0);
        assert_eq!(global.allocated_memory(), 1000);

        // no room to keep it, tiles still come out right
        let tile = loader.load_tile(1, 1, 16).unwrap().unwrap();
        assert_eq!(tile.get(2, 3).split_channels(), (18, 19, 7, 255));
        assert_eq!(global.allocated_memory(), 1000);

        global.release_cache_memory(other, 1000);
        loader.load_tile(0, 1, 16).unwrap();
        assert_eq!(global.footprint_of(loader.budget_id()), decoded_bytes);
    }

    #[test]
    fn test_image_larger_than_budget_is_not_kept() {
        let (_dir, path) = gradient_png(40, 20);
        let global = Arc::new(GlobalTileCache::<RgbaPixel>::with_max_memory(100));
        let loader = ImageTileLoader::open(&path, Arc::clone(&global), &heap_config()).unwrap();

        let tile = loader.load_tile(0, 0, 16).unwrap().unwrap();
        assert_eq!(tile.get(5, 6).split_channels(), (5, 6, 7, 255));
        assert_eq!(global.allocated_memory(), 0);
    }

    #[test]
    fn test_largest_tiff_page_is_used() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pyramid.tif");
        {
            let file = BufWriter::new(File::create(&path).unwrap());
            let mut encoder = TiffEncoder::new(file).unwrap();
            encoder.write_image::<colortype::RGBA8>(8, 4, &[1u8; 8 * 4 * 4]).unwrap();
            let mut page = Vec::with_capacity(20 * 10 * 3);
            for y in 0..10u8 {
                for x in 0..20u8 {
                    page.extend_from_slice(&[x, y, 5]);
                }
            }
            encoder.write_image::<colortype::RGB8>(20, 10, &page).unwrap();
            encoder.write_image::<colortype::Gray8>(4, 4, &[9u8; 16]).unwrap();
        }

        let loader = ImageTileLoader::open(&path, global(), &heap_config()).unwrap();
        assert_eq!(loader.page(), 1);
        assert_eq!(loader.extent(), (20, 10));

        let tile = loader.load_tile(1, 0, 16).unwrap().unwrap();
        assert_eq!(tile.get(3, 9).split_channels(), (19, 9, 5, 255));
        assert_eq!(tile.get(4, 0), RgbaPixel::default());
    }

    #[test]
    fn test_single_page_tiff_uses_first_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("single.tiff");
        RgbaImage::from_fn(12, 6, |x, y| Rgba([x as u8, y as u8, 1, 255]))
            .save(&path)
            .unwrap();

        let loader = ImageTileLoader::open(&path, global(), &heap_config()).unwrap();
        assert_eq!(loader.page(), 0);
        let tile = loader.load_tile(0, 0, 16).unwrap().unwrap();
        assert_eq!(tile.get(11, 5).split_channels(), (11, 5, 1, 255));
    }
}
