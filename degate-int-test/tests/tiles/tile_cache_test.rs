//! Tile caches sharing one budget.

use degate_int_test::test_util::{cleanup, create_async_tile_context, create_tile_context, run_test, tile_bytes};
use degate_spatial::BoundingBox;
use degate_tiles::{BlankTileLoader, RgbaPixel, StoreTileLoader, TileCache, TileError};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_least_recent_tile_evicted() {
    run_test(
        || create_tile_context(2),
        |ctx| {
            let loader = BlankTileLoader::new(1024, 1024, ctx.config())?;
            let cache = TileCache::<RgbaPixel>::new(Arc::new(loader), ctx.rgba_cache(), ctx.config())?;

            cache.load_tile(0, 0, true)?;
            cache.load_tile(1, 0, true)?;
            cache.load_tile(2, 0, true)?;

            assert_eq!(cache.resident_tiles(), vec![(1, 0), (2, 0)]);
            assert_eq!(ctx.rgba_cache().allocated_memory(), 2 * tile_bytes::<RgbaPixel>(ctx.config()));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_placeholder_outside_extent() {
    run_test(
        || create_tile_context(2),
        |ctx| {
            let loader = BlankTileLoader::new(40, 40, ctx.config())?;
            let cache = TileCache::<RgbaPixel>::new(Arc::new(loader), ctx.rgba_cache(), ctx.config())?;

            let first = cache.load_tile(3, 0, true)?;
            let second = cache.load_tile(0, 7, false)?;
            let third = cache.get_tile(5000, 5000)?;
            assert!(Arc::ptr_eq(&first, &second));
            assert!(Arc::ptr_eq(&first, &third));
            assert!(first.read().as_slice().iter().all(|p| *p == RgbaPixel::default()));
            assert_eq!(ctx.rgba_cache().allocated_memory(), 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_images_compete_for_budget() {
    run_test(
        || create_tile_context(4),
        |ctx| {
            let make = || -> Result<TileCache<RgbaPixel>, TileError> {
                let loader = BlankTileLoader::new(256, 256, ctx.config())?;
                TileCache::<RgbaPixel>::new(Arc::new(loader), ctx.rgba_cache(), ctx.config())
            };
            let background = make()?;
            let active = make()?;

            for tile_x in 0..3 {
                background.load_tile(tile_x, 0, false)?;
            }
            for tile_x in 0..3 {
                active.load_tile(tile_x, 0, false)?;
            }

            let global = ctx.rgba_cache();
            let tile = tile_bytes::<RgbaPixel>(ctx.config());
            assert_eq!(global.allocated_memory(), 4 * tile);
            assert_eq!(background.footprint() + active.footprint(), 4 * tile);
            assert_eq!(active.resident_tiles().len(), 3);
            assert_eq!(background.resident_tiles(), vec![(2, 0)]);

            drop(background);
            assert_eq!(global.allocated_memory(), 3 * tile);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_store_tiles_written_back() {
    run_test(
        || create_tile_context(1),
        |ctx| {
            let dir = ctx.child("store");
            let loader = Arc::new(StoreTileLoader::open(&dir, 64, 64)?);
            let cache = TileCache::<RgbaPixel>::new(loader.clone(), ctx.rgba_cache(), ctx.config())?;

            let tile = cache.load_tile(0, 0, false)?;
            tile.write().set(1, 1, RgbaPixel::merge_channels(1, 2, 3, 4));
            drop(tile);

            // loading a second tile evicts the first, which unmaps its file
            cache.load_tile(1, 0, false)?;
            assert!(!cache.is_resident(0, 0));

            let tile = cache.load_tile(0, 0, false)?;
            assert_eq!(tile.read().get(1, 1).split_channels(), (1, 2, 3, 4));
            assert!(loader.tile_path(1, 0).exists());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_prefetch_around_region() {
    run_test(
        || create_tile_context(9),
        |ctx| {
            let loader = BlankTileLoader::new(512, 512, ctx.config())?;
            let cache = TileCache::<RgbaPixel>::new(Arc::new(loader), ctx.rgba_cache(), ctx.config())?;

            let view = BoundingBox::new(40.0, 70.0, 40.0, 70.0);
            assert!(cache.cache_around(&view, 8)?);
            assert_eq!(cache.resident_tiles().len(), 9);

            let wide = BoundingBox::new(0.0, 200.0, 0.0, 200.0);
            assert!(!cache.cache_around(&wide, 0)?);
            assert_eq!(cache.resident_tiles().len(), 9);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_oversized_tile_is_refused() {
    run_test(
        || create_tile_context(0),
        |ctx| {
            let loader = BlankTileLoader::new(64, 64, ctx.config())?;
            let cache = TileCache::<RgbaPixel>::new(Arc::new(loader), ctx.rgba_cache(), ctx.config())?;
            let result = cache.get_tile(0, 0);
            assert!(matches!(result, Err(TileError::CacheOversubscribed { max: 0, .. })));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_background_load_notifies_subscriber() {
    run_test(
        || create_async_tile_context(8),
        |ctx| {
            let dir = ctx.child("source");
            std::fs::create_dir_all(&dir).map_err(TileError::from)?;
            let path = dir.join("layer.png");
            write_checkerboard(&path)?;

            let loader = degate_tiles::ImageTileLoader::open(&path, ctx.rgba_cache(), ctx.config())?;
            let cache = TileCache::<RgbaPixel>::new(Arc::new(loader), ctx.rgba_cache(), ctx.config())?;
            let (sender, receiver) = crossbeam_channel::unbounded();
            cache.subscribe(sender, 7);

            let tile = cache.get_tile(20, 3)?;
            assert!(cache.is_placeholder(&tile));

            let event = receiver
                .recv_timeout(Duration::from_secs(10))
                .map_err(|e| TileError::InvalidOperation(e.to_string()))?;
            assert_eq!((event.payload, event.tile_x, event.tile_y), (7, 1, 0));
            awaitility::at_most(Duration::from_secs(5)).until(|| cache.pending_loads() == 0);

            let tile = cache.get_tile(20, 3)?;
            assert!(!cache.is_placeholder(&tile));
            assert_eq!(tile.read().get(4, 3).split_channels(), (255, 255, 255, 255));
            Ok(())
        },
        cleanup,
    )
}

/// 32x16 image of 1-pixel black and white squares.
fn write_checkerboard(path: &std::path::Path) -> Result<(), TileError> {
    let mut bytes = Vec::with_capacity(32 * 16 * 4);
    for y in 0..16u32 {
        for x in 0..32u32 {
            let value = if (x + y) % 2 == 1 { 255 } else { 0 };
            bytes.extend_from_slice(&[value, value, value, 255]);
        }
    }
    let image = image_buffer(bytes)?;
    image.save(path).map_err(TileError::from)
}

fn image_buffer(bytes: Vec<u8>) -> Result<image::RgbaImage, TileError> {
    image::RgbaImage::from_raw(32, 16, bytes).ok_or_else(|| TileError::Decode("bad raw image".into()))
}
