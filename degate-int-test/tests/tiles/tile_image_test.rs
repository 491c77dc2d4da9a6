//! Pixel access through the tiled image adapter.

use degate_int_test::test_util::{cleanup, create_async_tile_context, create_tile_context, run_test};
use degate_tiles::{GlobalTileCache, RgbaPixel, TileError, TileImage};
use std::sync::Arc;

#[test]
fn test_edit_layer_larger_than_budget() {
    run_test(
        || create_tile_context(3),
        |ctx| {
            let store = ctx.child("project/layer_0");
            let image = TileImage::from_store(&store, 100, 60, ctx.rgba_cache(), ctx.config())?;
            image.fill_from_fn(|x, y| RgbaPixel::merge_channels(x as u8, y as u8, 0, 255))?;
            assert!(image.tile_cache().resident_tiles().len() <= 3);

            image.set_pixel(99, 59, RgbaPixel::merge_channels(1, 1, 1, 1))?;
            let mut buffer = vec![RgbaPixel::default(); 100 * 60];
            image.copy_to_buffer(&mut buffer)?;
            assert_eq!(buffer[0].split_channels(), (0, 0, 0, 255));
            assert_eq!(buffer[59 * 100 + 50].split_channels(), (50, 59, 0, 255));
            assert_eq!(buffer[59 * 100 + 99].split_channels(), (1, 1, 1, 1));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_store_reopened_with_new_cache() {
    run_test(
        || create_tile_context(4),
        |ctx| {
            let store = ctx.child("project/layer_1");
            {
                let image = TileImage::from_store(&store, 40, 40, ctx.rgba_cache(), ctx.config())?;
                image.set_pixel(33, 17, RgbaPixel::merge_channels(9, 9, 9, 255))?;
            }
            assert_eq!(ctx.rgba_cache().allocated_memory(), 0);

            let reopened = TileImage::from_store(&store, 40, 40, ctx.rgba_cache(), ctx.config())?;
            assert_eq!(reopened.get_pixel(33, 17)?.split_channels(), (9, 9, 9, 255));
            assert_eq!(reopened.get_pixel(32, 17)?, RgbaPixel::default());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_greyscale_and_rgba_budgets_are_separate() {
    run_test(
        || create_tile_context(2),
        |ctx| {
            let grey_budget = Arc::new(GlobalTileCache::<f32>::with_max_memory(16 * 16 * 4));
            let grey = TileImage::blank(64, 64, Arc::clone(&grey_budget), ctx.config())?;
            let rgba = TileImage::<RgbaPixel>::blank(64, 64, ctx.rgba_cache(), ctx.config())?;

            grey.set_pixel(1, 1, 0.25)?;
            rgba.set_pixel(1, 1, RgbaPixel(7))?;
            rgba.set_pixel(17, 1, RgbaPixel(8))?;

            assert_eq!(grey_budget.allocated_memory(), 16 * 16 * 4);
            assert_eq!(grey.get_pixel(1, 1)?, 0.25);
            assert_eq!(rgba.get_pixel(17, 1)?, RgbaPixel(8));
            assert_eq!(ctx.rgba_cache().allocated_memory(), 2 * 16 * 16 * 4);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_blank_layers_keep_pixels_under_pressure() {
    run_test(
        || create_tile_context(2),
        |ctx| {
            let metal = TileImage::<RgbaPixel>::blank(48, 16, ctx.rgba_cache(), ctx.config())?;
            let poly = TileImage::<RgbaPixel>::blank(48, 16, ctx.rgba_cache(), ctx.config())?;

            metal.set_pixel(1, 1, RgbaPixel(7))?;
            metal.set_pixel(17, 1, RgbaPixel(8))?;
            // evicts from the other layer
            poly.set_pixel(33, 1, RgbaPixel(9))?;
            assert!(!metal.tile_cache().is_resident(0, 0));

            assert_eq!(metal.get_pixel(1, 1)?, RgbaPixel(7));
            assert_eq!(metal.get_pixel(17, 1)?, RgbaPixel(8));
            assert_eq!(poly.get_pixel(33, 1)?, RgbaPixel(9));
            assert_eq!(ctx.rgba_cache().allocated_memory(), 2 * 16 * 16 * 4);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_image_file_copied_with_background_loading() {
    run_test(
        || create_async_tile_context(16),
        |ctx| {
            let path = ctx.child("scan.png");
            image::RgbaImage::from_fn(48, 20, |x, y| image::Rgba([x as u8, y as u8, 2, 255]))
                .save(&path)
                .map_err(TileError::from)?;

            let layer = TileImage::from_image_file(&path, ctx.rgba_cache(), ctx.config())?;
            let mut buffer = vec![RgbaPixel::default(); 48 * 20];
            layer.copy_to_buffer(&mut buffer)?;
            assert_eq!(buffer[0].split_channels(), (0, 0, 2, 255));
            assert_eq!(buffer[19 * 48 + 47].split_channels(), (47, 19, 2, 255));
            assert!(buffer.iter().all(|pixel| pixel.alpha() == 255));
            Ok(())
        },
        cleanup,
    )
}
