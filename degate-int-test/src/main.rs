use degate::errors::DegateResult;
use degate_int_test::test_util::{cleanup, create_tile_context};
use degate_tiles::{RgbaPixel, TileImage};
use std::thread;

/// Several layers edited in parallel under a budget far smaller than the
/// layers, so tiles are evicted and reloaded from their stores constantly.
fn main() -> DegateResult<()> {
    colog::init();
    println!("Starting tile cache stress test...");
    let ctx = create_tile_context(64)?;

    let layers = 4;
    let size = 2048;
    let start = std::time::Instant::now();
    let handles: Vec<_> = (0..layers)
        .map(|layer| {
            let ctx = ctx.clone();
            thread::spawn(move || -> DegateResult<u64> {
                let store = ctx.child(&format!("layer_{}", layer));
                let image = TileImage::from_store(store, size, size, ctx.rgba_cache(), ctx.config())?;
                image.fill_from_fn(|x, y| RgbaPixel::merge_channels(x as u8, y as u8, layer as u8, 255))?;

                let mut checksum = 0u64;
                for y in (0..size).step_by(7) {
                    for x in (0..size).step_by(13) {
                        checksum += image.get_pixel(x, y)?.luminance() as u64;
                    }
                }
                Ok(checksum)
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(result) => println!("Layer checksum {}", result?),
            Err(_) => println!("Layer thread panicked"),
        }
    }
    println!("Processed {} layers of {}x{} in {:?}", layers, size, size, start.elapsed());
    ctx.rgba_cache().log_table();

    cleanup(ctx)
}
