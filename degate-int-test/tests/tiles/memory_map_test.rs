//! Memory maps over real files.

use degate_int_test::test_util::{cleanup, create_tile_context, run_test};
use degate_tiles::{BytePixel, MemoryMap, RgbaPixel, StorageKind};

#[test]
fn test_heap_map_set_get_clear() {
    let mut map: MemoryMap<BytePixel> = MemoryMap::new(4, 4);
    map.set(2, 2, 200);
    assert_eq!(map.get(2, 2), 200);
    map.clear();
    assert_eq!(map.get(2, 2), 0);
}

#[test]
fn test_persistent_map_survives_reopen() {
    run_test(
        || create_tile_context(4),
        |ctx| {
            let path = ctx.child("layers/metal.dat");
            {
                let mut map: MemoryMap<RgbaPixel> = MemoryMap::persistent_file(64, 32, &path)?;
                for y in 0..32 {
                    for x in 0..64 {
                        map.set(x, y, RgbaPixel::merge_channels(x as u8, y as u8, 1, 255));
                    }
                }
                map.flush()?;
            }
            assert_eq!(std::fs::metadata(&path).map_err(degate_tiles::TileError::from)?.len(), 64 * 32 * 4);

            let map: MemoryMap<RgbaPixel> = MemoryMap::open(StorageKind::PersistentFile, 64, 32, Some(path.as_path()))?;
            assert_eq!(map.storage_kind(), StorageKind::PersistentFile);
            assert_eq!(map.get(63, 31).split_channels(), (63, 31, 1, 255));
            assert_eq!(map.get(10, 5).split_channels(), (10, 5, 1, 255));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_temp_map_file_is_removed() {
    run_test(
        || create_tile_context(4),
        |ctx| {
            let map: MemoryMap<f32> = MemoryMap::temp_file(128, 128, ctx.path())?;
            let path = map.path().map(|p| p.to_path_buf());
            let path = path.ok_or_else(|| degate_tiles::TileError::InvalidOperation("temp map without path".into()))?;
            assert!(path.exists());
            assert!(path.starts_with(ctx.path()));

            drop(map);
            assert!(!path.exists());
            Ok(())
        },
        cleanup,
    )
}
