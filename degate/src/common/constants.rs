// tile cache budget
pub const MIN_TILE_CACHE_SIZE_MB: u64 = 256;
pub const DEFAULT_TILE_CACHE_SIZE_MB: u64 = 256;
pub const BYTES_PER_MB: u64 = 1_024 * 1_024;

// tiles
pub const DEFAULT_TILE_WIDTH_EXP: u32 = 10;
pub const MIN_TILE_WIDTH_EXP: u32 = 4;
pub const MAX_TILE_WIDTH_EXP: u32 = 14;

// quadtree
pub const DEFAULT_QUADTREE_MAX_ENTRIES: usize = 50;
pub const DEFAULT_QUADTREE_MIN_SIZE: f64 = 10.0;

// file names
pub const TEMP_DIR_NAME: &str = "degate";
pub const TEMP_TILE_PREFIX: &str = "tile_";
pub const TILE_FILE_EXTENSION: &str = "dat";
