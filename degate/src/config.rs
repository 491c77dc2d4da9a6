//! Runtime configuration shared by the spatial index and the tile cache.

use crate::common::{
    atomic, Atomic, ReadExecutor, WriteExecutor, BYTES_PER_MB, DEFAULT_TILE_CACHE_SIZE_MB,
    DEFAULT_TILE_WIDTH_EXP, MAX_TILE_WIDTH_EXP, MIN_TILE_CACHE_SIZE_MB, MIN_TILE_WIDTH_EXP,
    TEMP_DIR_NAME,
};
use crate::errors::{DegateError, DegateResult, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Backing used for tiles that are created from scratch rather than loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStorage {
    /// Zero-initialised heap allocation. Writes to a tile that is evicted
    /// are lost; the tile comes back zeroed.
    Heap,
    /// Memory-mapped file in a scratch directory below the temp directory.
    /// Evicted tiles keep their file and are re-mapped on reload; the
    /// scratch directory is removed with the image.
    TempFile,
}

impl TileStorage {
    fn to_u8(self) -> u8 {
        match self {
            TileStorage::Heap => 0,
            TileStorage::TempFile => 1,
        }
    }

    fn from_u8(value: u8) -> TileStorage {
        match value {
            0 => TileStorage::Heap,
            _ => TileStorage::TempFile,
        }
    }
}

/// Engine configuration.
///
/// A cloneable, thread-safe configuration holder. Clones share the same
/// underlying values, so a setter called on one clone is visible to all.
///
/// # Examples
///
/// ```rust
/// use degate::config::DegateConfig;
///
/// let config = DegateConfig::new();
/// config.set_max_tile_cache_size_mb(1024);
/// assert_eq!(config.max_tile_cache_size_mb(), 1024);
/// assert_eq!(config.tile_size(), 1 << config.tile_width_exp());
/// ```
#[derive(Clone)]
pub struct DegateConfig {
    inner: Arc<DegateConfigInner>,
}

impl Default for DegateConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DegateConfig {
    /// Creates a configuration with default values.
    pub fn new() -> DegateConfig {
        DegateConfig {
            inner: Arc::new(DegateConfigInner::new()),
        }
    }

    /// Configured tile cache ceiling in MB, as set (no floor applied).
    #[inline]
    pub fn max_tile_cache_size_mb(&self) -> u64 {
        self.inner.max_tile_cache_size_mb.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_max_tile_cache_size_mb(&self, size_mb: u64) {
        self.inner.max_tile_cache_size_mb.store(size_mb, Ordering::Relaxed);
    }

    /// Tile cache ceiling in bytes with the minimum size applied.
    pub fn effective_tile_cache_bytes(&self) -> u64 {
        let size_mb = self.max_tile_cache_size_mb().max(MIN_TILE_CACHE_SIZE_MB);
        size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Tiles are `2^tile_width_exp` pixels wide and high.
    #[inline]
    pub fn tile_width_exp(&self) -> u32 {
        self.inner.tile_width_exp.load(Ordering::Relaxed)
    }

    /// Sets the tile width exponent.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the exponent is outside the supported range.
    pub fn set_tile_width_exp(&self, exp: u32) -> DegateResult<()> {
        if !(MIN_TILE_WIDTH_EXP..=MAX_TILE_WIDTH_EXP).contains(&exp) {
            return Err(DegateError::new(
                &format!(
                    "Tile width exponent {} is outside {}..={}",
                    exp, MIN_TILE_WIDTH_EXP, MAX_TILE_WIDTH_EXP
                ),
                ErrorKind::ValidationError,
            ));
        }
        self.inner.tile_width_exp.store(exp, Ordering::Relaxed);
        Ok(())
    }

    #[inline]
    pub fn tile_size(&self) -> u32 {
        1 << self.tile_width_exp()
    }

    pub fn temp_directory(&self) -> PathBuf {
        self.inner.temp_directory.read_with(|dir| dir.clone())
    }

    pub fn set_temp_directory(&self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.inner.temp_directory.write_with(|current| *current = dir);
    }

    #[inline]
    pub fn async_tile_loading(&self) -> bool {
        self.inner.async_tile_loading.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_async_tile_loading(&self, enabled: bool) {
        self.inner.async_tile_loading.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub fn tile_storage(&self) -> TileStorage {
        TileStorage::from_u8(self.inner.tile_storage.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_tile_storage(&self, storage: TileStorage) {
        self.inner.tile_storage.store(storage.to_u8(), Ordering::Relaxed);
    }
}

struct DegateConfigInner {
    max_tile_cache_size_mb: AtomicU64,
    tile_width_exp: AtomicU32,
    temp_directory: Atomic<PathBuf>,
    async_tile_loading: AtomicBool,
    tile_storage: AtomicU8,
}

impl DegateConfigInner {
    fn new() -> DegateConfigInner {
        DegateConfigInner {
            max_tile_cache_size_mb: AtomicU64::new(DEFAULT_TILE_CACHE_SIZE_MB),
            tile_width_exp: AtomicU32::new(DEFAULT_TILE_WIDTH_EXP),
            temp_directory: atomic(std::env::temp_dir().join(TEMP_DIR_NAME)),
            async_tile_loading: AtomicBool::new(true),
            tile_storage: AtomicU8::new(TileStorage::TempFile.to_u8()),
        }
    }
}
