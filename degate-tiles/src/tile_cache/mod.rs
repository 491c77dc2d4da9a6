//! Per-image tile cache.
//!
//! A [`TileCache`] keeps the tiles of one image that are currently in
//! memory, asks the [`GlobalTileCache`] before holding a new one and gives
//! tiles back when the global cache runs out of room. Tiles come from a
//! [`TileLoader`]; loaders that support it are run on the worker pool and
//! the caller gets the placeholder tile until the real one is in.

mod blank;
mod image_loader;
mod loader;
mod store;

pub use blank::BlankTileLoader;
pub use image_loader::ImageTileLoader;
pub use loader::TileLoader;
pub use store::StoreTileLoader;

use crate::error::{TileError, TileResult};
use crate::global_tile_cache::{CacheConsumer, ConsumerId, GlobalTileCache};
use crate::memory_map::MemoryMap;
use crate::pixel::Pixel;
use crossbeam_channel::{Sender, TrySendError};
use degate::common::async_task;
use degate::config::DegateConfig;
use degate_spatial::BoundingBox;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Shared handle to a tile. The placeholder tile is one such handle too.
pub type TileHandle<P> = Arc<RwLock<MemoryMap<P>>>;

type TileKey = (u32, u32);

/// Sent to subscribers when an asynchronous load has put a tile in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLoaded {
    /// The value passed to [`TileCache::subscribe`].
    pub payload: u64,
    pub tile_x: u32,
    pub tile_y: u32,
}

enum TileSlot<P: Pixel> {
    Loading,
    Ready(TileHandle<P>),
}

struct CacheEntry<P: Pixel> {
    slot: TileSlot<P>,
    last_access: u64,
}

struct CacheState<P: Pixel> {
    tiles: HashMap<TileKey, CacheEntry<P>>,
    current: Option<(TileKey, TileHandle<P>)>,
    clock: u64,
}

impl<P: Pixel> CacheState<P> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Tile cache of one open image.
///
/// Cloning is cheap and clones share the cache. All memory the cache holds
/// is given back to the global cache when the last clone is dropped.
///
/// # Examples
///
/// ```rust
/// use degate::config::{DegateConfig, TileStorage};
/// use degate_tiles::{BlankTileLoader, GlobalTileCache, TileCache};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DegateConfig::new();
/// config.set_tile_storage(TileStorage::Heap);
/// config.set_tile_width_exp(6)?;
///
/// let global = Arc::new(GlobalTileCache::<u8>::from_config(&config));
/// let loader = BlankTileLoader::new(256, 256, &config)?;
/// let cache = TileCache::<u8>::new(Arc::new(loader), global, &config)?;
///
/// let tile = cache.get_tile(100, 10)?;
/// assert_eq!(tile.read().width(), 64);
/// assert!(cache.is_resident(1, 0));
/// # Ok(())
/// # }
/// ```
pub struct TileCache<P: Pixel> {
    inner: Arc<TileCacheInner<P>>,
}

impl<P: Pixel> Clone for TileCache<P> {
    fn clone(&self) -> Self {
        TileCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Pixel> TileCache<P> {
    /// Creates a cache over `loader`, accounted against `global`.
    ///
    /// Tile size and asynchronous loading are taken from `config`.
    pub fn new(
        loader: Arc<dyn TileLoader<P>>,
        global: Arc<GlobalTileCache<P>>,
        config: &DegateConfig,
    ) -> TileResult<TileCache<P>> {
        let tile_width_exp = config.tile_width_exp();
        let tile_size = 1u32 << tile_width_exp;
        let async_loading = config.async_tile_loading() && loader.supports_async();
        let placeholder = Arc::new(RwLock::new(MemoryMap::new(tile_size, tile_size)));

        let inner = Arc::new_cyclic(|weak: &Weak<TileCacheInner<P>>| {
            let consumer: Weak<dyn CacheConsumer> = weak.clone();
            let id = global.register(consumer);
            TileCacheInner {
                state: Mutex::new(CacheState {
                    tiles: HashMap::new(),
                    current: None,
                    clock: 0,
                }),
                settled: Condvar::new(),
                subscribers: Mutex::new(Vec::new()),
                placeholder,
                loader,
                global,
                id,
                tile_width_exp,
                tile_size,
                async_loading,
                self_ref: weak.clone(),
            }
        });

        log::debug!(
            "Created {} tile cache {} with {}px tiles{}",
            P::NAME,
            inner.id,
            tile_size,
            if async_loading { ", loading asynchronously" } else { "" }
        );
        Ok(TileCache { inner })
    }

    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    pub fn tile_size(&self) -> u32 {
        self.inner.tile_size
    }

    pub fn tile_width_exp(&self) -> u32 {
        self.inner.tile_width_exp
    }

    /// Image size in pixels as reported by the loader.
    pub fn extent(&self) -> (u32, u32) {
        self.inner.loader.extent()
    }

    pub fn global(&self) -> &Arc<GlobalTileCache<P>> {
        &self.inner.global
    }

    /// The shared zeroed tile handed out for pending loads and for tiles
    /// outside the image.
    pub fn placeholder(&self) -> &TileHandle<P> {
        &self.inner.placeholder
    }

    pub fn is_placeholder(&self, tile: &TileHandle<P>) -> bool {
        Arc::ptr_eq(tile, &self.inner.placeholder)
    }

    /// Returns the tile holding the pixel at `(x, y)` in image coordinates.
    ///
    /// # Errors
    ///
    /// Fails if the tile cannot be loaded or if one tile does not fit in
    /// the global cache at all.
    pub fn get_tile(&self, x: u32, y: u32) -> TileResult<TileHandle<P>> {
        let key = (x >> self.inner.tile_width_exp, y >> self.inner.tile_width_exp);
        {
            let state = self.inner.state.lock();
            if let Some((current_key, tile)) = &state.current {
                if *current_key == key {
                    return Ok(Arc::clone(tile));
                }
            }
        }
        self.load_tile(key.0, key.1, true)
    }

    /// Returns the tile at tile indices `(tile_x, tile_y)`, loading it on a miss.
    ///
    /// With `update_current` the tile also becomes the fast-path tile of
    /// [`get_tile`](Self::get_tile). While an asynchronous load is pending,
    /// the placeholder is returned.
    pub fn load_tile(&self, tile_x: u32, tile_y: u32, update_current: bool) -> TileResult<TileHandle<P>> {
        self.inner.load_tile(tile_x, tile_y, update_current, false)
    }

    /// Like [`load_tile`](Self::load_tile), but never hands out the
    /// placeholder for a tile inside the image.
    ///
    /// A miss is loaded on the calling thread even when the cache loads
    /// asynchronously, and a load already pending for the tile is waited
    /// for. Must not be called from a task of the shared worker pool, which
    /// may be the one that has to finish the pending load.
    pub fn load_tile_blocking(&self, tile_x: u32, tile_y: u32, update_current: bool) -> TileResult<TileHandle<P>> {
        self.inner.load_tile(tile_x, tile_y, update_current, true)
    }

    /// Loads every tile within `radius` pixels of `region`.
    ///
    /// Returns `false` without loading anything if those tiles would not fit
    /// in the global cache together.
    pub fn cache_around(&self, region: &BoundingBox, radius: u32) -> TileResult<bool> {
        let (width, height) = self.extent();
        if width == 0 || height == 0 {
            return Ok(true);
        }
        let clamp = |value: f64, limit: u32| -> u32 { value.max(0.0).min((limit - 1) as f64) as u32 };
        let radius = radius as f64;
        let exp = self.inner.tile_width_exp;
        let min_tx = clamp(region.min_x() - radius, width) >> exp;
        let max_tx = clamp(region.max_x() + radius, width) >> exp;
        let min_ty = clamp(region.min_y() - radius, height) >> exp;
        let max_ty = clamp(region.max_y() + radius, height) >> exp;

        let count = (max_tx - min_tx + 1) as u64 * (max_ty - min_ty + 1) as u64;
        let needed = count * self.inner.tile_bytes();
        if needed > self.inner.global.max_cache_memory() {
            log::warn!(
                "Not prefetching {} tiles around {} for cache {}: {} bytes exceed the {} byte limit",
                count,
                region,
                self.inner.id,
                needed,
                self.inner.global.max_cache_memory()
            );
            return Ok(false);
        }

        for tile_y in min_ty..=max_ty {
            for tile_x in min_tx..=max_tx {
                self.inner.load_tile(tile_x, tile_y, false, false)?;
            }
        }
        Ok(true)
    }

    /// Drops the least recently used tile and returns its memory.
    pub fn cleanup_cache(&self) {
        self.inner.cleanup_cache();
    }

    /// Drops every tile, including pending loads, and returns all memory.
    pub fn release_memory(&self) {
        self.inner.release_memory();
    }

    /// Loaded tiles, sorted by tile indices.
    pub fn resident_tiles(&self) -> Vec<(u32, u32)> {
        let state = self.inner.state.lock();
        let mut keys: Vec<_> = state
            .tiles
            .iter()
            .filter(|(_, entry)| matches!(entry.slot, TileSlot::Ready(_)))
            .map(|(key, _)| *key)
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn is_resident(&self, tile_x: u32, tile_y: u32) -> bool {
        let state = self.inner.state.lock();
        matches!(
            state.tiles.get(&(tile_x, tile_y)).map(|entry| &entry.slot),
            Some(TileSlot::Ready(_))
        )
    }

    /// Number of asynchronous loads not yet completed.
    pub fn pending_loads(&self) -> usize {
        let state = self.inner.state.lock();
        state
            .tiles
            .values()
            .filter(|entry| matches!(entry.slot, TileSlot::Loading))
            .count()
    }

    /// Bytes this cache holds according to the global cache.
    pub fn footprint(&self) -> u64 {
        self.inner.global.footprint_of(self.inner.id)
    }

    /// Sends a [`TileLoaded`] carrying `payload` to `sender` whenever an
    /// asynchronous load completes.
    ///
    /// Delivery never blocks the loading thread: when a bounded channel is
    /// full the notification is dropped and the subscriber kept. Subscribers
    /// whose receiver is gone are removed.
    pub fn subscribe(&self, sender: Sender<TileLoaded>, payload: u64) {
        self.inner.subscribers.lock().push((sender, payload));
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

// field order is drop order: tiles go before the loader that may own their directory
struct TileCacheInner<P: Pixel> {
    state: Mutex<CacheState<P>>,
    // signalled whenever a pending entry is resolved or dropped
    settled: Condvar,
    subscribers: Mutex<Vec<(Sender<TileLoaded>, u64)>>,
    placeholder: TileHandle<P>,
    loader: Arc<dyn TileLoader<P>>,
    global: Arc<GlobalTileCache<P>>,
    id: ConsumerId,
    tile_width_exp: u32,
    tile_size: u32,
    async_loading: bool,
    self_ref: Weak<TileCacheInner<P>>,
}

impl<P: Pixel> TileCacheInner<P> {
    fn tile_bytes(&self) -> u64 {
        self.tile_size as u64 * self.tile_size as u64 * P::SIZE as u64
    }

    /// Looks the tile up, refreshing its timestamp. `None` on a miss.
    ///
    /// A pending entry yields the placeholder, or with `wait` blocks until
    /// the entry is resolved or dropped.
    fn lookup(&self, key: TileKey, update_current: bool, wait: bool) -> Option<TileHandle<P>> {
        let mut state = self.state.lock();
        loop {
            let now = state.tick();
            let ready = match state.tiles.get_mut(&key) {
                Some(entry) => {
                    entry.last_access = now;
                    match &entry.slot {
                        TileSlot::Ready(tile) => Some(Arc::clone(tile)),
                        TileSlot::Loading => None,
                    }
                }
                None => return None,
            };
            match ready {
                Some(handle) => {
                    if update_current {
                        state.current = Some((key, Arc::clone(&handle)));
                    }
                    return Some(handle);
                }
                None if !wait => return Some(Arc::clone(&self.placeholder)),
                None => self.settled.wait(&mut state),
            }
        }
    }

    fn load_tile(&self, tile_x: u32, tile_y: u32, update_current: bool, blocking: bool) -> TileResult<TileHandle<P>> {
        let key = (tile_x, tile_y);
        if !self.loader.contains_tile(tile_x, tile_y, self.tile_size) {
            return Ok(Arc::clone(&self.placeholder));
        }

        let bytes = self.tile_bytes();
        loop {
            if let Some(tile) = self.lookup(key, update_current, blocking) {
                return Ok(tile);
            }

            if !self.global.request_cache_memory(self.id, bytes) {
                return Err(TileError::CacheOversubscribed {
                    requested: bytes,
                    max: self.global.max_cache_memory(),
                });
            }

            let mut state = self.state.lock();
            if state.tiles.contains_key(&key) {
                // another thread got here first
                drop(state);
                self.global.release_cache_memory(self.id, bytes);
                continue;
            }
            let now = state.tick();
            state.tiles.insert(
                key,
                CacheEntry {
                    slot: TileSlot::Loading,
                    last_access: now,
                },
            );
            if update_current {
                state.current = None;
            }
            break;
        }

        if self.async_loading && !blocking {
            self.spawn_load(key);
            return Ok(Arc::clone(&self.placeholder));
        }

        let loaded = self.loader.load_tile(tile_x, tile_y, self.tile_size);
        match self.complete_load(key, loaded, update_current) {
            Some(Ok(tile)) => Ok(tile),
            Some(Err(err)) => Err(err),
            None => Ok(Arc::clone(&self.placeholder)),
        }
    }

    fn spawn_load(&self, key: TileKey) {
        let owner = self.self_ref.clone();
        let loader = Arc::clone(&self.loader);
        let tile_size = self.tile_size;
        async_task(move || {
            let loaded = loader.load_tile(key.0, key.1, tile_size);
            let Some(cache) = owner.upgrade() else {
                log::debug!("Tile cache dropped before tile ({}, {}) was loaded", key.0, key.1);
                return;
            };
            match cache.complete_load(key, loaded, false) {
                Some(Ok(_)) => cache.notify(key),
                Some(Err(err)) => {
                    log::error!("Asynchronous load of tile ({}, {}) failed: {}", key.0, key.1, err)
                }
                None => {}
            }
        });
    }

    /// Installs the outcome of a load for the reserved entry at `key` and
    /// wakes blocked readers.
    ///
    /// Returns `None` if there is nothing to hand out: the loader had no
    /// data, or the entry was dropped while loading.
    fn complete_load(
        &self,
        key: TileKey,
        loaded: TileResult<Option<MemoryMap<P>>>,
        update_current: bool,
    ) -> Option<TileResult<TileHandle<P>>> {
        let outcome = self.install_load(key, loaded, update_current);
        self.settled.notify_all();
        outcome
    }

    fn install_load(
        &self,
        key: TileKey,
        loaded: TileResult<Option<MemoryMap<P>>>,
        update_current: bool,
    ) -> Option<TileResult<TileHandle<P>>> {
        let bytes = self.tile_bytes();
        let mut state = self.state.lock();
        let reserved = matches!(
            state.tiles.get(&key).map(|entry| &entry.slot),
            Some(TileSlot::Loading)
        );

        match loaded {
            Ok(Some(tile)) => {
                let tile = Arc::new(RwLock::new(tile));
                if !reserved {
                    log::warn!("Discarding tile ({}, {}), its entry was released while loading", key.0, key.1);
                    return None;
                }
                let now = state.tick();
                state.tiles.insert(
                    key,
                    CacheEntry {
                        slot: TileSlot::Ready(Arc::clone(&tile)),
                        last_access: now,
                    },
                );
                if update_current {
                    state.current = Some((key, Arc::clone(&tile)));
                }
                Some(Ok(tile))
            }
            Ok(None) => {
                if reserved {
                    state.tiles.remove(&key);
                    drop(state);
                    self.global.release_cache_memory(self.id, bytes);
                }
                None
            }
            Err(err) => {
                if reserved {
                    state.tiles.remove(&key);
                    drop(state);
                    self.global.release_cache_memory(self.id, bytes);
                }
                Some(Err(err))
            }
        }
    }

    fn notify(&self, key: TileKey) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(sender, payload)| {
            let event = TileLoaded {
                payload: *payload,
                tile_x: key.0,
                tile_y: key.1,
            };
            match sender.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "Subscriber {} of cache {} is full, dropping notice for tile ({}, {})",
                        payload,
                        self.id,
                        key.0,
                        key.1
                    );
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }

    fn release_memory(&self) {
        let released = {
            let mut state = self.state.lock();
            state.current = None;
            let count = state.tiles.len() as u64;
            state.tiles.clear();
            count
        };
        self.settled.notify_all();
        if released > 0 {
            log::debug!("Cache {} released {} tiles", self.id, released);
            self.global.release_cache_memory(self.id, released * self.tile_bytes());
        }
    }
}

impl<P: Pixel> CacheConsumer for TileCacheInner<P> {
    fn cleanup_cache(&self) {
        let evicted = {
            let mut state = self.state.lock();
            let oldest = state
                .tiles
                .iter()
                .filter(|(_, entry)| matches!(entry.slot, TileSlot::Ready(_)))
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| *key);
            if let Some(key) = oldest {
                state.tiles.remove(&key);
                if state.current.as_ref().is_some_and(|(current, _)| *current == key) {
                    state.current = None;
                }
            }
            oldest
        };

        if let Some((tile_x, tile_y)) = evicted {
            log::debug!("Cache {} evicted tile ({}, {})", self.id, tile_x, tile_y);
            self.global.release_cache_memory(self.id, self.tile_bytes());
        }
    }
}

impl<P: Pixel> Drop for TileCacheInner<P> {
    fn drop(&mut self) {
        self.release_memory();
        self.global.unregister(self.id);
    }
}
