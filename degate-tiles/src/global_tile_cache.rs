//! Memory budget shared by every tile cache of one pixel type.

use crate::pixel::Pixel;
use degate::config::DegateConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

/// Identity of a cache registered with a [`GlobalTileCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl Display for ConsumerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// A holder of tile memory that can be asked to give some back.
pub trait CacheConsumer: Send + Sync {
    /// Drops one unit of cached data of the consumer's choosing and releases
    /// its memory through [`GlobalTileCache::release_cache_memory`].
    fn cleanup_cache(&self);
}

#[derive(Debug, Clone, Copy)]
struct Usage {
    footprint: u64,
    last_access: u64,
}

struct BudgetState {
    allocated: u64,
    clock: u64,
    consumers: HashMap<ConsumerId, Weak<dyn CacheConsumer>>,
    usage: HashMap<ConsumerId, Usage>,
}

/// Admission control for tile memory.
///
/// Every tile cache asks the global cache before it holds another tile.
/// When the ceiling would be exceeded, the consumer that requested memory
/// least recently is told to clean up, one unit at a time, until the new
/// request fits. Accounting is per consumer; releasing more than a consumer
/// holds is a bug and panics.
///
/// One instance is shared (as `Arc`) by all caches of a pixel type.
///
/// # Examples
///
/// ```rust
/// use degate_tiles::{GlobalTileCache, RgbaPixel};
///
/// let global = GlobalTileCache::<RgbaPixel>::with_max_memory(1024);
/// assert_eq!(global.max_cache_memory(), 1024);
/// assert_eq!(global.allocated_memory(), 0);
/// ```
pub struct GlobalTileCache<P: Pixel> {
    max_cache_memory: u64,
    next_id: AtomicU64,
    state: Mutex<BudgetState>,
    _pixel: PhantomData<fn() -> P>,
}

impl<P: Pixel> GlobalTileCache<P> {
    /// Reads the ceiling from `config`, applying the minimum cache size.
    pub fn from_config(config: &DegateConfig) -> GlobalTileCache<P> {
        GlobalTileCache::with_max_memory(config.effective_tile_cache_bytes())
    }

    /// Uses exactly `max_cache_memory` bytes as the ceiling.
    pub fn with_max_memory(max_cache_memory: u64) -> GlobalTileCache<P> {
        log::debug!(
            "Global {} tile cache limited to {} bytes",
            P::NAME,
            max_cache_memory
        );
        GlobalTileCache {
            max_cache_memory,
            next_id: AtomicU64::new(1),
            state: Mutex::new(BudgetState {
                allocated: 0,
                clock: 0,
                consumers: HashMap::new(),
                usage: HashMap::new(),
            }),
            _pixel: PhantomData,
        }
    }

    /// Registers a consumer that may be asked to clean up.
    pub fn register(&self, consumer: Weak<dyn CacheConsumer>) -> ConsumerId {
        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state.lock().consumers.insert(id, consumer);
        id
    }

    /// Forgets a consumer. Memory it still holds is released.
    pub fn unregister(&self, id: ConsumerId) {
        let mut state = self.state.lock();
        state.consumers.remove(&id);
        if let Some(usage) = state.usage.remove(&id) {
            log::error!(
                "{} unregistered while holding {} bytes, releasing them",
                id,
                usage.footprint
            );
            state.allocated -= usage.footprint;
        }
    }

    /// Admits `amount` bytes for `requestor`, evicting from the least
    /// recently active consumers as needed.
    ///
    /// Returns `false` if the memory cannot be made available, which
    /// happens when `amount` alone exceeds the ceiling or no consumer can
    /// free anything more.
    pub fn request_cache_memory(&self, requestor: ConsumerId, amount: u64) -> bool {
        if amount > self.max_cache_memory {
            log::warn!(
                "{} requested {} bytes, more than the whole {} tile cache ({} bytes)",
                requestor,
                amount,
                P::NAME,
                self.max_cache_memory
            );
            return false;
        }

        let mut exhausted: HashSet<ConsumerId> = HashSet::new();
        loop {
            let (victim_id, victim, footprint_before) = {
                let mut state = self.state.lock();
                if state.allocated + amount <= self.max_cache_memory {
                    state.clock += 1;
                    let now = state.clock;
                    state.allocated += amount;
                    let usage = state.usage.entry(requestor).or_insert(Usage {
                        footprint: 0,
                        last_access: now,
                    });
                    usage.footprint += amount;
                    usage.last_access = now;
                    return true;
                }

                let oldest = state
                    .usage
                    .iter()
                    .filter(|(id, _)| !exhausted.contains(*id))
                    .min_by_key(|(_, usage)| usage.last_access)
                    .map(|(id, usage)| (*id, usage.footprint));

                match oldest {
                    Some((id, footprint)) => {
                        let consumer = state.consumers.get(&id).and_then(Weak::upgrade);
                        (id, consumer, footprint)
                    }
                    None => {
                        log::warn!(
                            "Cannot free {} bytes for {}: {} of {} bytes in use and nothing left to evict",
                            amount,
                            requestor,
                            state.allocated,
                            self.max_cache_memory
                        );
                        return false;
                    }
                }
            };

            // the consumer calls back into release_cache_memory, so the lock must not be held here
            match victim {
                Some(consumer) => {
                    log::debug!("Evicting from {} ({} bytes) for {}", victim_id, footprint_before, requestor);
                    consumer.cleanup_cache();
                    if self.footprint_of(victim_id) >= footprint_before {
                        exhausted.insert(victim_id);
                    }
                }
                None => {
                    exhausted.insert(victim_id);
                }
            }
        }
    }

    /// Returns `amount` bytes previously admitted for `requestor`.
    ///
    /// # Panics
    ///
    /// Panics if `requestor` holds no memory or less than `amount` bytes.
    pub fn release_cache_memory(&self, requestor: ConsumerId, amount: u64) {
        let mut state = self.state.lock();
        let usage = match state.usage.get_mut(&requestor) {
            Some(usage) => usage,
            None => panic!("{} released {} bytes but holds no tile memory", requestor, amount),
        };
        assert!(
            amount <= usage.footprint,
            "{} released {} bytes but holds only {}",
            requestor,
            amount,
            usage.footprint
        );
        usage.footprint -= amount;
        if usage.footprint == 0 {
            state.usage.remove(&requestor);
        }
        state.allocated -= amount;
    }

    pub fn allocated_memory(&self) -> u64 {
        self.state.lock().allocated
    }

    pub fn max_cache_memory(&self) -> u64 {
        self.max_cache_memory
    }

    /// Number of consumers currently holding memory.
    pub fn consumer_count(&self) -> usize {
        self.state.lock().usage.len()
    }

    /// Bytes held by `id`; zero if it holds none.
    pub fn footprint_of(&self, id: ConsumerId) -> u64 {
        self.state.lock().usage.get(&id).map_or(0, |usage| usage.footprint)
    }

    /// Logs the per-consumer accounting at debug level.
    pub fn log_table(&self) {
        let state = self.state.lock();
        log::debug!(
            "Global {} tile cache: {} of {} bytes in use by {} consumers",
            P::NAME,
            state.allocated,
            self.max_cache_memory,
            state.usage.len()
        );
        let mut rows: Vec<_> = state.usage.iter().collect();
        rows.sort_by_key(|(_, usage)| usage.last_access);
        for (id, usage) in rows {
            log::debug!(
                "  {:>14} | {:>12} bytes | last access {}",
                id.to_string(),
                usage.footprint,
                usage.last_access
            );
        }
    }
}
