//! Cache Registry
//!
//! The registry is where caches are created and where they are cleared in
//! bulk.
//!
//! # How It Works
//!
//! 1. `cache_data` / `cache_resource` build a cache around a function and
//!    register it.
//!
//! 2. The registry keeps only a weak reference. Dropping every handle to a
//!    cache drops its entries, and the registry forgets it on the next sweep.
//!
//! 3. `clear_data`, `clear_resources` and `clear_all` walk the live caches
//!    and clear those of the matching policy.
//!
//! # Sharing
//!
//! `CacheRegistry` is a cheap handle; clones share the same set of caches.
//! One registry is normally shared by every session of an app.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::data::{DataCache, DataCacheOptions};
use super::key::FunctionId;
use super::resource::ResourceCache;
use crate::config::RuntimeConfig;
use crate::error::BoxError;

/// The two sharing policies a cache can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    /// Time-bounded, copy-on-read.
    Data,
    /// Permanent, shared by reference.
    Resource,
}

/// Hit/miss counters for one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// A trait for caches the registry can manage without knowing their types.
pub trait CacheStore: Send + Sync {
    /// Identity of the wrapped function.
    fn function(&self) -> &FunctionId;

    /// Which policy this cache follows.
    fn policy(&self) -> CachePolicy;

    /// Remove every entry.
    fn clear(&self);

    /// Current counters.
    fn stats(&self) -> CacheStats;
}

/// Creates caches and clears them in bulk.
#[derive(Clone)]
pub struct CacheRegistry {
    caches: Arc<RwLock<Vec<Weak<dyn CacheStore>>>>,
    clock: Arc<dyn Clock>,
    data_defaults: DataCacheOptions,
}

impl CacheRegistry {
    /// Create a registry on the system clock with no data-cache defaults.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a registry whose caches read time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            caches: Arc::new(RwLock::new(Vec::new())),
            clock,
            data_defaults: DataCacheOptions::default(),
        }
    }

    /// Create a registry taking data-cache defaults from `config`.
    pub fn from_config(config: &RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        let mut registry = Self::with_clock(clock);
        registry.data_defaults = DataCacheOptions {
            ttl: config.default_data_ttl,
            max_entries: config.data_cache_max_entries,
        };
        registry
    }

    /// The clock handed to every cache this registry creates.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Wrap `compute` in a data cache.
    ///
    /// Options left unset fall back to the registry's defaults.
    pub fn cache_data<A, T, E, F>(
        &self,
        function: impl Into<FunctionId>,
        options: DataCacheOptions,
        compute: F,
    ) -> DataCache<A, T>
    where
        A: Serialize + 'static,
        T: Serialize + DeserializeOwned + 'static,
        E: Into<BoxError>,
        F: Fn(&A) -> Result<T, E> + Send + Sync + 'static,
    {
        let options = options.or(&self.data_defaults);
        let cache = DataCache::new(function, options, Arc::clone(&self.clock), compute);
        self.register(cache.store());
        cache
    }

    /// Wrap `compute` in a data cache with only a ttl.
    pub fn cache_data_ttl<A, T, E, F>(
        &self,
        function: impl Into<FunctionId>,
        ttl: Duration,
        compute: F,
    ) -> DataCache<A, T>
    where
        A: Serialize + 'static,
        T: Serialize + DeserializeOwned + 'static,
        E: Into<BoxError>,
        F: Fn(&A) -> Result<T, E> + Send + Sync + 'static,
    {
        self.cache_data(function, DataCacheOptions::new().with_ttl(ttl), compute)
    }

    /// Wrap `compute` in a resource cache.
    pub fn cache_resource<A, T, E, F>(
        &self,
        function: impl Into<FunctionId>,
        compute: F,
    ) -> ResourceCache<A, T>
    where
        A: Serialize + 'static,
        T: Send + Sync + 'static,
        E: Into<BoxError>,
        F: Fn(&A) -> Result<T, E> + Send + Sync + 'static,
    {
        let cache = ResourceCache::new(function, compute);
        self.register(cache.store());
        cache
    }

    /// Track a cache. Dead entries are swept on the way.
    pub fn register(&self, store: Arc<dyn CacheStore>) {
        let mut caches = self.caches.write();
        caches.retain(|weak| weak.strong_count() > 0);
        debug!(function = %store.function(), policy = ?store.policy(), "registered cache");
        caches.push(Arc::downgrade(&store));
    }

    /// Clear every live data cache.
    pub fn clear_data(&self) {
        self.clear_matching(Some(CachePolicy::Data));
    }

    /// Clear every live resource cache.
    pub fn clear_resources(&self) {
        self.clear_matching(Some(CachePolicy::Resource));
    }

    /// Clear every live cache of either policy.
    pub fn clear_all(&self) {
        self.clear_matching(None);
    }

    fn clear_matching(&self, policy: Option<CachePolicy>) {
        let live = self.live();
        let mut cleared = 0;
        for store in live {
            if policy.map_or(true, |p| store.policy() == p) {
                store.clear();
                cleared += 1;
            }
        }
        debug!(?policy, cleared, "cleared caches");
    }

    /// Stats of every live cache, by function.
    pub fn stats(&self) -> Vec<(FunctionId, CachePolicy, CacheStats)> {
        self.live()
            .into_iter()
            .map(|store| (store.function().clone(), store.policy(), store.stats()))
            .collect()
    }

    /// Number of live caches.
    pub fn len(&self) -> usize {
        self.caches
            .read()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Upgrade outside the lock so a cache's `clear` never runs under it.
    fn live(&self) -> Vec<Arc<dyn CacheStore>> {
        self.caches.read().iter().filter_map(Weak::upgrade).collect()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.len())
            .field("clock", &self.clock)
            .field("data_defaults", &self.data_defaults)
            .finish()
    }
}
