//! Data Cache
//!
//! A data cache memoizes a function's return value per distinct argument
//! set, for a bounded time.
//!
//! # How Data Caches Work
//!
//! 1. On call, derive the key from the function id and the arguments.
//!
//! 2. If a live entry exists, decode a fresh copy of its value and return it.
//!    The function is not invoked.
//!
//! 3. Otherwise invoke the function, encode the result, store it with the
//!    current time, and return it.
//!
//! 4. An entry older than its ttl is dead: the next call drops it and
//!    recomputes.
//!
//! # Copy On Read
//!
//! Values are stored encoded (MessagePack, structs as named maps so skipped
//! fields decode back correctly) and decoded on every hit. Each
//! caller owns what it gets back, so one session mutating its copy never
//! leaks into another session's.
//!
//! # Failures
//!
//! If the function fails nothing is stored and the error reaches the caller
//! as `CacheComputationFailed`. The next call tries again.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use super::clock::Clock;
use super::key::{CacheKey, FunctionId};
use super::registry::{CachePolicy, CacheStats, CacheStore};
use crate::error::{BoxError, Error, Result};

/// Tuning for one data cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataCacheOptions {
    /// How long an entry stays live. `None` means forever.
    pub ttl: Option<Duration>,

    /// Most entries kept at once; the oldest is evicted first.
    pub max_entries: Option<usize>,
}

impl DataCacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Fill unset fields from `defaults`.
    pub fn or(self, defaults: &DataCacheOptions) -> Self {
        Self {
            ttl: self.ttl.or(defaults.ttl),
            max_entries: self.max_entries.or(defaults.max_entries),
        }
    }
}

/// One stored result.
#[derive(Debug, Clone)]
struct DataEntry {
    encoded: Vec<u8>,
    created_at: Instant,
    ttl: Option<Duration>,
}

impl DataEntry {
    fn is_live(&self, now: Instant) -> bool {
        match self.ttl {
            None => true,
            Some(ttl) => now.saturating_duration_since(self.created_at) < ttl,
        }
    }
}

type ComputeFn<A, T> = dyn Fn(&A) -> std::result::Result<T, BoxError> + Send + Sync;

struct DataCacheInner<A, T> {
    function: FunctionId,
    compute: Box<ComputeFn<A, T>>,
    options: DataCacheOptions,
    clock: Arc<dyn Clock>,

    /// Entries in insertion order, so eviction can take the oldest.
    entries: Mutex<IndexMap<CacheKey, DataEntry>>,

    /// One lock per key being computed.
    in_flight: DashMap<CacheKey, Arc<Mutex<()>>>,

    hits: AtomicU64,
    misses: AtomicU64,

    _types: PhantomData<fn(&A) -> T>,
}

/// A function wrapped in a time-bounded, copy-on-read cache.
///
/// Clones share the same entries.
pub struct DataCache<A, T> {
    inner: Arc<DataCacheInner<A, T>>,
}

impl<A, T> DataCache<A, T>
where
    A: Serialize + 'static,
    T: Serialize + DeserializeOwned + 'static,
{
    /// Wrap `compute`. Prefer [`CacheRegistry::cache_data`], which also
    /// registers the cache for bulk clearing.
    ///
    /// [`CacheRegistry::cache_data`]: super::CacheRegistry::cache_data
    pub fn new<E, F>(
        function: impl Into<FunctionId>,
        options: DataCacheOptions,
        clock: Arc<dyn Clock>,
        compute: F,
    ) -> Self
    where
        E: Into<BoxError>,
        F: Fn(&A) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DataCacheInner {
                function: function.into(),
                compute: Box::new(move |args: &A| compute(args).map_err(Into::into)),
                options,
                clock,
                entries: Mutex::new(IndexMap::new()),
                in_flight: DashMap::new(),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                _types: PhantomData,
            }),
        }
    }

    /// Return the cached value for `args`, computing it on a miss.
    pub fn call(&self, args: &A) -> Result<T> {
        let inner = &self.inner;
        let key = CacheKey::derive(&inner.function, args)?;

        if let Some(value) = self.lookup(&key)? {
            return Ok(value);
        }

        // Serialize computations of the same key; whoever waited re-checks.
        let lock = inner.in_flight.entry(key.clone()).or_default().clone();
        let _guard = lock.lock();

        if let Some(value) = self.lookup(&key)? {
            return Ok(value);
        }

        inner.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "data cache miss, computing");

        let outcome = (inner.compute)(args)
            .map_err(|source| Error::CacheComputationFailed {
                function: inner.function.to_string(),
                source,
            })
            .and_then(|value| {
                let entry = DataEntry {
                    encoded: rmp_serde::to_vec_named(&value)?,
                    created_at: inner.clock.now(),
                    ttl: inner.options.ttl,
                };
                self.insert(key.clone(), entry);
                Ok(value)
            });

        // Only after the entry is visible, so late arrivals hit it.
        inner.in_flight.remove(&key);
        outcome
    }

    fn lookup(&self, key: &CacheKey) -> Result<Option<T>> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let mut entries = inner.entries.lock();

        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if !entry.is_live(now) {
            debug!(key = %key, "data cache entry expired");
            entries.shift_remove(key);
            return Ok(None);
        }

        let value = rmp_serde::from_slice(&entry.encoded)?;
        inner.hits.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, "data cache hit");
        Ok(Some(value))
    }

    fn insert(&self, key: CacheKey, entry: DataEntry) {
        let mut entries = self.inner.entries.lock();
        entries.shift_remove(&key);
        entries.insert(key, entry);

        if let Some(max) = self.inner.options.max_entries {
            while entries.len() > max {
                if let Some((evicted, _)) = entries.shift_remove_index(0) {
                    debug!(key = %evicted, "evicted oldest data cache entry");
                }
            }
        }
    }

    /// Remove every entry of this function.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// When the live entry for `args` was stored, if there is one.
    pub fn created_at(&self, args: &A) -> Result<Option<Instant>> {
        let key = CacheKey::derive(&self.inner.function, args)?;
        let now = self.inner.clock.now();
        Ok(self
            .inner
            .entries
            .lock()
            .get(&key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.created_at))
    }

    pub fn function(&self) -> &FunctionId {
        &self.inner.function
    }

    pub fn options(&self) -> DataCacheOptions {
        self.inner.options
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    /// Number of stored entries, live or not yet swept.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn store(&self) -> Arc<dyn CacheStore> {
        self.inner.clone()
    }
}

impl<A, T> CacheStore for DataCacheInner<A, T>
where
    A: 'static,
    T: 'static,
{
    fn function(&self) -> &FunctionId {
        &self.function
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::Data
    }

    fn clear(&self) {
        let mut entries = self.entries.lock();
        debug!(function = %self.function, removed = entries.len(), "cleared data cache");
        entries.clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }
}

impl<A, T> Clone for DataCache<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> fmt::Debug for DataCache<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataCache")
            .field("function", &self.inner.function)
            .field("options", &self.inner.options)
            .field("entries", &self.inner.entries.lock().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
