//! Resource Cache
//!
//! A resource cache holds exactly one instance per distinct argument set and
//! hands out that same instance to every caller in every session. It is
//! meant for expensive singletons: loaded models, connection pools, parsed
//! reference tables.
//!
//! Entries never expire; only `clear` (or the registry's bulk clear) removes
//! them. Values come back as `Arc<T>`, so callers share the object rather
//! than a copy. Mutating a resource needs synchronization inside `T`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use super::key::{CacheKey, FunctionId};
use super::registry::{CachePolicy, CacheStats, CacheStore};
use crate::error::{BoxError, Error, Result};

type ComputeFn<A, T> = dyn Fn(&A) -> std::result::Result<T, BoxError> + Send + Sync;

struct ResourceCacheInner<A, T> {
    function: FunctionId,
    compute: Box<ComputeFn<A, T>>,
    entries: DashMap<CacheKey, Arc<T>>,
    in_flight: DashMap<CacheKey, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    _args: PhantomData<fn(&A)>,
}

/// A function wrapped in a permanent, shared-by-reference cache.
///
/// Clones share the same entries.
pub struct ResourceCache<A, T> {
    inner: Arc<ResourceCacheInner<A, T>>,
}

impl<A, T> ResourceCache<A, T>
where
    A: Serialize + 'static,
    T: Send + Sync + 'static,
{
    /// Wrap `compute`. Prefer [`CacheRegistry::cache_resource`], which also
    /// registers the cache for bulk clearing.
    ///
    /// [`CacheRegistry::cache_resource`]: super::CacheRegistry::cache_resource
    pub fn new<E, F>(function: impl Into<FunctionId>, compute: F) -> Self
    where
        E: Into<BoxError>,
        F: Fn(&A) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ResourceCacheInner {
                function: function.into(),
                compute: Box::new(move |args: &A| compute(args).map_err(Into::into)),
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                _args: PhantomData,
            }),
        }
    }

    /// Return the shared instance for `args`, creating it on a miss.
    pub fn call(&self, args: &A) -> Result<Arc<T>> {
        let inner = &self.inner;
        let key = CacheKey::derive(&inner.function, args)?;

        if let Some(value) = self.lookup(&key) {
            return Ok(value);
        }

        let lock = inner.in_flight.entry(key.clone()).or_default().clone();
        let _guard = lock.lock();

        if let Some(value) = self.lookup(&key) {
            return Ok(value);
        }

        inner.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "resource cache miss, creating instance");

        let outcome = (inner.compute)(args)
            .map(|value| {
                let value = Arc::new(value);
                inner.entries.insert(key.clone(), Arc::clone(&value));
                value
            })
            .map_err(|source| Error::CacheComputationFailed {
                function: inner.function.to_string(),
                source,
            });

        inner.in_flight.remove(&key);
        outcome
    }

    fn lookup(&self, key: &CacheKey) -> Option<Arc<T>> {
        let value = self.inner.entries.get(key).map(|entry| Arc::clone(entry.value()))?;
        self.inner.hits.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, "resource cache hit");
        Some(value)
    }

    /// Drop every instance this cache holds. Callers keep the `Arc`s they have.
    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn function(&self) -> &FunctionId {
        &self.inner.function
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub(crate) fn store(&self) -> Arc<dyn CacheStore> {
        self.inner.clone()
    }
}

impl<A, T> CacheStore for ResourceCacheInner<A, T>
where
    A: 'static,
    T: Send + Sync + 'static,
{
    fn function(&self) -> &FunctionId {
        &self.function
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::Resource
    }

    fn clear(&self) {
        debug!(function = %self.function, removed = self.entries.len(), "cleared resource cache");
        self.entries.clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl<A, T> Clone for ResourceCache<A, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> fmt::Debug for ResourceCache<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("function", &self.inner.function)
            .field("entries", &self.inner.entries.len())
            .finish()
    }
}
