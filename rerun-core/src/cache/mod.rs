//! Cache Layer
//!
//! Memoization of expensive computations across runs, keyed by function
//! identity plus arguments.
//!
//! # Policies
//!
//! ## Data caches
//!
//! Time-bounded and copy-on-read. Results are stored encoded and every hit
//! decodes a fresh value, so sessions can mutate what they get back freely.
//! Use them for loaded or transformed data.
//!
//! ## Resource caches
//!
//! Permanent and shared by reference. Every caller with the same arguments
//! gets the same `Arc<T>`. Use them for singletons such as models or
//! connection pools.
//!
//! # Wrapping
//!
//! There are no annotations: a cache is a value built around a function by
//! the [`CacheRegistry`], and calling it goes through [`DataCache::call`] or
//! [`ResourceCache::call`]. The registry keeps weak references to every cache
//! it created so they can be cleared in bulk.

mod clock;
mod data;
mod key;
mod registry;
mod resource;

pub use clock::{Clock, ManualClock, SystemClock};
pub use data::{DataCache, DataCacheOptions};
pub use key::{CacheKey, FunctionId};
pub use registry::{CachePolicy, CacheRegistry, CacheStats, CacheStore};
pub use resource::ResourceCache;
