//! Cache keys.
//!
//! A key is the wrapped function's identity plus a MessagePack encoding of
//! its arguments. Structs are encoded as maps with field names, so a
//! skipped optional field can never shift another field into its slot. Equal arguments always encode to equal bytes as long as
//! their `Serialize` impl is deterministic; maps should be ordered
//! (`BTreeMap`, `IndexMap`) rather than `HashMap`.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::Result;

/// Identity of a cached function.
///
/// Two caches with the same id are still independent; the id names the
/// function in keys, logs and registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(Arc<str>);

impl FunctionId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FunctionId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FunctionId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Key of one cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    function: FunctionId,
    /// Encoded arguments; most argument tuples fit inline.
    args: SmallVec<[u8; 32]>,
}

impl CacheKey {
    /// Derive the key for calling `function` with `args`.
    pub fn derive<A: Serialize + ?Sized>(function: &FunctionId, args: &A) -> Result<Self> {
        let encoded = rmp_serde::to_vec_named(args)?;
        Ok(Self {
            function: function.clone(),
            args: SmallVec::from_vec(encoded),
        })
    }

    pub fn function(&self) -> &FunctionId {
        &self.function
    }

    /// Short fingerprint for logs.
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:016x}", self.function, self.digest())
    }
}
