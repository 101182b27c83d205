//! Session State Store
//!
//! `SessionState` is the single source of truth for everything a session
//! remembers between runs: values written by page logic, values committed by
//! widgets bound to a key, and defaults registered up front.
//!
//! # Storage
//!
//! Values are stored as `serde_json::Value`, so any `Serialize` type can go
//! in and any `DeserializeOwned` type can come back out. Keys keep their
//! insertion order, which is the order the state is shown when inspected.
//!
//! # Ownership
//!
//! A `SessionState` is owned by exactly one session and handed to the script
//! runner by `&mut` for the duration of a run. There is no ambient global
//! state: two sessions never see each other's keys.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};

/// Per-session key/value store persisted across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Values in insertion order.
    values: IndexMap<String, Value>,

    /// Fallbacks returned by `get` for keys that were never written.
    defaults: HashMap<String, Value>,
}

impl SessionState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the raw value for `key`, falling back to its registered default.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.values
            .get(key)
            .or_else(|| self.defaults.get(key))
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    /// Get the value for `key` deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key)?;
        serde_json::from_value(value.clone()).map_err(|source| Error::TypeMismatch {
            key: key.to_string(),
            source,
        })
    }

    /// Write `value` under `key`, replacing any previous value.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.set_value(key, value);
        Ok(())
    }

    /// Write an already-converted value.
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        trace!(key = %key, "session state write");
        self.values.insert(key, value);
    }

    /// Whether `key` has been written. Registered defaults do not count.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Write `value` only if `key` is absent. Returns true if it was written.
    ///
    /// This is the "initialize once" idiom: calling it on every run leaves a
    /// value modified by the user untouched.
    pub fn init<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<bool> {
        let key = key.into();
        if self.has(&key) {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }

    /// Register the value `get` returns for `key` until it is first written.
    pub fn set_default<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.defaults.insert(key.into(), value);
        Ok(())
    }

    /// Read, transform and write back a typed value.
    ///
    /// Fails with `KeyNotFound` if the key has neither a value nor a default.
    pub fn update<T, F>(&mut self, key: &str, f: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let current = self.get_as::<T>(key)?;
        self.set(key.to_string(), f(current))
    }

    /// Remove `key`, returning its value if it was written.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    /// Iterate written keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate written entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of written keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no key has been written.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Remove every written value. Registered defaults are kept.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Snapshot of every written value as a JSON object, for display.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
