//! KeyStore implementation
//!
//! HashMap-based store with RwLock for concurrency.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{KvError, Result};

/// Concurrency-safe string map
///
/// ## Concurrency:
/// - `get`/`len`/`snapshot` take the read lock (many concurrent readers)
/// - `put`/`delete` take the write lock for one map mutation
/// - No method blocks on I/O
#[derive(Debug, Default)]
pub struct KeyStore {
    data: RwLock<HashMap<String, String>>,
}

impl KeyStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().insert(key.into(), value.into());
    }

    /// Get the current value for `key`
    ///
    /// Returns `KvError::KeyNotFound` when the key is absent.
    pub fn get(&self, key: &str) -> Result<String> {
        self.data
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| KvError::KeyNotFound(key.to_string()))
    }

    /// Remove `key`; removing an absent key is a no-op
    pub fn delete(&self, key: &str) {
        self.data.write().remove(key);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy of every live pair, sorted by key
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort();
        pairs
    }
}
