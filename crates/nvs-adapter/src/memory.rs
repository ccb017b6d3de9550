//! In-memory backend for testing and ephemeral use.
//!
//! [`MemoryAdapter`] stores all payloads in a `HashMap` protected by a
//! `RwLock`. It implements the full [`StorageAdapter`] trait and is
//! suitable for unit tests, REPL sessions, and processes that want the
//! store machinery without durable persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::AdapterResult;
use crate::traits::{AdapterContext, StorageAdapter};

/// An in-memory implementation of [`StorageAdapter`].
///
/// All data lives in a `HashMap` behind a `RwLock` and is lost when the
/// adapter is dropped. Operations never fail.
pub struct MemoryAdapter {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryAdapter {
    /// Create a new empty adapter.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }

    /// Returns `true` if a payload exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .expect("lock poisoned")
            .contains_key(key)
    }

    /// Read a payload without going through the async trait.
    ///
    /// Test helper: lets assertions inspect backend contents directly.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.read().expect("lock poisoned").get(key).cloned()
    }

    /// Seed a payload without going through the async trait.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(key.into(), value.into());
    }

    /// Remove all payloads.
    pub fn clear(&self) {
        self.entries.write().expect("lock poisoned").clear();
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn get(&self, key: &str, _ctx: &AdapterContext) -> AdapterResult<Option<String>> {
        let entries = self.entries.read().expect("lock poisoned");
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String, _ctx: &AdapterContext) -> AdapterResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str, _ctx: &AdapterContext) -> AdapterResult<()> {
        let mut entries = self.entries.write().expect("lock poisoned");
        entries.remove(key);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("entry_count", &self.len())
            .finish()
    }
}
