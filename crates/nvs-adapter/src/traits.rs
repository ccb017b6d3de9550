//! The [`StorageAdapter`] trait defining the persistence interface.
//!
//! Any backend (in-memory, filesystem, platform keychain, remote service)
//! implements this trait to provide write-back persistence for namespace
//! stores.

use async_trait::async_trait;

use crate::error::AdapterResult;

/// Per-store options forwarded to every adapter call.
///
/// The core never interprets these; they are captured when a store is
/// created and passed through verbatim. A backend that supports at-rest
/// encryption can honor `encrypted`; others are free to ignore it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdapterContext {
    /// The store requested at-rest encryption for its payloads.
    pub encrypted: bool,
}

/// Persistence backend for namespace stores.
///
/// All implementations must satisfy these invariants:
/// - `get` on an unknown key resolves to `Ok(None)` -- confirmed absence
///   is a successful read, not an error.
/// - `set` replaces the whole payload for a key.
/// - `remove` of an unknown key resolves to `Ok(())` (idempotent).
/// - The adapter never interprets payloads; it stores opaque strings.
/// - All I/O errors are propagated, never silently ignored.
///
/// Operations may take arbitrarily long; the core imposes no timeout.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Read the payload stored under `key`.
    async fn get(&self, key: &str, ctx: &AdapterContext) -> AdapterResult<Option<String>>;

    /// Write `value` under `key`, replacing any previous payload.
    async fn set(&self, key: &str, value: String, ctx: &AdapterContext) -> AdapterResult<()>;

    /// Delete the payload stored under `key`, if any.
    async fn remove(&self, key: &str, ctx: &AdapterContext) -> AdapterResult<()>;
}
