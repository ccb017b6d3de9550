//! Pluggable persistence backends for the nvs namespace store.
//!
//! The core store engine never talks to disk, network, or platform storage
//! directly. It hands a namespace key and an opaque string payload to a
//! [`StorageAdapter`] and gets an equivalent payload back later. Everything
//! else -- encryption, transport, on-disk format -- is the adapter's
//! business.
//!
//! # Backends
//!
//! All backends implement the [`StorageAdapter`] trait:
//!
//! - [`MemoryAdapter`] -- `HashMap`-based backend for tests and embedding
//! - [`FsAdapter`] -- one file per namespace under a root directory
//!
//! # Design Rules
//!
//! 1. Absence is not an error: `get` on an unknown key returns `Ok(None)`,
//!    `remove` on an unknown key returns `Ok(())`.
//! 2. Writes replace the whole value for a key; there are no partial
//!    updates.
//! 3. The adapter never interprets payloads -- it is a pure key-value
//!    string store.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{AdapterError, AdapterResult};
pub use fs::FsAdapter;
pub use memory::MemoryAdapter;
pub use traits::{AdapterContext, StorageAdapter};
