//! Namespace-keyed value store with hydration, subscriptions, and
//! debounced write-back persistence.
//!
//! Each namespace ("store") holds one current JSON value in memory,
//! remembers whether it has been loaded ("hydrated") from the persistence
//! backend, notifies subscribers on every change, and writes changes back
//! to the backend after a coalescing quiet period rather than on every
//! mutation. The backend is pluggable: anything implementing
//! [`StorageAdapter`] (see the `nvs-adapter` crate).
//!
//! # Architecture
//!
//! - [`Registry`] maps namespace strings to [`Store`] engines, creating
//!   each on first use and returning the same instance thereafter.
//! - [`Store`] is the per-namespace engine: hydration state machine,
//!   ordered subscriber notification, single-slot debounce timer.
//! - Configuration (adapter, logging, write delay) lives in one shared
//!   cell owned by the registry; stores read it at each operation, so
//!   reconfiguration takes effect everywhere immediately.
//!
//! A process-global registry backs the free functions below; hosts that
//! prefer explicit ownership can construct their own [`Registry`].
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use nvs_adapter::MemoryAdapter;
//! use nvs_store::{ConfigOptions, StoreOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> nvs_store::StoreResult<()> {
//! nvs_store::configure(
//!     ConfigOptions::new()
//!         .storage(Arc::new(MemoryAdapter::new()))
//!         .log(true),
//! );
//!
//! let theme = nvs_store::store("theme", StoreOptions::default())?;
//! theme.hydrate().await?;
//!
//! let sub = theme.subscribe(
//!     |new, _old| println!("theme changed: {new:?}"),
//!     Default::default(),
//! );
//! theme.set(serde_json::json!({ "mode": "dark" }));
//! assert!(theme.initialized());
//! assert_eq!(theme.value(), Some(serde_json::json!({ "mode": "dark" })));
//! sub.unsubscribe();
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`] — process-wide configuration and log sinks
//! - [`error`] — [`StoreError`] and the [`StoreResult`] alias
//! - [`registry`] — [`Registry`] and bulk operations
//! - [`store`] — the per-namespace [`Store`] engine

pub mod config;
pub mod error;
pub mod registry;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export primary types at crate root for ergonomic imports.
pub use config::{ConfigOptions, LogConfig, DEFAULT_WRITE_DELAY};
pub use error::{StoreError, StoreResult};
pub use registry::{HydrateOutcome, Registry};
pub use store::{Store, StoreOptions, SubscribeOptions, Subscription};

// Re-export the adapter boundary and the value type.
pub use nvs_adapter::{AdapterContext, AdapterError, StorageAdapter};
pub use serde_json::Value;

use std::sync::LazyLock;

/// The process-global registry backing the free functions.
static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// The process-global [`Registry`].
pub fn registry() -> &'static Registry {
    &GLOBAL
}

/// Configure the global registry. See [`Registry::configure`].
pub fn configure(options: ConfigOptions) {
    GLOBAL.configure(options);
}

/// Get or create the global store for `namespace`. See [`Registry::store`].
pub fn store(namespace: &str, options: StoreOptions) -> StoreResult<Store> {
    GLOBAL.store(namespace, options)
}

/// Hydrate every globally registered store. See [`Registry::hydrate_all`].
pub async fn hydrate_all() -> Vec<HydrateOutcome> {
    GLOBAL.hydrate_all().await
}

/// Clear the in-memory value of every globally registered store.
/// See [`Registry::clear_all`].
pub fn clear_all() {
    GLOBAL.clear_all()
}
