//! The registry: one store per namespace, plus bulk operations.
//!
//! A [`Registry`] owns the shared configuration cell and the map from
//! namespace to [`Store`]. Stores are created lazily on first use and
//! live for the registry's lifetime; there is no disposal API.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::task::JoinSet;

use crate::config::{ConfigOptions, SharedConfig};
use crate::error::{StoreError, StoreResult};
use crate::store::{Store, StoreOptions};

/// Result of hydrating one namespace during [`Registry::hydrate_all`].
#[derive(Debug)]
pub struct HydrateOutcome {
    /// The namespace that was hydrated.
    pub namespace: String,
    /// The outcome of that namespace's `hydrate()`.
    pub result: StoreResult<()>,
}

impl HydrateOutcome {
    /// `true` if this namespace hydrated without error.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Process-wide mapping from namespace to store.
pub struct Registry {
    config: Arc<RwLock<SharedConfig>>,
    stores: RwLock<HashMap<String, Store>>,
}

impl Registry {
    /// Create an unconfigured registry. Stores can be created and used
    /// immediately; persistence starts once [`configure`](Self::configure)
    /// supplies a storage adapter.
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(SharedConfig::unconfigured())),
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Apply a configuration update.
    ///
    /// Fields omitted from `options` keep their current values; provided
    /// fields are applied together under one lock. Takes effect for the
    /// next operation on every store, past and future -- stores read the
    /// configuration lazily, never caching it at creation time.
    pub fn configure(&self, options: ConfigOptions) {
        self.config.write().expect("lock poisoned").apply(options);
    }

    /// Return the store for `namespace`, creating it on first use.
    ///
    /// Idempotent: repeated calls return the same instance, and `options`
    /// is honored only on the call that creates the store (first-call
    /// options win). Fails with [`StoreError::InvalidNamespace`] for an
    /// empty namespace.
    pub fn store(&self, namespace: &str, options: StoreOptions) -> StoreResult<Store> {
        if namespace.is_empty() {
            return Err(StoreError::InvalidNamespace(namespace.to_string()));
        }

        if let Some(store) = self.stores.read().expect("lock poisoned").get(namespace) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write().expect("lock poisoned");
        // Re-check: another caller may have created it between locks.
        let store = stores
            .entry(namespace.to_string())
            .or_insert_with(|| {
                Store::new(namespace.to_string(), options, Arc::clone(&self.config))
            })
            .clone();
        Ok(store)
    }

    /// Hydrate every registered store concurrently.
    ///
    /// One store's failure never prevents the others from completing;
    /// each namespace's outcome is collected and returned, sorted by
    /// namespace for stable reporting. Cross-namespace ordering of the
    /// hydrations themselves is unspecified.
    pub async fn hydrate_all(&self) -> Vec<HydrateOutcome> {
        let stores: Vec<Store> = {
            let stores = self.stores.read().expect("lock poisoned");
            stores.values().cloned().collect()
        };

        let mut tasks = JoinSet::new();
        for store in stores {
            tasks.spawn(async move {
                let result = store.hydrate().await;
                HydrateOutcome {
                    namespace: store.namespace().to_string(),
                    result,
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    let log = {
                        let config = self.config.read().expect("lock poisoned");
                        config.log.clone()
                    };
                    log.warn(&format!("hydrate task failed: {e}"));
                }
            }
        }
        outcomes.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        outcomes
    }

    /// Clear the in-memory value of every registered store.
    ///
    /// Synchronous; backend storage is untouched. Equivalent to calling
    /// each store's `clear()`.
    pub fn clear_all(&self) {
        let stores: Vec<Store> = {
            let stores = self.stores.read().expect("lock poisoned");
            stores.values().cloned().collect()
        };
        // Lock released first: clear() runs subscriber callbacks, which
        // may re-enter the registry.
        for store in stores {
            store.clear();
        }
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no store has been created yet.
    pub fn is_empty(&self) -> bool {
        self.stores.read().expect("lock poisoned").is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("store_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{capture_log, CountingAdapter, FlakyAdapter};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn configured(adapter: Arc<dyn nvs_adapter::StorageAdapter>) -> Registry {
        let registry = Registry::new();
        registry.configure(
            ConfigOptions::new()
                .storage(adapter)
                .write_delay(Duration::from_millis(50)),
        );
        registry
    }

    // -----------------------------------------------------------------------
    // 1. Store identity and creation
    // -----------------------------------------------------------------------

    #[test]
    fn same_namespace_returns_same_instance() {
        let registry = Registry::new();
        let a = registry.store("theme", StoreOptions::default()).unwrap();
        let b = registry.store("theme", StoreOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_namespaces_get_distinct_stores() {
        let registry = Registry::new();
        let a = registry.store("a", StoreOptions::default()).unwrap();
        let b = registry.store("b", StoreOptions::default()).unwrap();
        assert!(!Arc::ptr_eq(&a.inner, &b.inner));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn shared_instance_sees_writes_from_any_handle() {
        let registry = Registry::new();
        let a = registry.store("shared", StoreOptions::default()).unwrap();
        let b = registry.store("shared", StoreOptions::default()).unwrap();
        a.set(json!({"n": 1}));
        assert_eq!(b.value(), Some(json!({"n": 1})));
    }

    #[test]
    fn empty_namespace_is_rejected() {
        let registry = Registry::new();
        let err = registry.store("", StoreOptions::default()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidNamespace(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn first_call_options_win() {
        let registry = Registry::new();
        let first = registry.store("x", StoreOptions::encrypted()).unwrap();
        let second = registry.store("x", StoreOptions::default()).unwrap();
        assert!(first.options().encrypted);
        assert!(second.options().encrypted);
    }

    // -----------------------------------------------------------------------
    // 2. hydrate_all
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn hydrate_all_collects_per_namespace_outcomes() {
        let adapter = Arc::new(FlakyAdapter::new());
        adapter.seed("good", r#"{"v":1}"#);
        adapter.fail_key("bad");
        let registry = configured(adapter);

        let good = registry.store("good", StoreOptions::default()).unwrap();
        let bad = registry.store("bad", StoreOptions::default()).unwrap();
        let absent = registry.store("absent", StoreOptions::default()).unwrap();

        let outcomes = registry.hydrate_all().await;
        assert_eq!(outcomes.len(), 3);
        // Sorted by namespace: absent, bad, good.
        assert_eq!(outcomes[0].namespace, "absent");
        assert!(outcomes[0].is_ok());
        assert_eq!(outcomes[1].namespace, "bad");
        assert!(matches!(outcomes[1].result, Err(StoreError::Storage(_))));
        assert_eq!(outcomes[2].namespace, "good");
        assert!(outcomes[2].is_ok());

        // The failing namespace did not prevent the others.
        assert_eq!(good.value(), Some(json!({"v": 1})));
        assert!(good.initialized());
        assert!(absent.initialized());
        assert!(!bad.initialized());
    }

    #[tokio::test]
    async fn hydrate_all_on_empty_registry_returns_nothing() {
        let registry = Registry::new();
        assert!(registry.hydrate_all().await.is_empty());
    }

    // -----------------------------------------------------------------------
    // 3. clear_all
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn clear_all_clears_memory_but_not_backend() {
        let adapter = Arc::new(CountingAdapter::new());
        adapter.seed("a", r#"1"#);
        let registry = configured(Arc::clone(&adapter) as _);

        let a = registry.store("a", StoreOptions::default()).unwrap();
        let b = registry.store("b", StoreOptions::default()).unwrap();
        a.hydrate().await.unwrap();
        b.set(json!(2));

        registry.clear_all();
        assert_eq!(a.value(), None);
        assert_eq!(b.value(), None);
        // Hydration flags survive a clear.
        assert!(a.initialized());
        // Backend untouched.
        assert_eq!(adapter.raw("a"), Some("1".to_string()));
        assert_eq!(adapter.removes(), 0);
    }

    // -----------------------------------------------------------------------
    // 4. Reconfiguration
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn reconfiguring_storage_redirects_existing_stores() {
        let first = Arc::new(CountingAdapter::new());
        let second = Arc::new(CountingAdapter::new());
        let registry = configured(Arc::clone(&first) as _);

        let store = registry.store("s", StoreOptions::default()).unwrap();
        registry.configure(ConfigOptions::new().storage(Arc::clone(&second) as _));

        store.set(json!("after-swap"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(first.writes(), 0);
        assert_eq!(second.writes(), 1);
        assert_eq!(second.raw("s"), Some(r#""after-swap""#.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_reconfiguration_keeps_other_fields() {
        let adapter = Arc::new(CountingAdapter::new());
        let (messages, log) = capture_log();
        let registry = Registry::new();
        registry.configure(ConfigOptions::new().log(log));
        // Storage-only update must not drop the custom log sink.
        registry.configure(
            ConfigOptions::new()
                .storage(Arc::clone(&adapter) as _)
                .write_delay(Duration::from_millis(10)),
        );

        let store = registry.store("s", StoreOptions::default()).unwrap();
        store.set(json!(1));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(adapter.writes(), 1);
        assert!(messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m == "[s] persisted"));
    }
}
