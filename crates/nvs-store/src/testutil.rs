//! Instrumented adapters and recorders shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nvs_adapter::{AdapterContext, AdapterError, AdapterResult, MemoryAdapter, StorageAdapter};
use serde_json::Value;
use tokio::sync::watch;

use crate::config::LogConfig;

/// Memory adapter that counts operations and records the contexts it saw.
pub(crate) struct CountingAdapter {
    inner: MemoryAdapter,
    reads: AtomicUsize,
    writes: AtomicUsize,
    removes: AtomicUsize,
    contexts: Mutex<Vec<AdapterContext>>,
}

impl CountingAdapter {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryAdapter::new(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub(crate) fn contexts(&self) -> Vec<AdapterContext> {
        self.contexts.lock().unwrap().clone()
    }

    pub(crate) fn seed(&self, key: &str, payload: &str) {
        self.inner.insert_raw(key, payload);
    }

    pub(crate) fn raw(&self, key: &str) -> Option<String> {
        self.inner.raw(key)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    fn record(&self, ctx: &AdapterContext) {
        self.contexts.lock().unwrap().push(*ctx);
    }
}

#[async_trait]
impl StorageAdapter for CountingAdapter {
    async fn get(&self, key: &str, ctx: &AdapterContext) -> AdapterResult<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.record(ctx);
        self.inner.get(key, ctx).await
    }

    async fn set(&self, key: &str, value: String, ctx: &AdapterContext) -> AdapterResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.record(ctx);
        self.inner.set(key, value, ctx).await
    }

    async fn remove(&self, key: &str, ctx: &AdapterContext) -> AdapterResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.record(ctx);
        self.inner.remove(key, ctx).await
    }
}

/// Memory adapter whose reads block until [`release`](Self::release),
/// for pinning a hydration in its in-flight window. Reads of keys marked
/// via [`fail_key`](Self::fail_key) error once the gate opens.
pub(crate) struct GatedAdapter {
    inner: MemoryAdapter,
    open: watch::Sender<bool>,
    reads: AtomicUsize,
    fail_keys: Mutex<HashSet<String>>,
}

impl GatedAdapter {
    pub(crate) fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            inner: MemoryAdapter::new(),
            open,
            reads: AtomicUsize::new(0),
            fail_keys: Mutex::new(HashSet::new()),
        }
    }

    /// Let every blocked and future read proceed.
    pub(crate) fn release(&self) {
        // send() fails without receivers and leaves the value unchanged;
        // send_replace() opens the gate even when no read is in flight yet.
        self.open.send_replace(true);
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn seed(&self, key: &str, payload: &str) {
        self.inner.insert_raw(key, payload);
    }

    pub(crate) fn fail_key(&self, key: &str) {
        self.fail_keys.lock().unwrap().insert(key.to_string());
    }

    pub(crate) fn heal_key(&self, key: &str) {
        self.fail_keys.lock().unwrap().remove(key);
    }
}

#[async_trait]
impl StorageAdapter for GatedAdapter {
    async fn get(&self, key: &str, ctx: &AdapterContext) -> AdapterResult<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
        if self.fail_keys.lock().unwrap().contains(key) {
            return Err(AdapterError::Unavailable(format!("injected failure for {key}")));
        }
        self.inner.get(key, ctx).await
    }

    async fn set(&self, key: &str, value: String, ctx: &AdapterContext) -> AdapterResult<()> {
        self.inner.set(key, value, ctx).await
    }

    async fn remove(&self, key: &str, ctx: &AdapterContext) -> AdapterResult<()> {
        self.inner.remove(key, ctx).await
    }
}

/// Memory adapter that fails every operation on selected keys.
pub(crate) struct FlakyAdapter {
    inner: MemoryAdapter,
    fail_keys: Mutex<HashSet<String>>,
}

impl FlakyAdapter {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryAdapter::new(),
            fail_keys: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn fail_key(&self, key: &str) {
        self.fail_keys.lock().unwrap().insert(key.to_string());
    }

    pub(crate) fn heal_key(&self, key: &str) {
        self.fail_keys.lock().unwrap().remove(key);
    }

    pub(crate) fn seed(&self, key: &str, payload: &str) {
        self.inner.insert_raw(key, payload);
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    fn check(&self, key: &str) -> AdapterResult<()> {
        if self.fail_keys.lock().unwrap().contains(key) {
            Err(AdapterError::Unavailable(format!("injected failure for {key}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageAdapter for FlakyAdapter {
    async fn get(&self, key: &str, ctx: &AdapterContext) -> AdapterResult<Option<String>> {
        self.check(key)?;
        self.inner.get(key, ctx).await
    }

    async fn set(&self, key: &str, value: String, ctx: &AdapterContext) -> AdapterResult<()> {
        self.check(key)?;
        self.inner.set(key, value, ctx).await
    }

    async fn remove(&self, key: &str, ctx: &AdapterContext) -> AdapterResult<()> {
        self.check(key)?;
        self.inner.remove(key, ctx).await
    }
}

/// Change events captured by a recording subscriber.
pub(crate) type Events = Arc<Mutex<Vec<(Option<Value>, Option<Value>)>>>;

/// A subscriber callback that appends every `(new, old)` pair to a
/// shared event list.
pub(crate) fn recorder() -> (
    Events,
    impl Fn(Option<&Value>, Option<&Value>) + Send + Sync + 'static,
) {
    let events: Events = Arc::default();
    let sink = Arc::clone(&events);
    let callback = move |new: Option<&Value>, old: Option<&Value>| {
        sink.lock().unwrap().push((new.cloned(), old.cloned()));
    };
    (events, callback)
}

/// A custom log sink that captures every emitted message.
pub(crate) fn capture_log() -> (Arc<Mutex<Vec<String>>>, LogConfig) {
    let messages: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&messages);
    let config = LogConfig::Custom(Arc::new(move |msg| {
        sink.lock().unwrap().push(msg.to_string());
    }));
    (messages, config)
}
