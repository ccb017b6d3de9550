//! The per-namespace store engine.
//!
//! A [`Store`] owns one namespace's in-memory value, its hydration state,
//! its subscriber list, and its pending write-back timer. Handles are
//! cheap clones of one shared engine; the registry guarantees at most one
//! engine per namespace for the process lifetime.
//!
//! # Hydration state machine
//!
//! ```text
//! Uninitialized --hydrate()--> Hydrating --success--> Hydrated
//!       ^                         |
//!       +------- failure ---------+
//! ```
//!
//! `Hydrated` is terminal: a store never forgets that it has loaded.
//! `clear()` resets the value but not the hydration flag. A `set()` also
//! promotes the store to `Hydrated`, since the store then holds an
//! authoritative in-memory value.
//!
//! # Write-back
//!
//! Every `set()` restarts a single-slot debounce timer. When the quiet
//! period elapses, the flush reads the value current *at fire time* and
//! hands it to the adapter. Bursts of mutations therefore coalesce into
//! one backend write of the latest value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use nvs_adapter::{AdapterContext, StorageAdapter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{LogSink, SharedConfig};
use crate::error::{StoreError, StoreResult};

/// Per-store options, captured once when the namespace is first used.
///
/// The core does not interpret these; they travel to the adapter as an
/// [`AdapterContext`] on every backend call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Request at-rest encryption from backends that support it.
    pub encrypted: bool,
}

impl StoreOptions {
    /// Shorthand for `StoreOptions { encrypted: true }`.
    pub fn encrypted() -> Self {
        Self { encrypted: true }
    }
}

/// Options for [`Store::subscribe`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SubscribeOptions {
    /// Invoke the callback once at registration time with
    /// `(value, value)` if the store already has a value.
    pub fire_immediately: bool,
}

/// Where a store is in its load-from-backend lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HydrationState {
    Uninitialized,
    Hydrating,
    Hydrated,
}

/// What the driver learned from the backend.
enum BackendRead {
    /// No adapter configured; nothing was read.
    Skipped,
    /// The read completed: value present, or confirmed absent.
    Loaded(Option<Value>),
}

type ChangeListener = dyn Fn(Option<&Value>, Option<&Value>) + Send + Sync;
type HydratedCallback = Box<dyn FnOnce() + Send>;

/// Value, hydration state, and the in-flight-read rendezvous.
struct CoreState {
    value: Option<Value>,
    hydration: HydrationState,
    /// Present only while a backend read is in flight. Late `hydrate()`
    /// callers subscribe here; the driver broadcasts the shared outcome.
    waiters: Option<broadcast::Sender<StoreResult<()>>>,
}

pub(crate) struct StoreInner {
    namespace: String,
    options: StoreOptions,
    config: Arc<RwLock<SharedConfig>>,
    state: Mutex<CoreState>,
    subscribers: Mutex<Vec<(u64, Arc<ChangeListener>)>>,
    next_subscriber_id: AtomicU64,
    hydrated_callbacks: Mutex<Vec<HydratedCallback>>,
    /// At most one pending debounce timer per store. Scheduling a new
    /// write aborts and replaces the old timer, never stacks two.
    pending_write: Mutex<Option<JoinHandle<()>>>,
}

impl StoreInner {
    fn context(&self) -> AdapterContext {
        AdapterContext {
            encrypted: self.options.encrypted,
        }
    }

    /// Snapshot the shared configuration. Read at each operation, never
    /// cached, so reconfiguration takes effect on the next call.
    fn config_snapshot(&self) -> (Option<Arc<dyn StorageAdapter>>, LogSink) {
        let config = self.config.read().expect("lock poisoned");
        (config.adapter.clone(), config.log.clone())
    }
}

/// Handle to one namespace's store. Cheap to clone; all clones share the
/// same engine.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    pub(crate) fn new(
        namespace: String,
        options: StoreOptions,
        config: Arc<RwLock<SharedConfig>>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                namespace,
                options,
                config,
                state: Mutex::new(CoreState {
                    value: None,
                    hydration: HydrationState::Uninitialized,
                    waiters: None,
                }),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber_id: AtomicU64::new(0),
                hydrated_callbacks: Mutex::new(Vec::new()),
                pending_write: Mutex::new(None),
            }),
        }
    }

    /// The namespace this store persists under.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// The options captured when this namespace was first used.
    pub fn options(&self) -> StoreOptions {
        self.inner.options
    }

    /// The current in-memory value, if any.
    ///
    /// Synchronously visible: a `set(v)` is observable here immediately,
    /// regardless of pending persistence.
    pub fn value(&self) -> Option<Value> {
        self.inner.state.lock().expect("lock poisoned").value.clone()
    }

    /// Decode the current value into a concrete type.
    pub fn value_as<T: DeserializeOwned>(&self) -> StoreResult<Option<T>> {
        match self.value() {
            None => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                StoreError::Deserialize {
                    namespace: self.inner.namespace.clone(),
                    reason: e.to_string(),
                }
            }),
        }
    }

    /// `true` once the store has hydrated (or held a `set()` value).
    pub fn initialized(&self) -> bool {
        self.inner.state.lock().expect("lock poisoned").hydration == HydrationState::Hydrated
    }

    /// Load this namespace's value from the storage adapter.
    ///
    /// - Already hydrated: resolves immediately, no backend read.
    /// - A read is in flight: joins it and receives the same outcome --
    ///   at most one concurrent backend read per store.
    /// - Otherwise: performs the read. Success (value present or
    ///   confirmed absent) marks the store hydrated; failure reverts to
    ///   `Uninitialized` so an explicit retry can succeed. There is no
    ///   automatic retry.
    ///
    /// With no adapter configured the call is skipped with a warning and
    /// resolves `Ok` without marking the store hydrated.
    pub async fn hydrate(&self) -> StoreResult<()> {
        enum Entry {
            Done,
            Join(broadcast::Receiver<StoreResult<()>>),
            Drive,
        }

        let entry = {
            let mut state = self.inner.state.lock().expect("lock poisoned");
            match state.hydration {
                HydrationState::Hydrated => Entry::Done,
                HydrationState::Hydrating => {
                    let waiters = state
                        .waiters
                        .get_or_insert_with(|| broadcast::channel(1).0);
                    Entry::Join(waiters.subscribe())
                }
                HydrationState::Uninitialized => {
                    state.hydration = HydrationState::Hydrating;
                    state.waiters = Some(broadcast::channel(1).0);
                    Entry::Drive
                }
            }
        };

        match entry {
            Entry::Done => Ok(()),
            Entry::Join(mut rx) => match rx.recv().await {
                Ok(outcome) => outcome,
                // The driver went away without broadcasting: its future was
                // dropped mid-read. A set() may still have hydrated the
                // store in the meantime.
                Err(_) => {
                    if self.initialized() {
                        Ok(())
                    } else {
                        Err(StoreError::HydrationInterrupted)
                    }
                }
            },
            Entry::Drive => self.drive_hydration().await,
        }
    }

    /// Perform the backend read and settle every waiter with the outcome.
    ///
    /// If this future is dropped mid-read (the driving task was
    /// cancelled), the guard reverts the store to `Uninitialized` and
    /// drops the waiter channel, so joiners fail fast with
    /// [`StoreError::HydrationInterrupted`] and a later call can retry.
    async fn drive_hydration(&self) -> StoreResult<()> {
        let mut guard = HydrationGuard {
            inner: Arc::clone(&self.inner),
            settled: false,
        };
        let (adapter, log) = self.inner.config_snapshot();
        let namespace = &self.inner.namespace;

        let read: StoreResult<BackendRead> = match adapter {
            None => Ok(BackendRead::Skipped),
            Some(adapter) => {
                match adapter.get(namespace, &self.inner.context()).await {
                    Ok(None) => Ok(BackendRead::Loaded(None)),
                    Ok(Some(payload)) => match serde_json::from_str(&payload) {
                        Ok(value) => Ok(BackendRead::Loaded(Some(value))),
                        Err(e) => Err(StoreError::Deserialize {
                            namespace: namespace.clone(),
                            reason: e.to_string(),
                        }),
                    },
                    Err(e) => Err(StoreError::Storage(e)),
                }
            }
        };

        let mut notification: Option<(Option<Value>, Option<Value>)> = None;
        let mut became_hydrated = false;
        let outcome: StoreResult<()> = {
            let mut state = self.inner.state.lock().expect("lock poisoned");
            let waiters = state.waiters.take();
            let outcome = match &read {
                Ok(BackendRead::Skipped) => {
                    // Retryable once storage is configured.
                    if state.hydration == HydrationState::Hydrating {
                        state.hydration = HydrationState::Uninitialized;
                    }
                    Ok(())
                }
                Ok(BackendRead::Loaded(loaded)) => {
                    // A set() that landed while the read was in flight has
                    // already promoted the store; the manual value wins.
                    if state.hydration == HydrationState::Hydrating {
                        if *loaded != state.value {
                            let old = state.value.clone();
                            state.value = loaded.clone();
                            notification = Some((loaded.clone(), old));
                        }
                        state.hydration = HydrationState::Hydrated;
                        became_hydrated = true;
                    }
                    Ok(())
                }
                Err(e) => {
                    if state.hydration == HydrationState::Hydrating {
                        state.hydration = HydrationState::Uninitialized;
                    }
                    Err(e.clone())
                }
            };
            if let Some(waiters) = waiters {
                // No receivers is fine: nobody joined this hydration.
                let _ = waiters.send(outcome.clone());
            }
            outcome
        };
        guard.settled = true;

        match &read {
            Ok(BackendRead::Skipped) => {
                log.warn(&format!("[{namespace}] hydrate skipped: storage not configured"));
            }
            Ok(BackendRead::Loaded(_)) => {
                log.info(&format!("[{namespace}] hydrated"));
            }
            Err(e) => {
                log.warn(&format!("[{namespace}] hydrate failed: {e}"));
            }
        }

        if became_hydrated {
            self.fire_hydrated_callbacks();
        }
        if let Some((new, old)) = notification {
            self.notify_subscribers(new.as_ref(), old.as_ref());
        }
        outcome
    }

    /// Replace the in-memory value.
    ///
    /// Marks the store hydrated, synchronously notifies every subscriber
    /// with `(new, old)` in subscription order, and (re)starts the
    /// debounced write-back timer. Every call notifies and schedules,
    /// even if the new value equals the old one -- callers own their
    /// diffing.
    pub fn set(&self, data: Value) {
        let (old, newly_hydrated) = {
            let mut state = self.inner.state.lock().expect("lock poisoned");
            let old = state.value.replace(data.clone());
            let newly_hydrated = state.hydration != HydrationState::Hydrated;
            state.hydration = HydrationState::Hydrated;
            (old, newly_hydrated)
        };
        if newly_hydrated {
            self.fire_hydrated_callbacks();
        }
        self.notify_subscribers(Some(&data), old.as_ref());
        self.schedule_write();
    }

    /// Serialize `data` and [`set`](Self::set) it.
    pub fn set_json<T: Serialize>(&self, data: &T) -> StoreResult<()> {
        let value = serde_json::to_value(data).map_err(|e| StoreError::Serialize {
            namespace: self.inner.namespace.clone(),
            reason: e.to_string(),
        })?;
        self.set(value);
        Ok(())
    }

    /// Reset the in-memory value to absent. Backend storage is untouched.
    ///
    /// Aborts any pending write-back task so a stale queued write cannot
    /// overwrite the clear, then notifies subscribers with `(None, old)`.
    /// The hydration flag is left as-is. The abort stops the flush at its
    /// next await point; an adapter write it had already issued may or may
    /// not complete, so the backend can hold stale data until the next
    /// successful write or removal.
    pub fn clear(&self) {
        self.cancel_pending_write();
        let old = {
            let mut state = self.inner.state.lock().expect("lock poisoned");
            state.value.take()
        };
        self.notify_subscribers(None, old.as_ref());
    }

    /// [`clear`](Self::clear), then remove this namespace from the backend.
    ///
    /// The in-memory clear always takes effect; a failed removal surfaces
    /// as an error without rolling it back. With no adapter configured
    /// the removal is skipped with a warning.
    pub async fn clear_storage(&self) -> StoreResult<()> {
        self.clear();
        let (adapter, log) = self.inner.config_snapshot();
        let namespace = &self.inner.namespace;
        let Some(adapter) = adapter else {
            log.warn(&format!("[{namespace}] storage clear skipped: storage not configured"));
            return Ok(());
        };
        adapter.remove(namespace, &self.inner.context()).await?;
        log.info(&format!("[{namespace}] storage cleared"));
        Ok(())
    }

    /// Register a change callback invoked with `(new, old)` on every
    /// value change, in subscription order.
    ///
    /// Each call is an independent registration. The returned
    /// [`Subscription`] removes exactly this registration; dropping it
    /// does NOT unsubscribe.
    pub fn subscribe<F>(&self, callback: F, options: SubscribeOptions) -> Subscription
    where
        F: Fn(Option<&Value>, Option<&Value>) + Send + Sync + 'static,
    {
        let callback: Arc<ChangeListener> = Arc::new(callback);
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .expect("lock poisoned")
            .push((id, Arc::clone(&callback)));

        if options.fire_immediately {
            if let Some(value) = self.value() {
                callback(Some(&value), Some(&value));
            }
        }

        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Register a one-shot callback fired the first time this store
    /// becomes hydrated after registration.
    ///
    /// If the store is already hydrated, the callback fires on a freshly
    /// scheduled task, never inline, so caller code ordering does not
    /// depend on hydration timing.
    pub fn on_hydrated<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let already_hydrated = {
            let state = self.inner.state.lock().expect("lock poisoned");
            state.hydration == HydrationState::Hydrated
        };
        if already_hydrated {
            match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { callback() });
                }
                Err(_) => {
                    // No runtime to defer onto; a short-lived thread keeps
                    // the not-inline guarantee.
                    std::thread::spawn(callback);
                }
            }
        } else {
            self.inner
                .hydrated_callbacks
                .lock()
                .expect("lock poisoned")
                .push(Box::new(callback));
        }
    }

    fn fire_hydrated_callbacks(&self) {
        let callbacks: Vec<HydratedCallback> = {
            let mut pending = self
                .inner
                .hydrated_callbacks
                .lock()
                .expect("lock poisoned");
            pending.drain(..).collect()
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Invoke every subscriber outside the internal locks, so a callback
    /// may re-enter the store.
    fn notify_subscribers(&self, new: Option<&Value>, old: Option<&Value>) {
        let listeners: Vec<Arc<ChangeListener>> = {
            let subscribers = self.inner.subscribers.lock().expect("lock poisoned");
            subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for listener in listeners {
            listener(new, old);
        }
    }

    /// (Re)start the single-slot debounce timer for this store.
    fn schedule_write(&self) {
        let (delay, log) = {
            let config = self.inner.config.read().expect("lock poisoned");
            (config.write_delay, config.log.clone())
        };
        let Ok(handle) = Handle::try_current() else {
            log.warn(&format!(
                "[{}] write-back skipped: no async runtime",
                self.inner.namespace
            ));
            return;
        };

        let mut pending = self.inner.pending_write.lock().expect("lock poisoned");
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        let inner = Arc::clone(&self.inner);
        *pending = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            flush(inner).await;
        }));
    }

    fn cancel_pending_write(&self) {
        let mut pending = self.inner.pending_write.lock().expect("lock poisoned");
        if let Some(timer) = pending.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock().expect("lock poisoned");
        f.debug_struct("Store")
            .field("namespace", &self.inner.namespace)
            .field("hydration", &state.hydration)
            .field("has_value", &state.value.is_some())
            .finish()
    }
}

/// Reverts an abandoned hydration.
///
/// Armed for the lifetime of a driving read; disarmed (`settled`) once
/// the outcome has been recorded and broadcast. On an unsettled drop the
/// store returns to `Uninitialized` and the waiter channel is closed,
/// waking every joiner.
struct HydrationGuard {
    inner: Arc<StoreInner>,
    settled: bool,
}

impl Drop for HydrationGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.inner.state.lock().expect("lock poisoned");
        if state.hydration == HydrationState::Hydrating {
            state.hydration = HydrationState::Uninitialized;
        }
        state.waiters = None;
    }
}

/// Write the store's current value to the backend.
///
/// Runs after the debounce quiet period. Reads the value at fire time,
/// not at schedule time, so coalesced bursts persist the latest value.
/// Failures are logged, never surfaced: the `set()` that scheduled this
/// flush has long returned.
async fn flush(inner: Arc<StoreInner>) {
    let (adapter, log) = inner.config_snapshot();
    let namespace = &inner.namespace;
    let Some(adapter) = adapter else {
        log.warn(&format!("[{namespace}] write-back skipped: storage not configured"));
        return;
    };

    let value = {
        let state = inner.state.lock().expect("lock poisoned");
        state.value.clone()
    };
    // Cleared while the timer slept; nothing to persist.
    let Some(value) = value else { return };

    let payload = match serde_json::to_string(&value) {
        Ok(payload) => payload,
        Err(e) => {
            log.warn(&format!("[{namespace}] write-back failed: {e}"));
            return;
        }
    };
    match adapter.set(namespace, payload, &inner.context()).await {
        Ok(()) => log.info(&format!("[{namespace}] persisted")),
        Err(e) => log.warn(&format!("[{namespace}] write-back failed: {e}")),
    }
}

/// Removes one subscriber registration. Idempotent: calling
/// [`unsubscribe`](Self::unsubscribe) again is a no-op.
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
}

impl Subscription {
    /// Remove this registration from the store's subscriber list.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.store.upgrade() {
            inner
                .subscribers
                .lock()
                .expect("lock poisoned")
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
