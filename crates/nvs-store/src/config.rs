//! Process-wide configuration shared by every store.
//!
//! The registry owns one [`SharedConfig`] cell; every store it creates
//! holds a handle to the same cell and reads it at each operation, never
//! caching the adapter or log sink at creation time. Reconfiguring
//! mid-run therefore takes effect for the next operation on every store,
//! past and future.

use std::sync::Arc;
use std::time::Duration;

use nvs_adapter::StorageAdapter;
use tracing::{info, warn};

/// Quiet period between the last `set()` and the backend write.
pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_millis(200);

/// Logging requested by the host application.
///
/// Resolved once at configure time into a concrete sink, so the hot path
/// never branches on "was this a bool or a function".
#[derive(Clone)]
pub enum LogConfig {
    /// No log output at all.
    Off,
    /// Route namespace-tagged messages through `tracing`.
    Standard,
    /// Hand every formatted message to a host-supplied callback.
    Custom(Arc<dyn Fn(&str) + Send + Sync>),
}

impl From<bool> for LogConfig {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Standard
        } else {
            Self::Off
        }
    }
}

impl std::fmt::Debug for LogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => f.write_str("LogConfig::Off"),
            Self::Standard => f.write_str("LogConfig::Standard"),
            Self::Custom(_) => f.write_str("LogConfig::Custom(..)"),
        }
    }
}

/// The resolved log sink stores actually emit through.
#[derive(Clone)]
pub(crate) enum LogSink {
    Off,
    Standard,
    Custom(Arc<dyn Fn(&str) + Send + Sync>),
}

impl LogSink {
    /// Emit an informational message (successful hydration, flush).
    pub(crate) fn info(&self, message: &str) {
        match self {
            Self::Off => {}
            Self::Standard => info!(target: "nvs", "{message}"),
            Self::Custom(f) => f(message),
        }
    }

    /// Emit a warning (skipped persistence, failed flush).
    pub(crate) fn warn(&self, message: &str) {
        match self {
            Self::Off => {}
            Self::Standard => warn!(target: "nvs", "{message}"),
            Self::Custom(f) => f(message),
        }
    }
}

impl From<LogConfig> for LogSink {
    fn from(config: LogConfig) -> Self {
        match config {
            LogConfig::Off => Self::Off,
            LogConfig::Standard => Self::Standard,
            LogConfig::Custom(f) => Self::Custom(f),
        }
    }
}

/// Options accepted by `configure`.
///
/// Every field is optional; an omitted field leaves the corresponding
/// configured value unchanged. Provided fields are applied together under
/// one lock, so observers never see a half-applied update.
#[derive(Clone, Default)]
pub struct ConfigOptions {
    /// The persistence backend. Until one is set, hydration and
    /// write-back are skipped (and logged as warnings).
    pub storage: Option<Arc<dyn StorageAdapter>>,
    /// Logging mode; see [`LogConfig`].
    pub log: Option<LogConfig>,
    /// Debounce quiet period for write-back.
    pub write_delay: Option<Duration>,
}

impl ConfigOptions {
    /// Start from an all-unchanged update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence backend.
    pub fn storage(mut self, adapter: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(adapter);
        self
    }

    /// Set the logging mode.
    pub fn log(mut self, log: impl Into<LogConfig>) -> Self {
        self.log = Some(log.into());
        self
    }

    /// Set the debounce quiet period.
    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }
}

impl std::fmt::Debug for ConfigOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigOptions")
            .field("storage", &self.storage.as_ref().map(|_| "Some(..)"))
            .field("log", &self.log)
            .field("write_delay", &self.write_delay)
            .finish()
    }
}

/// The resolved configuration cell shared by the registry and its stores.
pub(crate) struct SharedConfig {
    pub(crate) adapter: Option<Arc<dyn StorageAdapter>>,
    pub(crate) log: LogSink,
    pub(crate) write_delay: Duration,
}

impl SharedConfig {
    pub(crate) fn unconfigured() -> Self {
        Self {
            adapter: None,
            log: LogSink::Off,
            write_delay: DEFAULT_WRITE_DELAY,
        }
    }

    /// Apply an update, leaving omitted fields untouched.
    pub(crate) fn apply(&mut self, options: ConfigOptions) {
        if let Some(adapter) = options.storage {
            self.adapter = Some(adapter);
        }
        if let Some(log) = options.log {
            self.log = log.into();
        }
        if let Some(delay) = options.write_delay {
            self.write_delay = delay;
        }
    }
}
