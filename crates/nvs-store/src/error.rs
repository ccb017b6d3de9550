use nvs_adapter::AdapterError;

/// Errors from store and registry operations.
///
/// A missing storage adapter is deliberately NOT represented here: calls
/// that need persistence before an adapter is configured are skipped and
/// logged rather than failed, so hosts that never configure persistence
/// can still use the in-memory machinery.
///
/// The enum is `Clone` because a hydration outcome is delivered to every
/// caller that joined the same in-flight backend read.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// An empty namespace was passed to the registry.
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),

    /// The storage adapter rejected a read, write, or remove.
    #[error(transparent)]
    Storage(#[from] AdapterError),

    /// A persisted payload could not be decoded as JSON.
    #[error("stored payload for {namespace:?} is not valid JSON: {reason}")]
    Deserialize { namespace: String, reason: String },

    /// A caller-supplied value could not be encoded as JSON.
    #[error("value for {namespace:?} cannot be encoded as JSON: {reason}")]
    Serialize { namespace: String, reason: String },

    /// The task driving an in-flight hydration went away before
    /// reporting an outcome.
    #[error("hydration interrupted before completion")]
    HydrationInterrupted,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
