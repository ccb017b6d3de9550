/// Errors from storage adapter operations.
///
/// Variants carry string payloads rather than source errors so the whole
/// enum is `Clone` -- hydration outcomes are broadcast to every caller
/// waiting on the same in-flight read.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    /// The backend is unreachable or refused the connection.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A read failed for the given key.
    #[error("read failed for {key:?}: {reason}")]
    Read { key: String, reason: String },

    /// A write failed for the given key.
    #[error("write failed for {key:?}: {reason}")]
    Write { key: String, reason: String },

    /// A removal failed for the given key.
    #[error("remove failed for {key:?}: {reason}")]
    Remove { key: String, reason: String },

    /// I/O error from the underlying storage medium.
    #[error("io error: {0}")]
    Io(String),
}

impl AdapterError {
    /// Wrap a `std::io::Error`, keeping only its message.
    pub fn io(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
