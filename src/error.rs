//! Error hierarchy for the cache engine.
//!
//! Grounded on `velesdb-core/src/error.rs`'s `thiserror`-based enum shape
//! (one variant per failure domain, `#[error("...")]` messages, a
//! `#[from]` conversion at the I/O boundary). Unlike that crate's error
//! type, every variant here carries an owned `String` rather than a
//! wrapped source error, because a `CacheError` must be `Clone` — it is
//! delivered to every single-flight waiter, not just the caller that
//! triggered the failure.

use thiserror::Error;

/// The five failure domains a cache operation can surface, matching
/// spec §7 one-to-one.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// A storage tier failed to connect, read, or write.
    #[error("storage error: {0}")]
    Storage(String),

    /// A serializer failed to encode or decode a value.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A node's loader returned an error.
    #[error("loader error: {0}")]
    Loader(String),

    /// A storage URL, registration, or node declaration was invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An internal invariant was violated (should not happen in correct
    /// usage; surfaced rather than panicking).
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl CacheError {
    pub fn storage(msg: impl Into<String>) -> Self {
        CacheError::Storage(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        CacheError::Serialization(msg.into())
    }

    pub fn loader(msg: impl Into<String>) -> Self {
        CacheError::Loader(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        CacheError::Configuration(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        CacheError::Invariant(msg.into())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}
