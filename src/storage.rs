//! The storage tier abstraction: a keyed, optionally-expiring store that
//! every cache tier (local admission cache or remote network store)
//! implements uniformly.
//!
//! Grounded on `original_source/cacheme/storages/interfaces.py` (the
//! `Storage` protocol: `connect`/`get`/`set`/`remove`) and `base.py`'s
//! `BaseStorage` (batch `get_all`/`set_all` helpers, `is_local`). Kept
//! object-safe by operating on the type-erased [`crate::value::Entry`]
//! envelope rather than a generic value type, so a single `Engine` can
//! hold a `dyn Storage` registry spanning every node type.

use async_trait::async_trait;

use crate::error::CacheError;
use crate::value::{Entry, Lookup};

/// A single cache tier: local (in-process) or remote (network-backed).
#[async_trait]
pub trait Storage: Send + Sync {
    /// The name this storage was registered under (`storage_name` in a
    /// node's cache declaration).
    fn name(&self) -> &str;

    /// Whether this tier can be probed synchronously without yielding —
    /// true for the in-process admission cache, false for anything
    /// network-backed. Determines whether the engine treats a tier as
    /// "local" or "remote" per spec §3's Cache declaration.
    fn is_local(&self) -> bool;

    /// Establishes any underlying connection. Called once at registration
    /// time; a no-op for purely in-process tiers.
    async fn connect(&self) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Lookup<Entry>, CacheError>;

    async fn set(&self, key: &str, entry: Entry) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Evictions this tier has performed since the last call, reset to
    /// zero on read. Tiers with no eviction policy of their own (every
    /// remote tier, so far) keep the default of zero; [`local::LocalStorage`]
    /// overrides it to report its [`crate::admission::AdmissionCache`]'s
    /// evictions so the engine can feed them into a node's metrics.
    fn evictions_since_last_check(&self) -> u64 {
        0
    }

    /// Batch get. The default implementation calls [`Storage::get`] for
    /// each key; tiers with a genuine batch primitive (e.g. `MGET`)
    /// override it.
    async fn get_all(&self, keys: &[String]) -> Result<Vec<Lookup<Entry>>, CacheError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    /// Batch set. The default implementation calls [`Storage::set`] for
    /// each pair.
    async fn set_all(&self, entries: &[(String, Entry)]) -> Result<(), CacheError> {
        for (key, entry) in entries {
            self.set(key, entry.clone()).await?;
        }
        Ok(())
    }

    /// Releases any underlying connection. A no-op for in-process tiers.
    async fn close(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

pub mod local;

/// An in-memory remote-storage test double, always compiled (rather than
/// `#[cfg(test)]`-gated) so integration tests outside this crate can use
/// it too. Not part of the crate's storage-adapter surface — see its
/// module docs.
pub mod test_double;
