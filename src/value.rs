//! The presence sentinel and the storage-tier value envelope.
//!
//! `Lookup<T>` replaces the Python source's `None`-means-miss convention
//! (`cacheme/storages/base.py`'s `get` returns `Optional[T]`) with a
//! sum type, per spec §9's redesign note that Rust should use an explicit
//! "present / absent / expired" tri-state rather than overloading `None`.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Result of probing a single storage tier for a key.
#[derive(Debug)]
pub enum Lookup<T> {
    /// The key was present and unexpired.
    Found(T),
    /// The key was present but its TTL had elapsed; the tier has already
    /// dropped it as a side effect of the lookup.
    Expired,
    /// The key was never present.
    Missing,
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::Expired | Lookup::Missing => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// The value envelope a [`crate::storage::Storage`] tier actually stores.
///
/// Local tiers hold the raw, type-erased value so repeated reads never pay
/// a (de)serialization cost; remote tiers hold the node's serializer
/// output plus the bookkeeping fields from spec §3's "Cached value
/// envelope (remote)".
#[derive(Clone)]
pub enum Entry {
    /// A type-erased raw value, as produced directly by a node's loader.
    /// Only ever handed to or returned from a tier that reports
    /// `is_local() == true`. `ttl` carries the cache declaration's
    /// expiry through to the tier's `set`; a tier returning a value from
    /// `get` has no need to report it back out, so reads always carry
    /// `ttl: None`.
    Raw {
        value: Arc<dyn Any + Send + Sync>,
        ttl: Option<Duration>,
    },
    /// A serialized byte payload plus its bookkeeping, as stored by a
    /// remote tier.
    Encoded {
        bytes: Vec<u8>,
        updated_at: DateTime<Utc>,
        expire: Option<DateTime<Utc>>,
    },
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entry::Raw { ttl, .. } => f.debug_struct("Entry::Raw").field("ttl", ttl).finish(),
            Entry::Encoded {
                updated_at, expire, ..
            } => f
                .debug_struct("Entry::Encoded")
                .field("updated_at", updated_at)
                .field("expire", expire)
                .finish(),
        }
    }
}
