//! Single-flight load de-duplication: at most one load in flight per full
//! key at a time, with every concurrent caller observing the same result.
//!
//! Grounded on `original_source/cacheme/core.py`'s `Locker` class (an
//! `asyncio.Lock` plus a shared `value` slot, tracked in a global
//! `_lockers` dict keyed by full key). This rendition replaces the
//! lock-plus-polled-value pattern with a `DashMap` of type-erased
//! `futures::future::Shared` futures (spec §5's rendition note): joining
//! a load already in flight is just cloning and awaiting the same
//! `Shared`, which correctly delivers the result to every waiter
//! regardless of whether they joined before or after completion.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::mapref::entry::Entry as DashEntry;
use dashmap::DashMap;
use futures::future::{FutureExt, Shared};

use crate::error::CacheError;

type BoxedLoad<V> = Pin<Box<dyn Future<Output = Result<V, CacheError>> + Send>>;

/// Per-key registry of in-flight loads. A key is present if and only if a
/// load for it is currently running (spec §3 invariant 5).
#[derive(Default)]
pub struct SingleFlightRegistry {
    inflight: Arc<DashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl std::fmt::Debug for SingleFlightRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlightRegistry")
            .field("in_flight", &self.inflight.len())
            .finish()
    }
}

impl SingleFlightRegistry {
    pub fn new() -> Self {
        SingleFlightRegistry {
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Number of loads currently in flight, across all node types.
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    /// Runs `init` to produce the load future unless one for `key` is
    /// already registered, in which case this call joins it instead.
    /// Returns the result alongside whether this call joined an existing
    /// load (`true`) or initiated a new one (`false`) — the engine uses
    /// that flag to decide whether to count a hit or a miss.
    pub async fn run<V, F>(&self, key: &str, init: F) -> (Result<V, CacheError>, bool)
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxedLoad<V>,
    {
        if let Some(joined) = self.try_join::<V>(key) {
            return (joined.await, true);
        }

        let map = self.inflight.clone();
        let key_owned = key.to_string();
        let loader = init();
        let wrapped: BoxedLoad<V> = Box::pin(async move {
            let result = loader.await;
            map.remove(&key_owned);
            result
        });
        let shared: Shared<BoxedLoad<V>> = wrapped.shared();

        match self.inflight.entry(key.to_string()) {
            DashEntry::Occupied(occ) => {
                // Someone else registered a load for this key between our
                // initial check and now; join theirs instead and let ours
                // be dropped (it never polled, so it never ran).
                let existing: Arc<dyn Any + Send + Sync> = occ.get().clone();
                drop(occ);
                if let Ok(existing) = existing.downcast::<Shared<BoxedLoad<V>>>() {
                    return ((*existing).clone().await, true);
                }
                (shared.await, false)
            }
            DashEntry::Vacant(vac) => {
                vac.insert(Arc::new(shared.clone()));
                (shared.await, false)
            }
        }
    }

    fn try_join<V>(&self, key: &str) -> Option<Shared<BoxedLoad<V>>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let entry = self.inflight.get(key)?;
        let any = entry.clone();
        drop(entry);
        any.downcast::<Shared<BoxedLoad<V>>>()
            .ok()
            .map(|arc| (*arc).clone())
    }
}
