//! An in-memory remote-storage test double: bytes in, bytes out, with
//! configurable artificial latency, so multi-tier back-fill and
//! consistency tests don't need a real network dependency. Not part of
//! the public API (spec §4.15, ambient test tooling).

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::CacheError;
use crate::storage::Storage;
use crate::value::{Entry, Lookup};

/// A fake "remote" tier backed by an in-process map of encoded bytes.
/// Every operation awaits `latency` before touching the map, to exercise
/// the engine's async tier-traversal path the same way a real network
/// store would.
#[derive(Debug)]
pub struct FakeRemoteStorage {
    name: String,
    latency: Duration,
    data: DashMap<String, (Vec<u8>, chrono::DateTime<Utc>, Option<chrono::DateTime<Utc>>)>,
    pub get_calls: StdMutex<u64>,
    pub set_calls: StdMutex<u64>,
}

impl FakeRemoteStorage {
    pub fn new(name: impl Into<String>, latency: Duration) -> Self {
        FakeRemoteStorage {
            name: name.into(),
            latency,
            data: DashMap::new(),
            get_calls: StdMutex::new(0),
            set_calls: StdMutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

#[async_trait]
impl Storage for FakeRemoteStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn connect(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Lookup<Entry>, CacheError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        *self.get_calls.lock().unwrap() += 1;
        match self.data.get(key) {
            Some(entry) => {
                let (bytes, updated_at, expire) = entry.clone();
                if let Some(expire) = expire {
                    if Utc::now() >= expire {
                        drop(entry);
                        self.data.remove(key);
                        return Ok(Lookup::Expired);
                    }
                }
                Ok(Lookup::Found(Entry::Encoded {
                    bytes,
                    updated_at,
                    expire,
                }))
            }
            None => Ok(Lookup::Missing),
        }
    }

    async fn set(&self, key: &str, entry: Entry) -> Result<(), CacheError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        *self.set_calls.lock().unwrap() += 1;
        let Entry::Encoded {
            bytes,
            updated_at,
            expire,
        } = entry
        else {
            return Err(CacheError::invariant(
                "remote storage tiers only accept Entry::Encoded values",
            ));
        };
        self.data.insert(key.to_string(), (bytes, updated_at, expire));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.data.remove(key);
        Ok(())
    }
}
