//! Storage configuration: parsing a cache tier's connection string into a
//! registered [`crate::storage::Storage`] implementation.
//!
//! Grounded on `original_source/cacheme/storages/__init__.py`'s
//! `get_storage(url)` dispatcher (a scheme string switched to a concrete
//! storage class, with query-string options forwarded as keyword
//! arguments) and on spec.md §6's scheme table. The two `local://` schemes
//! are fully implemented; the five remote schemes parse and validate
//! their options (so a typo'd URL fails at registration time, not at
//! first lookup) but fail at `connect()` — this crate defines the remote
//! storage *interface*, not a Redis/Postgres/MySQL/SQLite/MongoDB client,
//! per spec.md's Non-goals.

use std::collections::HashMap;

use crate::error::CacheError;
use crate::storage::local::{LocalPolicy, LocalStorage};
use crate::storage::Storage;

/// One storage tier parsed from a connection URL: its scheme and the
/// query-string options carried alongside it.
#[derive(Debug, Clone)]
pub struct StorageUrl {
    pub scheme: String,
    pub authority: String,
    pub options: HashMap<String, String>,
}

impl StorageUrl {
    /// Parses `scheme://authority?k=v&k2=v2` into its parts. Does not
    /// validate the scheme itself — that happens in [`storage_from_url`].
    pub fn parse(url: &str) -> Result<Self, CacheError> {
        let (scheme, rest) = url.split_once("://").ok_or_else(|| {
            CacheError::configuration(format!("{url:?} is missing a \"scheme://\" prefix"))
        })?;
        let (authority, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut options = HashMap::new();
        if !query.is_empty() {
            for pair in query.split('&') {
                let (k, v) = pair.split_once('=').ok_or_else(|| {
                    CacheError::configuration(format!(
                        "malformed query parameter {pair:?} in {url:?}"
                    ))
                })?;
                options.insert(k.to_string(), v.to_string());
            }
        }

        Ok(StorageUrl {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            options,
        })
    }

    fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    fn required_usize(&self, key: &str) -> Result<usize, CacheError> {
        let raw = self
            .option(key)
            .ok_or_else(|| CacheError::configuration(format!("missing required option {key:?}")))?;
        raw.parse().map_err(|_| {
            CacheError::configuration(format!(
                "option {key:?} must be a non-negative integer, got {raw:?}"
            ))
        })
    }
}

/// A remote storage tier whose scheme parsed successfully but has no
/// adapter registered in this crate. `connect()` reports the gap; every
/// other operation is unreachable because the engine never gets past
/// registration-time `connect()` for a storage it means to use.
pub struct UnimplementedRemoteStorage {
    name: String,
    scheme: String,
}

impl std::fmt::Debug for UnimplementedRemoteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnimplementedRemoteStorage")
            .field("name", &self.name)
            .field("scheme", &self.scheme)
            .finish()
    }
}

#[async_trait::async_trait]
impl Storage for UnimplementedRemoteStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn connect(&self) -> Result<(), CacheError> {
        Err(CacheError::configuration(format!(
            "no adapter is registered for scheme {:?}; register a concrete Storage implementation under the name {:?} instead",
            self.scheme, self.name
        )))
    }

    async fn get(&self, _key: &str) -> Result<crate::value::Lookup<crate::value::Entry>, CacheError> {
        self.connect().await?;
        unreachable!("connect() always fails for this scheme")
    }

    async fn set(&self, _key: &str, _entry: crate::value::Entry) -> Result<(), CacheError> {
        self.connect().await?;
        unreachable!("connect() always fails for this scheme")
    }

    async fn remove(&self, _key: &str) -> Result<(), CacheError> {
        self.connect().await?;
        unreachable!("connect() always fails for this scheme")
    }
}

/// Parses `url` per spec.md §6's scheme table and builds the storage tier
/// it describes, registered under `name`. `local://lru` and
/// `local://tlfu` build a working [`LocalStorage`]; every other scheme
/// parses its options (failing fast on a malformed URL) but returns a
/// storage whose `connect()` reports that no concrete adapter is
/// registered.
pub fn storage_from_url(name: impl Into<String>, url: &str) -> Result<Box<dyn Storage>, CacheError> {
    let name = name.into();
    let parsed = StorageUrl::parse(url)?;

    match parsed.scheme.as_str() {
        "local" => {
            let policy = match parsed.authority.as_str() {
                "lru" => LocalPolicy::Lru,
                "tlfu" => LocalPolicy::Tlfu,
                other => {
                    return Err(CacheError::configuration(format!(
                        "unknown local storage policy {other:?}; expected \"lru\" or \"tlfu\""
                    )))
                }
            };
            let size = parsed.required_usize("size")?;
            Ok(Box::new(LocalStorage::new(name, policy, size)))
        }
        "redis" | "postgresql" | "mysql" | "sqlite" | "mongodb" => {
            validate_remote_options(&parsed)?;
            Ok(Box::new(UnimplementedRemoteStorage {
                name,
                scheme: parsed.scheme,
            }))
        }
        other => Err(CacheError::configuration(format!(
            "unknown storage scheme {other:?}"
        ))),
    }
}

fn validate_remote_options(parsed: &StorageUrl) -> Result<(), CacheError> {
    match parsed.scheme.as_str() {
        "redis" => {
            if let Some(pool_size) = parsed.option("pool_size") {
                pool_size.parse::<usize>().map_err(|_| {
                    CacheError::configuration(format!(
                        "option \"pool_size\" must be a non-negative integer, got {pool_size:?}"
                    ))
                })?;
            }
            Ok(())
        }
        "postgresql" | "mysql" | "sqlite" => {
            if parsed.option("table").is_none() {
                return Err(CacheError::configuration(
                    "missing required option \"table\"".to_string(),
                ));
            }
            Ok(())
        }
        "mongodb" => {
            for key in ["database", "collection"] {
                if parsed.option(key).is_none() {
                    return Err(CacheError::configuration(format!(
                        "missing required option {key:?}"
                    )));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
