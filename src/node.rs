//! The node abstraction: a user-declared cacheable fact (typed key plus
//! loader) and the per-type configuration that drives it through the
//! engine.
//!
//! Grounded on `original_source/cacheme/node.py`/`nodes.py` (the
//! `Node`/`Field`-based metaclass approach) and `cacheme/cache_model.py`'s
//! `Cache` declaration tuple; this rendition trades the Python metaclass
//! for an explicit trait plus an associated `config()` function, per
//! SPEC_FULL.md §3's note that "class-level metadata" becomes a
//! `NodeConfig` value in this rendition.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::doorkeeper::{AlwaysAdmit, Doorkeeper};
use crate::error::CacheError;
use crate::serializer::Serializer;
use std::sync::Arc;

/// One entry in a node's ordered tier list: which storage to consult and
/// how long a value stays fresh there. Order is fastest/nearest to
/// slowest/farthest (spec §3's "Cache declaration").
#[derive(Debug, Clone)]
pub struct CacheDeclaration {
    pub storage_name: String,
    pub ttl: Option<Duration>,
}

impl CacheDeclaration {
    pub fn new(storage_name: impl Into<String>, ttl: Option<Duration>) -> Self {
        CacheDeclaration {
            storage_name: storage_name.into(),
            ttl,
        }
    }
}

/// Class-level metadata for a node type: its version (folded into the
/// full key), its ordered tier list, and an optional doorkeeper gate.
#[derive(Clone)]
pub struct NodeConfig {
    pub version: String,
    pub caches: Vec<CacheDeclaration>,
    pub doorkeeper: Option<Arc<dyn Doorkeeper>>,
}

impl NodeConfig {
    pub fn new(version: impl Into<String>, caches: Vec<CacheDeclaration>) -> Self {
        NodeConfig {
            version: version.into(),
            caches,
            doorkeeper: None,
        }
    }

    pub fn with_doorkeeper(mut self, doorkeeper: Arc<dyn Doorkeeper>) -> Self {
        self.doorkeeper = Some(doorkeeper);
        self
    }
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("version", &self.version)
            .field("caches", &self.caches)
            .field("doorkeeper", &self.doorkeeper.is_some())
            .finish()
    }
}

/// A user-declared cacheable fact: a deterministic key, a loader, and
/// per-type configuration.
///
/// `Value` is the type produced by [`Node::load`] and stored across
/// tiers. `Serializer` resolves (de)serialization for remote tiers at
/// compile time — see the module docs on [`crate::serializer::Serializer`]
/// for why this is an associated type rather than a runtime value.
#[async_trait]
pub trait Node: Send + Sync + Sized + Clone + 'static {
    type Value: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Serializer: Serializer;

    /// The per-instance key string that, combined with the type's
    /// version and the engine's prefix, forms the full cache key.
    fn key(&self) -> String;

    /// Tags carried alongside the key; not used for invalidation in this
    /// rendition (see Non-goals), but available for callers to inspect.
    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Per-type (or, for a dynamic node, per-instance-but-shared-by-name)
    /// configuration: version, tier list, doorkeeper. An instance method
    /// rather than an associated function so that a dynamic node (see
    /// [`crate::dynamic`]) can report a runtime-built configuration that
    /// differs from one `build_node` call to the next despite sharing the
    /// same Rust type; every other `Node` impl simply ignores `self` and
    /// returns a fixed value, as if this were still associated.
    fn config(&self) -> NodeConfig;

    /// Loads the value for this node from its system of record.
    async fn load(&self) -> Result<Self::Value, CacheError>;

    /// Loads values for a batch of nodes of the same type. Defaults to a
    /// sequential loop calling [`Node::load`] on each node in turn (spec
    /// §9's stated default); override for a genuinely batched fetch.
    async fn load_all(nodes: &[Self]) -> Vec<Result<Self::Value, CacheError>> {
        let mut out = Vec::with_capacity(nodes.len());
        for n in nodes {
            out.push(n.load().await);
        }
        out
    }

    /// Stable, process-wide identifier used to group metrics and to key
    /// the single-flight table, distinct from [`Node::key`] (the
    /// per-instance part of the cache key). Defaults to the Rust type
    /// name, unique per node type within a binary; a dynamic node (see
    /// [`crate::dynamic`]) overrides this to return its runtime-assigned
    /// name instead, so several dynamic node "types" sharing one Rust
    /// type still get separate metrics and single-flight buckets.
    fn type_name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// The full key: `"<prefix>:<key>:<version>"`, per spec §3.
    fn full_key(&self, prefix: &str) -> String {
        format!("{}:{}:{}", prefix, self.key(), self.config().version)
    }

    /// The doorkeeper gate for this node, or the always-admit default if
    /// none was configured.
    fn doorkeeper(&self) -> Arc<dyn Doorkeeper> {
        self.config()
            .doorkeeper
            .unwrap_or_else(|| Arc::new(AlwaysAdmit))
    }
}
