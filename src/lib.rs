#![doc = include_str!("../README.md")]
//!
//! # Layout
//!
//! - [`list`] — the arena-indexed doubly linked list backing every LRU
//!   segment.
//! - [`sketch`] — the Count-Min Sketch frequency estimator.
//! - [`admission`] — the W-TinyLFU admission cache composed from the two
//!   above.
//! - [`value`], [`error`], [`doorkeeper`], [`serializer`] — the small
//!   value types and traits every other module builds on.
//! - [`storage`] — the tier abstraction, with [`storage::local`] as the
//!   in-process implementation.
//! - [`node`] — the user-facing cacheable-fact trait.
//! - [`dynamic`] — a name-keyed runtime node-type factory for callers that
//!   don't know their cache declarations until runtime.
//! - [`metrics`], [`singleflight`] — the per-node-type accounting and
//!   load de-duplication the engine wires together.
//! - [`engine`] — the read-through orchestration: [`Engine::get`],
//!   [`Engine::get_all`], [`Engine::invalidate`], [`Engine::refresh`].
//! - [`config`] — parsing `scheme://...` storage URLs.
//! - [`memoize`] — a typed convenience handle bound to one node type.
//!
//! This crate ships a process-wide default [`Engine`] behind the
//! free functions below ([`get`], [`get_all`], [`invalidate`],
//! [`refresh`], [`register_storage`], [`set_prefix`]); construct your own
//! [`Engine`] instead when you need more than one cache universe (tests,
//! multi-tenant hosts).

pub mod admission;
pub mod config;
pub mod doorkeeper;
pub mod dynamic;
pub mod engine;
pub mod error;
pub mod list;
pub mod memoize;
pub mod metrics;
pub mod node;
pub mod serializer;
pub mod singleflight;
pub mod sketch;
pub mod storage;
pub mod value;

pub use config::{storage_from_url, StorageUrl};
pub use doorkeeper::{AlwaysAdmit, Doorkeeper};
pub use dynamic::{DynamicNode, DynamicNodeType};
pub use engine::Engine;
pub use error::CacheError;
pub use memoize::{bind, Memoize};
pub use metrics::{MetricsRegistry, NodeMetrics};
pub use node::{CacheDeclaration, Node, NodeConfig};
pub use serializer::{JsonSerializer, Serializer};
pub use storage::Storage;
pub use value::{Entry, Lookup};

use once_cell::sync::Lazy;
use std::sync::Arc;

static DEFAULT_ENGINE: Lazy<Arc<Engine>> = Lazy::new(|| Arc::new(Engine::new()));

/// The shared, process-wide [`Engine`] backing the free functions in this
/// module. Exposed for callers that want to pass it to [`Memoize::new`]
/// or inspect its metrics directly.
pub fn default_engine() -> Arc<Engine> {
    DEFAULT_ENGINE.clone()
}

/// Registers a storage tier with the default engine. See
/// [`Engine::register_storage`].
pub fn register_storage(storage: Arc<dyn Storage>) {
    DEFAULT_ENGINE.register_storage(storage);
}

/// Sets the default engine's key prefix. See [`Engine::set_prefix`].
pub fn set_prefix(prefix: impl Into<String>) {
    DEFAULT_ENGINE.set_prefix(prefix);
}

/// Looks up `node` through the default engine. See [`Engine::get`].
pub async fn get<N: Node>(node: &N) -> Result<N::Value, CacheError> {
    DEFAULT_ENGINE.get(node).await
}

/// Looks up `nodes` through the default engine. See [`Engine::get_all`].
pub async fn get_all<N: Node>(nodes: &[N]) -> Vec<Result<N::Value, CacheError>> {
    DEFAULT_ENGINE.get_all(nodes).await
}

/// Invalidates `node` in the default engine. See [`Engine::invalidate`].
pub async fn invalidate<N: Node>(node: &N) -> Result<(), CacheError> {
    DEFAULT_ENGINE.invalidate(node).await
}

/// Refreshes `node` in the default engine. See [`Engine::refresh`].
pub async fn refresh<N: Node>(node: &N) -> Result<N::Value, CacheError> {
    DEFAULT_ENGINE.refresh(node).await
}

/// Builds (or re-fetches) a runtime node type named `name` on the default
/// engine. See [`Engine::build_node`].
pub fn build_node<V>(
    name: impl Into<String>,
    version: impl Into<String>,
    caches: Vec<CacheDeclaration>,
) -> DynamicNodeType<V>
where
    V: Clone + serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    DEFAULT_ENGINE.build_node(name, version, caches)
}
