//! Dynamic nodes: a node "type" built at runtime from a name string
//! rather than fixed at compile time as a Rust type.
//!
//! Grounded directly on spec.md §4.11's `build_node(name, version, caches,
//! serializer?, doorkeeper?)` contract — identity is by `name`, and a
//! second call with a name already in use returns a handle to the first
//! call's configuration rather than building a new one (exercised by
//! scenario S5). `original_source`'s own `build_node`/`DynamicNode`
//! definitions aren't present in this pack's filtered source tree (only
//! their import in `cacheme/__init__.py` is — the closest available
//! pattern, `tests/test_node.py`'s per-call `TestNodeDynamic(id=c.id)`,
//! constructs a distinct Rust-level type per call, which doesn't fit a
//! statically typed language at all), so this module follows spec.md's
//! literal name-keyed-factory wording directly rather than porting a
//! missing original.
//!
//! `serializer?` is accepted as part of spec §4.11's signature but has no
//! effect here: every other node in this crate already resolves its
//! serializer at compile time via the `Node::Serializer` associated type
//! (see DESIGN.md's Open Questions on why that isn't a trait object), and
//! a dynamic node can't reopen that decision per runtime call without
//! making `Serializer` object-safe. [`DynamicNode`] simply fixes
//! `Serializer = JsonSerializer`, the same default every other node here
//! uses.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::doorkeeper::Doorkeeper;
use crate::engine::Engine;
use crate::error::CacheError;
use crate::node::{CacheDeclaration, Node, NodeConfig};
use crate::serializer::JsonSerializer;

type LoadFn<V> =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<V, CacheError>> + Send>> + Send + Sync>;

/// A node type built by [`Engine::build_node`]. Call [`DynamicNodeType::node`]
/// once per cacheable instance to get a lookup-ready [`DynamicNode`]; every
/// instance produced from the same `DynamicNodeType` shares its name,
/// version, tier list, and doorkeeper.
pub struct DynamicNodeType<V> {
    name: Arc<str>,
    config: Arc<NodeConfig>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for DynamicNodeType<V> {
    fn clone(&self) -> Self {
        DynamicNodeType {
            name: self.name.clone(),
            config: self.config.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> DynamicNodeType<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Binds `key` and `loader` into a [`DynamicNode`] ready for
    /// [`Engine::get`]. `loader` is called fresh on every load, the same
    /// way [`Node::load`] would be for a statically typed node.
    pub fn node<F, Fut>(&self, key: impl Into<String>, loader: F) -> DynamicNode<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, CacheError>> + Send + 'static,
    {
        let loader: LoadFn<V> = Arc::new(move || Box::pin(loader()));
        DynamicNode {
            type_name: self.name.clone(),
            key: key.into(),
            config: self.config.clone(),
            loader,
        }
    }

    /// The name this type was built with.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One runtime-built cacheable fact: a [`DynamicNodeType`]'s name and
/// configuration, plus an instance key and loader. Implements [`Node`]
/// like any statically declared node type.
#[derive(Clone)]
pub struct DynamicNode<V> {
    type_name: Arc<str>,
    key: String,
    config: Arc<NodeConfig>,
    loader: LoadFn<V>,
}

#[async_trait]
impl<V> Node for DynamicNode<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Value = V;
    type Serializer = JsonSerializer;

    fn key(&self) -> String {
        self.key.clone()
    }

    fn config(&self) -> NodeConfig {
        (*self.config).clone()
    }

    fn type_name(&self) -> String {
        self.type_name.to_string()
    }

    async fn load(&self) -> Result<Self::Value, CacheError> {
        (self.loader)().await
    }
}

impl Engine {
    /// Builds (or re-fetches) the dynamic node type named `name`. Per spec
    /// §4.11, identity is by `name`: calling this again with a name already
    /// in the registry returns a handle sharing the *original* call's
    /// `version`/`caches`/doorkeeper, ignoring whatever this call passed —
    /// the same way re-declaring a static [`Node`] impl doesn't change an
    /// existing `NodeConfig`.
    pub fn build_node<V>(
        &self,
        name: impl Into<String>,
        version: impl Into<String>,
        caches: Vec<CacheDeclaration>,
    ) -> DynamicNodeType<V>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.build_node_with_doorkeeper(name, version, caches, None)
    }

    /// As [`Engine::build_node`], additionally declaring a doorkeeper gate
    /// for the node type.
    pub fn build_node_with_doorkeeper<V>(
        &self,
        name: impl Into<String>,
        version: impl Into<String>,
        caches: Vec<CacheDeclaration>,
        doorkeeper: Option<Arc<dyn Doorkeeper>>,
    ) -> DynamicNodeType<V>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let name: Arc<str> = Arc::from(name.into());
        let config = self
            .dynamic_nodes
            .entry(name.to_string())
            .or_insert_with(|| {
                let mut config = NodeConfig::new(version.into(), caches);
                if let Some(doorkeeper) = doorkeeper {
                    config = config.with_doorkeeper(doorkeeper);
                }
                Arc::new(config)
            })
            .clone();
        DynamicNodeType {
            name,
            config,
            _value: PhantomData,
        }
    }
}
