//! A typed handle bound to one node type and one [`Engine`], so call
//! sites don't have to name the engine and the node type at every call.
//!
//! Grounded on `original_source/v2/models.py`'s `Memoize`/`Wrapper`
//! classes, which turn a plain async function into a cached one via a
//! Python decorator. Rust has no decorator equivalent, so this rendition
//! is a struct rather than a function transform: construct one
//! `Memoize<N>` per node type and call its methods instead of the
//! free-standing `get`/`get_all`/`invalidate`/`refresh` functions.

use std::sync::Arc;

use crate::engine::Engine;
use crate::error::CacheError;
use crate::node::Node;

/// Binds an [`Engine`] to a single node type `N`.
pub struct Memoize<N: Node> {
    engine: Arc<Engine>,
    _node: std::marker::PhantomData<N>,
}

impl<N: Node> std::fmt::Debug for Memoize<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // No node instance is bound here — `Memoize<N>` is for statically
        // typed nodes, so the Rust type name stands in for `Node::type_name`.
        f.debug_struct("Memoize")
            .field("node_type", &std::any::type_name::<N>())
            .finish()
    }
}

impl<N: Node> Clone for Memoize<N> {
    fn clone(&self) -> Self {
        Memoize {
            engine: self.engine.clone(),
            _node: std::marker::PhantomData,
        }
    }
}

impl<N: Node> Memoize<N> {
    pub fn new(engine: Arc<Engine>) -> Self {
        Memoize {
            engine,
            _node: std::marker::PhantomData,
        }
    }

    pub async fn get(&self, node: &N) -> Result<N::Value, CacheError> {
        self.engine.get(node).await
    }

    pub async fn get_all(&self, nodes: &[N]) -> Vec<Result<N::Value, CacheError>> {
        self.engine.get_all(nodes).await
    }

    pub async fn invalidate(&self, node: &N) -> Result<(), CacheError> {
        self.engine.invalidate(node).await
    }

    pub async fn refresh(&self, node: &N) -> Result<N::Value, CacheError> {
        self.engine.refresh(node).await
    }
}

/// Convenience constructor mirroring `original_source`'s
/// `Memoize(node_class)` call site. Named `bind` rather than `build_node`
/// to leave that name free for [`crate::dynamic`]'s runtime node-type
/// factory, which is what spec §4.11 actually means by "build_node" — this
/// function just binds a statically-typed `N` to an `Engine`.
pub fn bind<N: Node>(engine: Arc<Engine>) -> Memoize<N> {
    Memoize::new(engine)
}
