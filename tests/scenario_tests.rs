//! End-to-end scenarios S1-S6.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tiercache::engine::Engine;
use tiercache::node::{CacheDeclaration, Node, NodeConfig};
use tiercache::serializer::JsonSerializer;
use tiercache::storage::local::{LocalPolicy, LocalStorage};
use tiercache::storage::test_double::FakeRemoteStorage;
use tiercache::storage::Storage;
use tiercache::CacheError;

#[derive(Clone)]
struct FooNode {
    id: String,
    value: String,
    load_count: Arc<AtomicU64>,
}

#[async_trait::async_trait]
impl Node for FooNode {
    type Value = String;
    type Serializer = JsonSerializer;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn config(&self) -> NodeConfig {
        NodeConfig::new("v1", vec![CacheDeclaration::new("tlfu", None)])
    }

    async fn load(&self) -> Result<Self::Value, CacheError> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.clone())
    }
}

/// S1: register `local://tlfu?size=50`, a single `get` loads once, a
/// second `get` is a pure hit.
#[tokio::test]
async fn s1_single_tier_load_then_hit() {
    let engine = Engine::new();
    engine.register_storage(tiercache::storage_from_url("tlfu", "local://tlfu?size=50").unwrap().into());

    let load_count = Arc::new(AtomicU64::new(0));
    let node = FooNode {
        id: "a".to_string(),
        value: "A".to_string(),
        load_count: load_count.clone(),
    };

    assert_eq!(engine.get(&node).await.unwrap(), "A");
    assert_eq!(engine.get(&node).await.unwrap(), "A");
    assert_eq!(load_count.load(Ordering::SeqCst), 1);

    let metrics = engine.metrics_for::<FooNode>();
    assert_eq!(metrics.hit_count(), 1);
    assert_eq!(metrics.miss_count(), 1);
    assert_eq!(metrics.load_success_count(), 1);
}

#[derive(Clone)]
struct SleepyFoo {
    id: String,
    load_count: Arc<AtomicU64>,
}

#[async_trait::async_trait]
impl Node for SleepyFoo {
    type Value = String;
    type Serializer = JsonSerializer;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn config(&self) -> NodeConfig {
        NodeConfig::new("v1", vec![CacheDeclaration::new("tlfu", None)])
    }

    async fn load(&self) -> Result<Self::Value, CacheError> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok("X".to_string())
    }
}

/// S2: 50 concurrent lookups for the same key share one 200ms load.
#[tokio::test]
async fn s2_fifty_concurrent_callers_share_one_load() {
    let engine = Arc::new(Engine::new());
    engine.register_storage(Arc::new(LocalStorage::new("tlfu", LocalPolicy::Tlfu, 50)));
    let load_count = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let engine = engine.clone();
        let node = SleepyFoo {
            id: "x".to_string(),
            load_count: load_count.clone(),
        };
        handles.push(tokio::spawn(async move { engine.get(&node).await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "X");
    }

    assert_eq!(load_count.load(Ordering::SeqCst), 1);
    let metrics = engine.metrics_for::<SleepyFoo>();
    assert_eq!(metrics.miss_count(), 1);
    assert_eq!(metrics.hit_count(), 49);
    assert_eq!(metrics.load_success_count(), 1);
}

/// S3: `get_all` on three uncached nodes uppercases each id and preserves
/// order; calling it again does not re-invoke the loader.
#[tokio::test]
async fn s3_get_all_uppercase_and_is_idempotent() {
    let engine = Engine::new();
    engine.register_storage(Arc::new(LocalStorage::new("tlfu", LocalPolicy::Tlfu, 50)));
    let load_count = Arc::new(AtomicU64::new(0));

    let nodes: Vec<FooNode> = ["c", "a", "b"]
        .iter()
        .map(|id| FooNode {
            id: id.to_string(),
            value: id.to_uppercase(),
            load_count: load_count.clone(),
        })
        .collect();

    let first: Vec<String> = engine
        .get_all(&nodes)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(first, vec!["C", "A", "B"]);
    assert_eq!(load_count.load(Ordering::SeqCst), 3);

    let second: Vec<String> = engine
        .get_all(&nodes)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(second, vec!["C", "A", "B"]);
    assert_eq!(load_count.load(Ordering::SeqCst), 3);
}

#[derive(Clone)]
struct TwoTierNode {
    id: String,
    load_count: Arc<AtomicU64>,
}

#[async_trait::async_trait]
impl Node for TwoTierNode {
    type Value = String;
    type Serializer = JsonSerializer;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn config(&self) -> NodeConfig {
        NodeConfig::new(
            "v1",
            vec![
                CacheDeclaration::new("tlfu", Some(Duration::from_secs(10))),
                CacheDeclaration::new("remote", None),
            ],
        )
    }

    async fn load(&self) -> Result<Self::Value, CacheError> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        Ok("from-source".to_string())
    }
}

/// S4: a local tier (TTL 10s) plus a remote tier. Removing only the local
/// copy still hits the remote tier on the next `get`, re-populating
/// local without calling the loader again.
#[tokio::test]
async fn s4_remote_tier_survives_local_eviction() {
    let engine = Engine::new();
    let local = Arc::new(LocalStorage::new("tlfu", LocalPolicy::Tlfu, 50));
    let remote = Arc::new(FakeRemoteStorage::new("remote", Duration::ZERO));
    engine.register_storage(local.clone());
    engine.register_storage(remote.clone());

    let load_count = Arc::new(AtomicU64::new(0));
    let node = TwoTierNode {
        id: "n".to_string(),
        load_count: load_count.clone(),
    };

    assert_eq!(engine.get(&node).await.unwrap(), "from-source");
    assert_eq!(load_count.load(Ordering::SeqCst), 1);
    assert!(local.contains("cacheme:n:v1"));

    local.remove("cacheme:n:v1").await.unwrap();
    assert!(!local.contains("cacheme:n:v1"));

    assert_eq!(engine.get(&node).await.unwrap(), "from-source");
    assert_eq!(load_count.load(Ordering::SeqCst), 1);
    assert!(local.contains("cacheme:n:v1"));
}

/// S5: a runtime-built node type (`Engine::build_node`) produces ten
/// per-call instances, each loading once; a second pass over the same
/// ten keys does not increase the loader count, and rebuilding the node
/// type under the same name returns the same underlying configuration.
#[tokio::test]
async fn s5_ten_per_call_loaders_each_fire_once() {
    let engine = Engine::new();
    engine.register_storage(Arc::new(LocalStorage::new("dyn-local", LocalPolicy::Lru, 50)));
    let load_count = Arc::new(AtomicU64::new(0));

    let node_type: tiercache::DynamicNodeType<String> =
        engine.build_node("Foo", "v1", vec![CacheDeclaration::new("dyn-local", None)]);

    let nodes: Vec<_> = (0..10)
        .map(|i| {
            let load_count = load_count.clone();
            let result = format!("result-{i}");
            node_type.node(format!("foo:{i}"), move || {
                let load_count = load_count.clone();
                let result = result.clone();
                async move {
                    load_count.fetch_add(1, Ordering::SeqCst);
                    Ok(result)
                }
            })
        })
        .collect();

    for node in &nodes {
        engine.get(node).await.unwrap();
    }
    assert_eq!(load_count.load(Ordering::SeqCst), 10);

    for node in &nodes {
        engine.get(node).await.unwrap();
    }
    assert_eq!(load_count.load(Ordering::SeqCst), 10);

    // Rebuilding under the same name reuses the first call's config.
    let rebuilt: tiercache::DynamicNodeType<String> = engine.build_node(
        "Foo",
        "v2",
        vec![CacheDeclaration::new("some-other-tier", None)],
    );
    let probe = rebuilt.node("probe", || async { Ok("x".to_string()) });
    assert_eq!(probe.config().version, "v1");
}

#[derive(Clone)]
struct VersionedNode {
    id: String,
    value: Arc<std::sync::Mutex<String>>,
    load_count: Arc<AtomicU64>,
}

#[async_trait::async_trait]
impl Node for VersionedNode {
    type Value = String;
    type Serializer = JsonSerializer;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn config(&self) -> NodeConfig {
        NodeConfig::new("v1", vec![CacheDeclaration::new("tlfu", None)])
    }

    async fn load(&self) -> Result<Self::Value, CacheError> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.lock().unwrap().clone())
    }
}

/// S6: invalidation followed by a loader whose return value has changed
/// produces the new value and one additional miss/load.
#[tokio::test]
async fn s6_invalidate_then_get_observes_the_new_loader_output() {
    let engine = Engine::new();
    engine.register_storage(Arc::new(LocalStorage::new("tlfu", LocalPolicy::Tlfu, 50)));

    let value = Arc::new(std::sync::Mutex::new("v1".to_string()));
    let node = VersionedNode {
        id: "n".to_string(),
        value: value.clone(),
        load_count: Arc::new(AtomicU64::new(0)),
    };

    assert_eq!(engine.get(&node).await.unwrap(), "v1");
    let metrics = engine.metrics_for::<VersionedNode>();
    assert_eq!(metrics.miss_count(), 1);

    engine.invalidate(&node).await.unwrap();
    *value.lock().unwrap() = "v2".to_string();

    assert_eq!(engine.get(&node).await.unwrap(), "v2");
    assert_eq!(metrics.miss_count(), 2);
    assert_eq!(metrics.load_success_count(), 2);
}
