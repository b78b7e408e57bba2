//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 复制缓存引擎集成测试：使用进程内消息代理模拟多个节点

#[path = "../common/mod.rs"]
mod common;

use async_trait::async_trait;
use replicache::metrics::GLOBAL_METRICS;
use replicache::sync::{
    InvalidationHandler, InvalidationMessage, MemoryBroker, MessageBus, NoopBus, PublishOptions,
};
use replicache::{CacheExt, CacheOps, NodeId, Propagation, ReplicatedCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PROPAGATION_WAIT: Duration = Duration::from_secs(2);

async fn node(broker: &MemoryBroker, base: &str) -> (String, ReplicatedCache) {
    let service = common::generate_unique_service_name(base);
    let local = common::local_cache(&service, Duration::from_secs(60));
    let engine =
        ReplicatedCache::new(local, Arc::new(broker.connect()), PublishOptions::default()).await;
    (service, engine)
}

async fn fill(cache: &ReplicatedCache, key: &str, value: u32) {
    let stored: Result<u32, String> = cache.get_or_create(key, None, || async move { Ok(value) }).await;
    assert_eq!(stored, Ok(value));
}

async fn is_gone(cache: &ReplicatedCache, key: &str) -> bool {
    cache.get::<u32>(key).await.unwrap().is_none()
}

/// 发布永远不返回的总线
struct HangingBus;

#[async_trait]
impl MessageBus for HangingBus {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn publish(&self, _message: &InvalidationMessage) -> replicache::Result<()> {
        futures::future::pending::<()>().await;
        Ok(())
    }

    async fn subscribe(&self, _handler: Arc<dyn InvalidationHandler>) -> replicache::Result<()> {
        Ok(())
    }
}

/// 测试一个节点按前缀删除后，另一个节点的匹配条目也被删除
#[tokio::test]
async fn test_remove_by_prefix_reaches_peer() {
    common::setup_logging();
    let broker = MemoryBroker::new(common::generate_unique_service_name("channel"));
    let (_, a) = node(&broker, "node_a").await;
    let (_, b) = node(&broker, "node_b").await;

    fill(&a, "k1", 1).await;
    fill(&b, "k1", 1).await;
    fill(&b, "other", 2).await;

    a.remove_by_prefix("k").await;
    assert!(is_gone(&a, "k1").await);

    assert!(common::eventually(PROPAGATION_WAIT, || is_gone(&b, "k1")).await);
    assert_eq!(b.get::<u32>("other").await.unwrap(), Some(2));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let refreshed: Result<u32, String> = b
        .get_or_create("k1", None, || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(10)
        })
        .await;
    assert_eq!(refreshed, Ok(10));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// 测试单键删除和清空在节点间传播
#[tokio::test]
async fn test_remove_and_clear_all_reach_peer() {
    common::setup_logging();
    let broker = MemoryBroker::new(common::generate_unique_service_name("channel"));
    let (_, a) = node(&broker, "node_a").await;
    let (_, b) = node(&broker, "node_b").await;

    fill(&b, "user:1", 1).await;
    fill(&b, "user:2", 2).await;
    fill(&b, "user:3", 3).await;

    a.remove("user:1").await;
    assert!(common::eventually(PROPAGATION_WAIT, || is_gone(&b, "user:1")).await);
    assert_eq!(b.get::<u32>("user:2").await.unwrap(), Some(2));

    let before = b.local().generation();
    a.clear_all().await;
    assert!(common::eventually(PROPAGATION_WAIT, || async { b.local().generation() > before }).await);
    assert!(is_gone(&b, "user:2").await);
    assert!(is_gone(&b, "user:3").await);
}

/// 测试节点忽略自己发出的消息
#[tokio::test]
async fn test_own_messages_are_not_replayed() {
    common::setup_logging();
    let broker = MemoryBroker::new(common::generate_unique_service_name("channel"));
    let (service, a) = node(&broker, "node_a").await;

    fill(&a, "x", 1).await;
    let applied = a
        .apply_remote(InvalidationMessage::remove_key(a.node_id(), "x"))
        .await;
    assert!(!applied);
    assert_eq!(a.get::<u32>("x").await.unwrap(), Some(1));

    // 总线把自己的广播回显给自己，也应被忽略
    a.remove("y").await;
    a.flush().await;
    assert!(
        common::eventually(PROPAGATION_WAIT, || async {
            GLOBAL_METRICS.get_count(&service, "bus", "receive", "ignored_own") >= 2
        })
        .await
    );
    assert_eq!(
        GLOBAL_METRICS.get_count(&service, "bus", "receive", "applied"),
        0
    );
    assert_eq!(a.get::<u32>("x").await.unwrap(), Some(1));
}

/// 测试重放远端消息只修改本地，不再广播
#[tokio::test]
async fn test_remote_apply_does_not_rebroadcast() {
    common::setup_logging();
    let broker = MemoryBroker::new(common::generate_unique_service_name("channel"));
    let (service_a, a) = node(&broker, "node_a").await;
    let (_, b) = node(&broker, "node_b").await;

    fill(&a, "k", 1).await;
    let remote = InvalidationMessage::remove_key(b.node_id(), "k");
    assert!(a.apply_remote(remote).await);
    assert!(is_gone(&a, "k").await);

    a.flush().await;
    assert_eq!(a.pending_publishes(), 0);
    assert_eq!(
        GLOBAL_METRICS.get_count(&service_a, "bus", "publish", "success"),
        0
    );
}

/// 测试 `LocalOnly` 不广播
#[tokio::test]
async fn test_local_only_stays_local() {
    common::setup_logging();
    let broker = MemoryBroker::new(common::generate_unique_service_name("channel"));
    let (service_a, a) = node(&broker, "node_a").await;
    let (_, b) = node(&broker, "node_b").await;

    fill(&a, "k", 1).await;
    fill(&b, "k", 1).await;

    a.remove_with("k", Propagation::LocalOnly).await;
    a.remove_by_prefix_with("k", Propagation::LocalOnly).await;
    a.clear_all_with(Propagation::LocalOnly).await;
    a.flush().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(is_gone(&a, "k").await);
    assert_eq!(b.get::<u32>("k").await.unwrap(), Some(1));
    assert_eq!(
        GLOBAL_METRICS.get_count(&service_a, "bus", "publish", "success"),
        0
    );
}

/// 测试格式错误的消息被丢弃，订阅继续工作
#[tokio::test]
async fn test_malformed_message_does_not_stop_subscriber() {
    common::setup_logging();
    let channel = common::generate_unique_service_name("channel");
    let broker = MemoryBroker::new(channel.clone());
    let (_, a) = node(&broker, "node_a").await;
    let (_, b) = node(&broker, "node_b").await;

    fill(&b, "k", 1).await;
    fill(&b, "orders:1", 2).await;

    broker.publish_raw("not json at all");
    broker.publish_raw(r#"{"origin":"00000000-0000-0000-0000-000000000000","op":"explode"}"#);
    // 缺少 target 的按前缀删除不能被当成空前缀
    broker.publish_raw(format!(
        r#"{{"origin":"{}","op":"remove_by_prefix"}}"#,
        NodeId::random().as_uuid()
    ));

    a.remove("k").await;
    assert!(common::eventually(PROPAGATION_WAIT, || is_gone(&b, "k")).await);
    assert_eq!(b.get::<u32>("orders:1").await.unwrap(), Some(2));
    // 两个订阅者各丢弃三条
    assert!(
        common::eventually(PROPAGATION_WAIT, || async {
            GLOBAL_METRICS.get_count(&channel, "bus", "receive", "malformed") == 6
        })
        .await
    );
}

/// 测试总线不可用时本地修改仍然成功，发布失败只记录
#[tokio::test]
async fn test_bus_unavailable_keeps_local_mutation() {
    common::setup_logging();
    let broker = MemoryBroker::new(common::generate_unique_service_name("channel"));
    let (service_a, a) = node(&broker, "node_a").await;
    let (_, b) = node(&broker, "node_b").await;

    fill(&a, "k", 1).await;
    fill(&b, "k", 1).await;

    broker.set_available(false);
    a.remove("k").await;
    assert!(is_gone(&a, "k").await);
    a.flush().await;

    assert_eq!(
        GLOBAL_METRICS.get_count(&service_a, "bus", "publish", "failure"),
        1
    );
    // 消息丢失，对端在TTL内仍会返回旧值
    assert_eq!(b.get::<u32>("k").await.unwrap(), Some(1));

    broker.set_available(true);
    a.remove("k").await;
    assert!(common::eventually(PROPAGATION_WAIT, || is_gone(&b, "k")).await);
}

/// 测试发布超时后被放弃，调用方不受影响
#[tokio::test]
async fn test_hanging_publish_is_abandoned() {
    common::setup_logging();
    let service = common::generate_unique_service_name("node_hanging");
    let local = common::local_cache(&service, Duration::from_secs(60));
    let options = PublishOptions {
        timeout: Duration::from_millis(100),
        queue_capacity: 16,
    };
    let engine = ReplicatedCache::new(local, Arc::new(HangingBus), options).await;

    fill(&engine, "k", 1).await;
    let start = std::time::Instant::now();
    engine.remove("k").await;
    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(is_gone(&engine, "k").await);

    tokio::time::timeout(Duration::from_secs(2), engine.flush())
        .await
        .unwrap();
    assert_eq!(
        GLOBAL_METRICS.get_count(&service, "bus", "publish", "timeout"),
        1
    );
}

/// 测试发布队列已满时丢弃新消息
#[tokio::test]
async fn test_full_queue_drops_messages() {
    common::setup_logging();
    let service = common::generate_unique_service_name("node_full");
    let local = common::local_cache(&service, Duration::from_secs(60));
    let options = PublishOptions {
        timeout: Duration::from_secs(1),
        queue_capacity: 1,
    };
    let engine = ReplicatedCache::new(local, Arc::new(HangingBus), options).await;

    for i in 0..3 {
        engine.remove(&format!("k{}", i)).await;
    }

    assert!(GLOBAL_METRICS.get_count(&service, "bus", "publish", "dropped") >= 1);
    assert!(engine.pending_publishes() <= 2);
}

/// 测试单实例模式：不发布也不订阅
#[tokio::test]
async fn test_noop_bus_behaves_as_local_cache() {
    common::setup_logging();
    let service = common::generate_unique_service_name("node_noop");
    let local = common::local_cache(&service, Duration::from_secs(60));
    let engine = ReplicatedCache::new(local, Arc::new(NoopBus), PublishOptions::default()).await;
    assert_eq!(engine.bus_name(), "none");

    fill(&engine, "products:1", 1).await;
    fill(&engine, "orders:1", 2).await;
    engine.remove_by_prefix("products:").await;
    assert!(is_gone(&engine, "products:1").await);
    assert_eq!(engine.get::<u32>("orders:1").await.unwrap(), Some(2));

    assert_eq!(engine.pending_publishes(), 0);
    assert_eq!(
        GLOBAL_METRICS.get_count(&service, "bus", "publish", "success"),
        0
    );
    engine.shutdown().await.unwrap();
}

/// 测试关闭前会发布完队列中的消息
#[tokio::test]
async fn test_shutdown_flushes_queued_messages() {
    common::setup_logging();
    let broker = MemoryBroker::new(common::generate_unique_service_name("channel"));
    let (_, a) = node(&broker, "node_a").await;
    let (_, b) = node(&broker, "node_b").await;

    fill(&b, "k", 1).await;
    a.remove("k").await;
    a.shutdown().await.unwrap();

    assert!(common::eventually(PROPAGATION_WAIT, || is_gone(&b, "k")).await);
}

/// 测试关闭后后台清理已停止
#[tokio::test]
async fn test_shutdown_stops_sweeper() {
    common::setup_logging();
    let service = common::generate_unique_service_name("node_sweeper");
    let local = common::local_cache(&service, Duration::from_secs(60));
    let engine =
        ReplicatedCache::new(local.clone(), Arc::new(NoopBus), PublishOptions::default()).await;
    engine.start_sweeper(Duration::from_millis(20)).unwrap();

    local.set("before", &1u8, Some(Duration::from_millis(1))).await.unwrap();
    let store = local.store().clone();
    assert!(
        common::eventually(PROPAGATION_WAIT, || {
            let store = store.clone();
            async move { store.entry_count().await == 0 }
        })
        .await
    );

    tokio::time::timeout(Duration::from_secs(2), engine.shutdown())
        .await
        .unwrap()
        .unwrap();

    local.set("after", &1u8, Some(Duration::from_millis(1))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.entry_count().await, 1);
}
